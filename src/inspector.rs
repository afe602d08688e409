//! The inspector: correlate runtime events with graph operators.
//!
//! An [`Inspector`] is constructed from a runtime trace file (required) and
//! a graph record file (optional). Construction parses both artifacts and
//! builds the correlated view; `print_data_tabular` renders every runtime
//! event as one table row. Without a record the events are shown
//! uncorrelated, which is the intended degraded mode, not an error.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use regex::Regex;

use crate::graph::DebugHandle;
use crate::record::GraphRecord;
use crate::stats::{summarize, Summary};
use crate::tracer::RunTrace;

/// One runtime event, aggregated across run blocks.
///
/// Identical instructions from different run blocks fold into a single event
/// whose `raw_durations_ns` holds one sample per block, in run order. The
/// correlation fields are `None` when no record was supplied or when the
/// record does not know the instruction.
#[derive(Clone, Debug)]
pub struct Event {
    pub name: String,
    pub instruction_id: u32,
    pub chain_index: u32,
    pub raw_durations_ns: Vec<u64>,
    pub delegate: Option<String>,
    pub debug_handle: Option<DebugHandle>,
    pub op_type: Option<String>,
    pub module: Option<String>,
}

impl Event {
    /// Sum of this event's durations across all run blocks.
    pub fn total_ns(&self) -> u64 {
        self.raw_durations_ns.iter().sum()
    }

    pub fn summary(&self) -> Option<Summary> {
        summarize(&self.raw_durations_ns)
    }
}

pub struct Inspector {
    program_name: String,
    num_runs: usize,
    correlated: bool,
    events: Vec<Event>,
}

impl Inspector {
    /// Build an inspector from artifact paths.
    ///
    /// The trace path is required and a missing or malformed trace is a
    /// construction error. The record path is optional; when omitted the
    /// view degrades to uncorrelated events.
    pub fn new(trace_path: &Path, record_path: Option<&Path>) -> Result<Self> {
        let trace = RunTrace::from_file(trace_path)?;
        let record = match record_path {
            Some(path) => Some(GraphRecord::from_file(path)?),
            None => None,
        };
        Ok(Self::from_artifacts(trace, record))
    }

    /// Build an inspector from already-parsed artifacts.
    pub fn from_artifacts(trace: RunTrace, record: Option<GraphRecord>) -> Self {
        let mut events: Vec<Event> = Vec::new();
        let mut index: HashMap<(u32, u32), usize> = HashMap::new();

        for block in &trace.runs {
            for event in &block.events {
                let key = (event.chain_index, event.instruction_id);
                let slot = *index.entry(key).or_insert_with(|| {
                    events.push(Event {
                        name: event.name.clone(),
                        instruction_id: event.instruction_id,
                        chain_index: event.chain_index,
                        raw_durations_ns: Vec::new(),
                        delegate: event.delegate.clone(),
                        debug_handle: None,
                        op_type: None,
                        module: None,
                    });
                    events.len() - 1
                });
                events[slot].raw_durations_ns.push(event.duration_ns());
            }
        }

        if let Some(record) = &record {
            for event in &mut events {
                event.debug_handle = record
                    .programs
                    .get(&trace.program_name)
                    .and_then(|p| p.debug_handle_map.get(&event.instruction_id))
                    .copied();
                if let Some(node) = record.resolve(&trace.program_name, event.instruction_id) {
                    event.op_type = Some(node.op_type.clone());
                    event.module = Some(node.module.clone());
                }
            }
        }

        Inspector {
            program_name: trace.program_name,
            num_runs: trace.runs.len(),
            correlated: record.is_some(),
            events,
        }
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Number of run blocks in the underlying trace.
    pub fn num_runs(&self) -> usize {
        self.num_runs
    }

    /// True when a graph record was supplied at construction.
    pub fn is_correlated(&self) -> bool {
        self.correlated
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events whose name matches the pattern.
    pub fn find_events(&self, pattern: &Regex) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| pattern.is_match(&e.name))
            .collect()
    }

    /// Total runtime of all events correlated to the given operator type.
    pub fn find_total_for_op(&self, op_type: &str) -> u64 {
        self.events
            .iter()
            .filter(|e| e.op_type.as_deref() == Some(op_type))
            .map(Event::total_ns)
            .sum()
    }

    /// Total runtime of all events whose module hierarchy sits at or under
    /// the given prefix.
    pub fn find_total_for_module(&self, prefix: &str) -> u64 {
        self.events
            .iter()
            .filter(|e| match &e.module {
                Some(module) => {
                    module == prefix || module.starts_with(&format!("{}.", prefix))
                }
                None => false,
            })
            .map(Event::total_ns)
            .sum()
    }

    /// Column headers for the tabular view. The operator identity columns
    /// are present only when a record was supplied.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![
            "event".to_string(),
            "instruction".to_string(),
            "chain".to_string(),
        ];
        if self.correlated {
            headers.push("op_type".to_string());
            headers.push("module".to_string());
        }
        headers.extend(
            [
                "runs", "avg_us", "min_us", "max_us", "p10_us", "p50_us", "p90_us", "delegate",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        headers
    }

    /// Render all events (or the filtered subset) as table rows.
    pub fn data_rows(&self, filter: Option<&Regex>) -> Vec<Vec<String>> {
        self.events
            .iter()
            .filter(|e| filter.map_or(true, |re| re.is_match(&e.name)))
            .map(|event| {
                let mut row = vec![
                    event.name.clone(),
                    event.instruction_id.to_string(),
                    event.chain_index.to_string(),
                ];
                if self.correlated {
                    row.push(event.op_type.clone().unwrap_or_else(|| "-".to_string()));
                    row.push(event.module.clone().unwrap_or_else(|| "-".to_string()));
                }
                // Aggregated events always carry at least one sample.
                let summary = event.summary().unwrap();
                row.push(summary.count.to_string());
                row.push(format_us(summary.avg));
                row.push(format_us(summary.min as f64));
                row.push(format_us(summary.max as f64));
                row.push(format_us(summary.p10));
                row.push(format_us(summary.p50));
                row.push(format_us(summary.p90));
                row.push(event.delegate.clone().unwrap_or_else(|| "-".to_string()));
                row
            })
            .collect()
    }

    /// Print the tabular view of all runtime events to stdout.
    pub fn print_data_tabular(&self) {
        print_table(&self.headers(), &self.data_rows(None));
    }
}

fn format_us(ns: f64) -> String {
    format!("{:.3}", ns / 1000.0)
}

const MAX_COLUMN_WIDTH: usize = 40;

/// Print rows as an aligned table, truncating overly wide cells.
pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    if rows.is_empty() {
        println!("(no events)");
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in rows {
        for (i, val) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(val.len());
            }
        }
    }

    for w in &mut widths {
        *w = (*w).min(MAX_COLUMN_WIDTH);
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths.get(i).copied().unwrap_or(10)))
        .collect();
    println!("{}", header_line.join(" | "));

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", sep.join("-+-"));

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let width = widths.get(i).copied().unwrap_or(10);
                let truncated = if v.len() > width && width > 3 {
                    format!("{}...", &v[..width.saturating_sub(3)])
                } else {
                    v.clone()
                };
                format!("{truncated:width$}")
            })
            .collect();
        println!("{}", row_line.join(" | "));
    }
}
