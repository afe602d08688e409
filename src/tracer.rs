//! Runtime trace model and event collection.
//!
//! The runtime trace is the mandatory artifact the inspector consumes. The
//! executor attaches an [`EventTracer`] to a run; each call to the executor
//! becomes one [`RunBlock`], and every instruction executed inside it
//! produces one [`ProfileEvent`]. Timestamps are nanoseconds relative to
//! tracer creation, taken from the process monotonic clock.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// One profiled instruction execution.
///
/// # Fields
/// - `name`: Display name of the instruction (the graph node name)
/// - `instruction_id`: Dense instruction id within the program
/// - `chain_index`: Chain the instruction belongs to
/// - `start_ns`/`end_ns`: Event bounds relative to tracer creation
/// - `delegate`: Backend name when the instruction is a delegate call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileEvent {
    pub name: String,
    pub instruction_id: u32,
    pub chain_index: u32,
    pub start_ns: u64,
    pub end_ns: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
}

impl ProfileEvent {
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

/// All events from one executor invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunBlock {
    pub run_index: u32,
    pub events: Vec<ProfileEvent>,
}

/// The runtime trace artifact.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunTrace {
    /// Random id distinguishing tracing sessions in downstream tooling.
    pub session_id: u64,
    pub program_name: String,
    pub runs: Vec<RunBlock>,
}

impl RunTrace {
    /// Load a trace from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open trace file {}", path.display()))?;
        let trace = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse trace file {}", path.display()))?;
        Ok(trace)
    }

    /// Write the trace to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create trace file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Total number of events across all run blocks.
    pub fn num_events(&self) -> usize {
        self.runs.iter().map(|r| r.events.len()).sum()
    }
}

/// Collects profile events while the executor runs.
pub struct EventTracer {
    origin: Instant,
    session_id: u64,
    program_name: String,
    runs: Vec<RunBlock>,
    current: Option<RunBlock>,
}

impl EventTracer {
    pub fn new(program_name: &str) -> Self {
        EventTracer {
            origin: Instant::now(),
            session_id: rand::rng().next_u64(),
            program_name: program_name.to_string(),
            runs: Vec::new(),
            current: None,
        }
    }

    /// Nanoseconds since tracer creation.
    pub fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// Open a new run block. Closes the previous one if still open.
    pub fn begin_run(&mut self) {
        self.end_run();
        self.current = Some(RunBlock {
            run_index: self.runs.len() as u32,
            events: Vec::new(),
        });
    }

    /// Close the current run block, if any.
    pub fn end_run(&mut self) {
        if let Some(block) = self.current.take() {
            self.runs.push(block);
        }
    }

    /// Record one event into the current run block. Recording without an
    /// explicit `begin_run` opens a block implicitly.
    pub fn record_event(&mut self, event: ProfileEvent) {
        let run_index = self.runs.len() as u32;
        self.current
            .get_or_insert_with(|| RunBlock {
                run_index,
                events: Vec::new(),
            })
            .events
            .push(event);
    }

    /// Finalize into the trace artifact.
    pub fn finish(mut self) -> RunTrace {
        self.end_run();
        RunTrace {
            session_id: self.session_id,
            program_name: self.program_name,
            runs: self.runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(id: u32, start: u64, end: u64) -> ProfileEvent {
        ProfileEvent {
            name: format!("inst{}", id),
            instruction_id: id,
            chain_index: 0,
            start_ns: start,
            end_ns: end,
            delegate: None,
        }
    }

    #[test]
    fn test_run_blocks() {
        let mut tracer = EventTracer::new("prog");
        tracer.begin_run();
        tracer.record_event(event(0, 10, 20));
        tracer.record_event(event(1, 20, 50));
        tracer.end_run();
        tracer.begin_run();
        tracer.record_event(event(0, 60, 70));
        let trace = tracer.finish();

        assert_eq!(trace.program_name, "prog");
        assert_eq!(trace.runs.len(), 2);
        assert_eq!(trace.runs[0].run_index, 0);
        assert_eq!(trace.runs[1].run_index, 1);
        assert_eq!(trace.num_events(), 3);
        assert_eq!(trace.runs[0].events[1].duration_ns(), 30);
    }

    #[test]
    fn test_implicit_run_block() {
        let mut tracer = EventTracer::new("prog");
        tracer.record_event(event(0, 1, 2));
        let trace = tracer.finish();
        assert_eq!(trace.runs.len(), 1);
        assert_eq!(trace.runs[0].events.len(), 1);
    }

    #[test]
    fn test_empty_trace() {
        let trace = EventTracer::new("prog").finish();
        assert_eq!(trace.runs.len(), 0);
        assert_eq!(trace.num_events(), 0);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.json");

        let mut tracer = EventTracer::new("prog");
        tracer.begin_run();
        tracer.record_event(event(0, 5, 9));
        tracer.finish().write_to_file(&path).unwrap();

        let trace = RunTrace::from_file(&path).unwrap();
        assert_eq!(trace.program_name, "prog");
        assert_eq!(trace.num_events(), 1);
        assert_eq!(trace.runs[0].events[0].duration_ns(), 4);
    }

    #[test]
    fn test_malformed_trace_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(RunTrace::from_file(&path).is_err());
    }
}
