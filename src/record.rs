//! Graph record generation and loading.
//!
//! The graph record is the optional side-artifact produced at export time.
//! It captures the edge-dialect graph together with, for each lowered
//! program, the map from instruction id to debug handle (and delegate
//! backend). The inspector uses it to label runtime events with operator
//! identity; without it, events are shown uncorrelated.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::graph::{DebugHandle, Graph, GraphNode};
use crate::program::Program;

/// Bumped when the record schema changes shape.
pub const RECORD_VERSION: u32 = 1;

/// Per-program correlation data captured in a record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramRecord {
    /// Instruction id to debug handle of the originating graph node.
    pub debug_handle_map: BTreeMap<u32, DebugHandle>,
    /// Instruction id to delegate backend name, for delegate calls.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub delegate_map: BTreeMap<u32, String>,
}

impl ProgramRecord {
    fn from_program(program: &Program) -> Self {
        ProgramRecord {
            debug_handle_map: program.debug_handle_map(),
            delegate_map: program.delegate_map(),
        }
    }
}

/// The graph record artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphRecord {
    pub version: u32,
    pub graph: Graph,
    /// Correlation data keyed by program name.
    pub programs: BTreeMap<String, ProgramRecord>,
}

impl GraphRecord {
    /// Load a record from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open record file {}", path.display()))?;
        let record: GraphRecord = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse record file {}", path.display()))?;
        Ok(record)
    }

    /// Resolve an instruction of a named program to its graph operator.
    pub fn resolve(&self, program_name: &str, instruction_id: u32) -> Option<&GraphNode> {
        let handle = self
            .programs
            .get(program_name)?
            .debug_handle_map
            .get(&instruction_id)?;
        self.graph.node_for_handle(*handle)
    }
}

/// Generate a graph record file.
///
/// Takes the output path, the edge-dialect graph, the lowered program, and
/// an optional map of additional named programs lowered from the same graph
/// (for example, a quantized variant).
pub fn generate_record(
    path: &Path,
    graph: &Graph,
    program: &Program,
    extra_programs: Option<&BTreeMap<String, Program>>,
) -> Result<()> {
    let mut programs = BTreeMap::new();
    programs.insert(program.name.clone(), ProgramRecord::from_program(program));
    if let Some(extras) = extra_programs {
        for (name, extra) in extras {
            programs.insert(name.clone(), ProgramRecord::from_program(extra));
        }
    }

    let record = GraphRecord {
        version: RECORD_VERSION,
        graph: graph.clone(),
        programs,
    };
    let file = File::create(path)
        .with_context(|| format!("Failed to create record file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &record)?;
    Ok(())
}
