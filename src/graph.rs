//! Edge-dialect graph model.
//!
//! This is the graph captured at export time, before lowering to the
//! executable program. Each operator node carries a debug handle, a stable
//! identity that survives lowering and is what the inspector uses to join
//! runtime events back to the exported graph.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Stable operator identity assigned at capture time.
pub type DebugHandle = u64;

/// Attribute value attached to an operator node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f64),
    Str(String),
}

/// A single operator in the edge-dialect graph.
///
/// # Fields
/// - `name`: Unique operator name (e.g., "net.fc1.matmul")
/// - `op_type`: Operator kind dispatched by the executor (e.g., "matmul")
/// - `module`: Module hierarchy path of the originating model module
/// - `debug_handle`: Stable identity used for runtime event correlation
/// - `inputs`/`outputs`: Value names flowing between operators
/// - `delegate`: Backend name when this node is a delegated subgraph call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphNode {
    pub name: String,
    pub op_type: String,
    pub module: String,
    pub debug_handle: DebugHandle,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
}

/// An exported edge-dialect graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Graph {
    pub name: String,
    pub nodes: Vec<GraphNode>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Shapes of the graph inputs, used to build sample inputs for a run.
    pub input_shapes: BTreeMap<String, Vec<usize>>,
    /// Captured weights and other constant values.
    pub constants: BTreeMap<String, Tensor>,
}

impl Graph {
    /// Load a graph from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open graph file {}", path.display()))?;
        let graph: Graph = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse graph file {}", path.display()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Write the graph to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create graph file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Structural validation: every consumed value must be produced somewhere,
    /// every produced value must be produced exactly once, and debug handles
    /// must be unique.
    pub fn validate(&self) -> Result<()> {
        let mut produced: HashSet<&str> = HashSet::new();
        for input in &self.inputs {
            produced.insert(input);
            if !self.input_shapes.contains_key(input) {
                bail!("graph input '{}' has no shape", input);
            }
        }
        for constant in self.constants.keys() {
            produced.insert(constant);
        }

        let mut handles = HashSet::new();
        for node in &self.nodes {
            if !handles.insert(node.debug_handle) {
                bail!(
                    "duplicate debug handle {} on node '{}'",
                    node.debug_handle,
                    node.name
                );
            }
            for output in &node.outputs {
                if !produced.insert(output) {
                    bail!("value '{}' produced more than once", output);
                }
            }
        }

        // Consumers can appear before producers in the node list, so check
        // references only after the full produced set is known.
        for node in &self.nodes {
            for input in &node.inputs {
                if !produced.contains(input.as_str()) {
                    bail!(
                        "node '{}' consumes value '{}' which nothing produces",
                        node.name,
                        input
                    );
                }
            }
        }
        for output in &self.outputs {
            if !produced.contains(output.as_str()) {
                bail!("graph output '{}' is never produced", output);
            }
        }
        Ok(())
    }

    /// Look up an operator by its debug handle.
    pub fn node_for_handle(&self, handle: DebugHandle) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.debug_handle == handle)
    }
}
