//! Lowering and the lowered program format.
//!
//! Lowering turns an edge-dialect [`Graph`] into the executable form the
//! runtime consumes: instruction chains in execution order, with dense
//! instruction ids. Each instruction keeps the debug handle of the graph
//! node it came from; the map from instruction id to debug handle is what
//! `generate_record` captures for the inspector.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::graph::{AttrValue, DebugHandle, Graph};
use crate::tensor::Tensor;

/// A single lowered instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Instruction {
    /// Dense id, unique across the whole program.
    pub id: u32,
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
    pub debug_handle: DebugHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
}

/// An ordered sequence of instructions executed as a unit.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Chain {
    pub index: u32,
    pub instructions: Vec<Instruction>,
}

/// The lowered, executable form of a graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    pub name: String,
    pub chains: Vec<Chain>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub input_shapes: BTreeMap<String, Vec<usize>>,
    pub constants: BTreeMap<String, Tensor>,
}

impl Program {
    /// Load a program from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open program file {}", path.display()))?;
        let program = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse program file {}", path.display()))?;
        Ok(program)
    }

    /// Write the program to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create program file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Iterate all instructions across chains in execution order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.chains.iter().flat_map(|c| c.instructions.iter())
    }

    /// Total instruction count.
    pub fn num_instructions(&self) -> usize {
        self.chains.iter().map(|c| c.instructions.len()).sum()
    }

    /// Map from instruction id to the debug handle of the originating node.
    pub fn debug_handle_map(&self) -> BTreeMap<u32, DebugHandle> {
        self.instructions()
            .map(|inst| (inst.id, inst.debug_handle))
            .collect()
    }

    /// Map from instruction id to delegate backend name, for delegate calls.
    pub fn delegate_map(&self) -> BTreeMap<u32, String> {
        self.instructions()
            .filter_map(|inst| inst.delegate.as_ref().map(|d| (inst.id, d.clone())))
            .collect()
    }
}

/// Lower an edge-dialect graph to an executable program.
///
/// Nodes are scheduled in topological order of value availability. The node
/// list order is used as the tie breaker so lowering is deterministic.
pub fn lower(graph: &Graph) -> Result<Program> {
    graph.validate()?;

    let mut available: HashSet<&str> = graph.inputs.iter().map(String::as_str).collect();
    available.extend(graph.constants.keys().map(String::as_str));

    let mut scheduled = vec![false; graph.nodes.len()];
    let mut instructions = Vec::with_capacity(graph.nodes.len());

    while instructions.len() < graph.nodes.len() {
        let mut progressed = false;
        for (idx, node) in graph.nodes.iter().enumerate() {
            if scheduled[idx] {
                continue;
            }
            if !node.inputs.iter().all(|i| available.contains(i.as_str())) {
                continue;
            }
            scheduled[idx] = true;
            progressed = true;
            for output in &node.outputs {
                available.insert(output);
            }
            instructions.push(Instruction {
                id: instructions.len() as u32,
                name: node.name.clone(),
                op_type: node.op_type.clone(),
                inputs: node.inputs.clone(),
                outputs: node.outputs.clone(),
                attrs: node.attrs.clone(),
                debug_handle: node.debug_handle,
                delegate: node.delegate.clone(),
            });
        }
        if !progressed {
            let stuck: Vec<&str> = graph
                .nodes
                .iter()
                .enumerate()
                .filter(|(idx, _)| !scheduled[*idx])
                .map(|(_, n)| n.name.as_str())
                .collect();
            bail!("graph has a cycle through nodes: {}", stuck.join(", "));
        }
    }

    Ok(Program {
        name: graph.name.clone(),
        chains: vec![Chain {
            index: 0,
            instructions,
        }],
        inputs: graph.inputs.clone(),
        outputs: graph.outputs.clone(),
        input_shapes: graph.input_shapes.clone(),
        constants: graph.constants.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_graph;
    use crate::graph::GraphNode;

    #[test]
    fn test_lower_demo() {
        let graph = demo_graph("mlp").unwrap();
        let program = lower(&graph).unwrap();
        assert_eq!(program.num_instructions(), graph.nodes.len());

        // Ids are dense and in execution order.
        let ids: Vec<u32> = program.instructions().map(|i| i.id).collect();
        assert_eq!(ids, (0..graph.nodes.len() as u32).collect::<Vec<u32>>());
    }

    #[test]
    fn test_lower_respects_data_dependencies() {
        let mut graph = demo_graph("mlp").unwrap();
        // Reverse the node list; lowering must still schedule producers first.
        graph.nodes.reverse();
        let program = lower(&graph).unwrap();

        let mut available: HashSet<String> = graph.inputs.iter().cloned().collect();
        available.extend(graph.constants.keys().cloned());
        for inst in program.instructions() {
            for input in &inst.inputs {
                assert!(available.contains(input), "{} not ready", input);
            }
            available.extend(inst.outputs.iter().cloned());
        }
    }

    #[test]
    fn test_lower_detects_cycle() {
        let mut graph = demo_graph("mlp").unwrap();
        graph.nodes.push(GraphNode {
            name: "loop.a".to_string(),
            op_type: "add".to_string(),
            module: "net".to_string(),
            debug_handle: 100,
            inputs: vec!["loop.b".to_string()],
            outputs: vec!["loop.a.out".to_string()],
            attrs: BTreeMap::new(),
            delegate: None,
        });
        graph.nodes.push(GraphNode {
            name: "loop.b".to_string(),
            op_type: "add".to_string(),
            module: "net".to_string(),
            debug_handle: 101,
            inputs: vec!["loop.a.out".to_string()],
            outputs: vec!["loop.b".to_string()],
            attrs: BTreeMap::new(),
            delegate: None,
        });
        let err = lower(&graph).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_debug_handle_map() {
        let graph = demo_graph("mlp-delegated").unwrap();
        let program = lower(&graph).unwrap();
        let map = program.debug_handle_map();
        assert_eq!(map.len(), program.num_instructions());
        for inst in program.instructions() {
            assert_eq!(map[&inst.id], inst.debug_handle);
        }
        // The delegate call shows up in the delegate map.
        let delegates = program.delegate_map();
        assert_eq!(delegates.len(), 1);
        assert!(delegates.values().any(|b| b == "blas"));
    }
}
