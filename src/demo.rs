//! Built-in example graphs.
//!
//! These play the role of the example models a user would normally export
//! from their own framework: small, deterministic, and good enough to
//! exercise the full export, run, and inspect flow.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::graph::{AttrValue, Graph, GraphNode};
use crate::tensor::Tensor;

/// Names of the available demo graphs.
pub const DEMO_NAMES: &[&str] = &["mlp", "mlp-delegated"];

/// Build one of the built-in demo graphs by name.
pub fn demo_graph(name: &str) -> Result<Graph> {
    match name {
        "mlp" => Ok(mlp(false)),
        "mlp-delegated" => Ok(mlp(true)),
        _ => bail!(
            "Unknown demo model '{}'. Available: {}",
            name,
            DEMO_NAMES.join(", ")
        ),
    }
}

// Deterministic weight fill so repeated exports produce identical artifacts.
fn fill(shape: Vec<usize>) -> Tensor {
    let numel: usize = shape.iter().product();
    let data = (0..numel)
        .map(|i| ((i * 31 + 7) % 13) as f32 * 0.05 - 0.3)
        .collect();
    Tensor::new(shape, data).unwrap()
}

fn node(
    name: &str,
    op_type: &str,
    module: &str,
    handle: u64,
    inputs: &[&str],
    outputs: &[&str],
) -> GraphNode {
    GraphNode {
        name: name.to_string(),
        op_type: op_type.to_string(),
        module: module.to_string(),
        debug_handle: handle,
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        attrs: BTreeMap::new(),
        delegate: None,
    }
}

/// A two layer perceptron: linear, relu, linear, softmax.
///
/// With `delegated` the second linear layer is captured as a single delegate
/// call to the "blas" backend instead of separate matmul and add nodes.
fn mlp(delegated: bool) -> Graph {
    let mut nodes = vec![
        node(
            "net.fc1.matmul",
            "matmul",
            "net.fc1",
            1,
            &["x", "fc1.weight"],
            &["fc1.mm"],
        ),
        node(
            "net.fc1.add",
            "add",
            "net.fc1",
            2,
            &["fc1.mm", "fc1.bias"],
            &["fc1.out"],
        ),
        node("net.act.relu", "relu", "net.act", 3, &["fc1.out"], &["act.out"]),
    ];

    if delegated {
        let mut call = node(
            "net.fc2.delegate",
            "delegate",
            "net.fc2",
            4,
            &["act.out", "fc2.weight", "fc2.bias"],
            &["fc2.out"],
        );
        call.delegate = Some("blas".to_string());
        nodes.push(call);
    } else {
        nodes.push(node(
            "net.fc2.matmul",
            "matmul",
            "net.fc2",
            4,
            &["act.out", "fc2.weight"],
            &["fc2.mm"],
        ));
        nodes.push(node(
            "net.fc2.add",
            "add",
            "net.fc2",
            5,
            &["fc2.mm", "fc2.bias"],
            &["fc2.out"],
        ));
    }

    let mut softmax = node(
        "net.head.softmax",
        "softmax",
        "net.head",
        6,
        &["fc2.out"],
        &["y"],
    );
    softmax
        .attrs
        .insert("axis".to_string(), AttrValue::Int(-1));
    nodes.push(softmax);

    Graph {
        name: if delegated {
            "mlp-delegated".to_string()
        } else {
            "mlp".to_string()
        },
        nodes,
        inputs: vec!["x".to_string()],
        outputs: vec!["y".to_string()],
        input_shapes: BTreeMap::from([("x".to_string(), vec![1, 4])]),
        constants: BTreeMap::from([
            ("fc1.weight".to_string(), fill(vec![4, 8])),
            ("fc1.bias".to_string(), fill(vec![8])),
            ("fc2.weight".to_string(), fill(vec![8, 3])),
            ("fc2.bias".to_string(), fill(vec![3])),
        ]),
    }
}
