//! Program executor with optional event tracing.
//!
//! The executor interprets a lowered [`Program`] against caller-provided
//! inputs. When an [`EventTracer`] is attached, every instruction execution
//! is bracketed with timestamps and recorded as a profile event; without a
//! tracer the run is untimed and allocation-free on the tracing path.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use crate::graph::AttrValue;
use crate::program::{Instruction, Program};
use crate::tensor::Tensor;
use crate::tracer::{EventTracer, ProfileEvent};

pub struct Executor {
    program: Program,
}

impl Executor {
    pub fn new(program: Program) -> Self {
        Executor { program }
    }

    /// Load a program file and wrap it in an executor.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        Ok(Executor::new(Program::from_file(path)?))
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Execute the program without tracing.
    pub fn run(&self, inputs: &BTreeMap<String, Tensor>) -> Result<BTreeMap<String, Tensor>> {
        self.run_inner(inputs, None)
    }

    /// Execute the program as one traced run block.
    pub fn run_traced(
        &self,
        inputs: &BTreeMap<String, Tensor>,
        tracer: &mut EventTracer,
    ) -> Result<BTreeMap<String, Tensor>> {
        tracer.begin_run();
        let result = self.run_inner(inputs, Some(tracer));
        tracer.end_run();
        result
    }

    fn run_inner(
        &self,
        inputs: &BTreeMap<String, Tensor>,
        mut tracer: Option<&mut EventTracer>,
    ) -> Result<BTreeMap<String, Tensor>> {
        let mut values: BTreeMap<String, Tensor> = self.program.constants.clone();

        for name in &self.program.inputs {
            let tensor = inputs
                .get(name)
                .with_context(|| format!("missing input '{}'", name))?;
            if let Some(expected) = self.program.input_shapes.get(name) {
                if tensor.shape() != expected.as_slice() {
                    bail!(
                        "input '{}' has shape {:?}, program expects {:?}",
                        name,
                        tensor.shape(),
                        expected
                    );
                }
            }
            values.insert(name.clone(), tensor.clone());
        }

        for chain in &self.program.chains {
            for inst in &chain.instructions {
                let start_ns = tracer.as_ref().map(|t| t.now_ns());
                let output = execute_instruction(inst, &values)
                    .with_context(|| format!("instruction '{}' failed", inst.name))?;
                if let Some(tracer) = tracer.as_deref_mut() {
                    tracer.record_event(ProfileEvent {
                        name: inst.name.clone(),
                        instruction_id: inst.id,
                        chain_index: chain.index,
                        start_ns: start_ns.unwrap(),
                        end_ns: tracer.now_ns(),
                        delegate: inst.delegate.clone(),
                    });
                }
                values.insert(inst.outputs[0].clone(), output);
            }
        }

        let mut outputs = BTreeMap::new();
        for name in &self.program.outputs {
            let tensor = values
                .get(name)
                .with_context(|| format!("program output '{}' was never produced", name))?;
            outputs.insert(name.clone(), tensor.clone());
        }
        Ok(outputs)
    }
}

fn get<'a>(values: &'a BTreeMap<String, Tensor>, name: &str) -> Result<&'a Tensor> {
    values
        .get(name)
        .with_context(|| format!("value '{}' is not available", name))
}

fn execute_instruction(inst: &Instruction, values: &BTreeMap<String, Tensor>) -> Result<Tensor> {
    if inst.outputs.len() != 1 {
        bail!("expected exactly one output, got {}", inst.outputs.len());
    }
    match inst.op_type.as_str() {
        "add" => binary_elementwise(inst, values, |a, b| a + b),
        "mul" => binary_elementwise(inst, values, |a, b| a * b),
        "relu" => {
            let x = get(values, &inst.inputs[0])?;
            let data = x.data().iter().map(|v| v.max(0.0)).collect();
            Tensor::new(x.shape().to_vec(), data)
        }
        "softmax" => softmax(inst, values),
        "matmul" => {
            let lhs = get(values, &inst.inputs[0])?;
            let rhs = get(values, &inst.inputs[1])?;
            matmul(lhs, rhs)
        }
        "reshape" => {
            let x = get(values, &inst.inputs[0])?;
            let shape = match inst.attrs.get("shape") {
                Some(AttrValue::Ints(dims)) => dims.iter().map(|d| *d as usize).collect(),
                _ => bail!("reshape needs an integer list 'shape' attribute"),
            };
            x.clone().into_reshaped(shape)
        }
        "delegate" => {
            // A delegate call runs as one opaque fused step: x * w + b.
            let x = get(values, &inst.inputs[0])?;
            let w = get(values, &inst.inputs[1])?;
            let b = get(values, &inst.inputs[2])?;
            let mm = matmul(x, w)?;
            broadcast_add(&mm, b)
        }
        other => bail!("unknown operator type '{}'", other),
    }
}

fn binary_elementwise(
    inst: &Instruction,
    values: &BTreeMap<String, Tensor>,
    op: fn(f32, f32) -> f32,
) -> Result<Tensor> {
    let lhs = get(values, &inst.inputs[0])?;
    let rhs = get(values, &inst.inputs[1])?;
    if lhs.shape() == rhs.shape() {
        let data = lhs
            .data()
            .iter()
            .zip(rhs.data())
            .map(|(a, b)| op(*a, *b))
            .collect();
        return Tensor::new(lhs.shape().to_vec(), data);
    }
    // The only supported broadcast is a 1-D rhs over the last axis, which is
    // what bias addition needs.
    if rhs.shape().len() == 1 && lhs.shape().last() == Some(&rhs.numel()) {
        let width = rhs.numel();
        let data = lhs
            .data()
            .iter()
            .enumerate()
            .map(|(i, a)| op(*a, rhs.data()[i % width]))
            .collect();
        return Tensor::new(lhs.shape().to_vec(), data);
    }
    bail!(
        "shape mismatch: {:?} vs {:?}",
        lhs.shape(),
        rhs.shape()
    );
}

fn broadcast_add(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    if rhs.shape().len() != 1 || lhs.shape().last() != Some(&rhs.numel()) {
        bail!(
            "bias shape {:?} does not broadcast over {:?}",
            rhs.shape(),
            lhs.shape()
        );
    }
    let width = rhs.numel();
    let data = lhs
        .data()
        .iter()
        .enumerate()
        .map(|(i, a)| a + rhs.data()[i % width])
        .collect();
    Tensor::new(lhs.shape().to_vec(), data)
}

fn matmul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let (m, k) = match lhs.shape() {
        [m, k] => (*m, *k),
        other => bail!("matmul lhs must be 2-D, got {:?}", other),
    };
    let (k2, n) = match rhs.shape() {
        [k2, n] => (*k2, *n),
        other => bail!("matmul rhs must be 2-D, got {:?}", other),
    };
    if k != k2 {
        bail!("matmul inner dimensions differ: {} vs {}", k, k2);
    }
    let mut out = Tensor::zeros(vec![m, n]);
    for row in 0..m {
        for col in 0..n {
            let mut acc = 0.0;
            for inner in 0..k {
                acc += lhs.data()[row * k + inner] * rhs.data()[inner * n + col];
            }
            out.data_mut()[row * n + col] = acc;
        }
    }
    Ok(out)
}

fn softmax(inst: &Instruction, values: &BTreeMap<String, Tensor>) -> Result<Tensor> {
    let x = get(values, &inst.inputs[0])?;
    let last = match x.shape().last() {
        Some(d) if *d > 0 => *d,
        _ => bail!("softmax input must have a non-empty last axis"),
    };
    if let Some(AttrValue::Int(axis)) = inst.attrs.get("axis") {
        let rank = x.shape().len() as i64;
        if *axis != -1 && *axis != rank - 1 {
            bail!("softmax only supports the last axis, got {}", axis);
        }
    }

    let mut data = x.data().to_vec();
    for row in data.chunks_mut(last) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    Tensor::new(x.shape().to_vec(), data)
}
