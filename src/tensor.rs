//! Minimal dense f32 tensor used by the executor.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A dense row-major f32 tensor.
///
/// Shapes are fully static. The executor only needs enough tensor machinery
/// to run the lowered instruction set, so there is no dtype parameterization
/// and no striding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor from a shape and backing data.
    ///
    /// Fails if the shape does not describe exactly `data.len()` elements.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            bail!(
                "shape {:?} describes {} elements but data has {}",
                shape,
                numel,
                data.len()
            );
        }
        Ok(Tensor { shape, data })
    }

    /// Create a zero-filled tensor.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Tensor {
            shape,
            data: vec![0.0; numel],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Reinterpret the data with a new shape of the same element count.
    pub fn into_reshaped(self, shape: Vec<usize>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != self.data.len() {
            bail!(
                "cannot reshape {} elements to shape {:?}",
                self.data.len(),
                shape
            );
        }
        Ok(Tensor {
            shape,
            data: self.data,
        })
    }
}
