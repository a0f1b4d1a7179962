// Copyright 2026 Vexpr Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shape broadcasting
//!
//! NumPy rules: shapes align on their trailing dimensions, size-1 axes
//! stretch to match, missing leading axes are treated as size 1. Zero-length
//! axes are legal and produce empty results.

use crate::core::error::{Error, Result};

/// Compute the common broadcast shape of all input shapes
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; ndim];
    for shape in shapes {
        let offset = ndim - shape.len();
        for (axis, &dim) in shape.iter().enumerate() {
            let slot = &mut out[offset + axis];
            if *slot == 1 {
                *slot = dim;
            } else if dim != 1 && dim != *slot {
                return Err(Error::shape(&out, shape));
            }
        }
    }
    Ok(out)
}

/// Row-major element strides for a dense array of `shape`
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; shape.len()];
    let mut step = 1usize;
    for axis in (0..shape.len()).rev() {
        strides[axis] = step;
        step *= shape[axis].max(1);
    }
    strides
}

/// Element strides of `shape` lifted into `out_shape`'s index space:
/// stretched and missing axes get stride 0.
pub fn broadcast_strides(shape: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let own = contiguous_strides(shape);
    let offset = out_shape.len() - shape.len();
    let mut strides = vec![0usize; out_shape.len()];
    for (axis, (&dim, &stride)) in shape.iter().zip(&own).enumerate() {
        strides[offset + axis] = if dim == 1 { 0 } else { stride };
    }
    strides
}

/// Walks a flat index range of `shape`, yielding the element offset each
/// flat position maps to under `strides`. With all-zero strides it pins to
/// offset 0 (scalar broadcast); with the shape's own contiguous strides it
/// yields consecutive offsets.
#[derive(Debug)]
pub struct StridedIter {
    shape: Vec<usize>,
    strides: Vec<usize>,
    index: Vec<usize>,
    offset: usize,
}

impl StridedIter {
    /// Start at flat position `start` of `shape`
    pub fn new(shape: &[usize], strides: &[usize], start: usize) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        let mut index = vec![0usize; shape.len()];
        let mut remainder = start;
        for axis in (0..shape.len()).rev() {
            let dim = shape[axis].max(1);
            index[axis] = remainder % dim;
            remainder /= dim;
        }
        let offset = index
            .iter()
            .zip(strides)
            .map(|(i, s)| i * s)
            .sum();
        Self {
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            index,
            offset,
        }
    }
}

impl StridedIter {
    /// The offset at the current position, advancing one flat step.
    /// Total steps are bounded by the caller; walking past the end wraps.
    pub fn next_offset(&mut self) -> usize {
        let current = self.offset;
        for axis in (0..self.shape.len()).rev() {
            self.index[axis] += 1;
            self.offset += self.strides[axis];
            if self.index[axis] < self.shape[axis] {
                return current;
            }
            self.offset -= self.strides[axis] * self.shape[axis];
            self.index[axis] = 0;
        }
        current
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        Some(self.next_offset())
    }
}
