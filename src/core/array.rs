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

//! Owned n-dimensional arrays
//!
//! [`NdArray`] is the value type the VM consumes and produces: a contiguous,
//! row-major buffer of one [`Kind`] plus a shape. Scalars are 0-d arrays.
//! Broadcasting is planned by the VM; the array itself is always dense.

use num_complex::Complex64;

use super::error::{Error, Result};
use super::kind::Kind;
use super::scalar::ScalarValue;

/// Typed contiguous storage, one variant per kind
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Complex128(Vec<Complex64>),
    Bytes(Vec<Vec<u8>>),
}

impl ArrayData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Int32(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
            ArrayData::Complex128(v) => v.len(),
            ArrayData::Bytes(v) => v.len(),
        }
    }

    /// True when the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The kind of the stored elements
    pub fn kind(&self) -> Kind {
        match self {
            ArrayData::Bool(_) => Kind::Bool,
            ArrayData::Int32(_) => Kind::Int32,
            ArrayData::Int64(_) => Kind::Int64,
            ArrayData::Float32(_) => Kind::Float32,
            ArrayData::Float64(_) => Kind::Float64,
            ArrayData::Complex128(_) => Kind::Complex128,
            ArrayData::Bytes(_) => Kind::Bytes,
        }
    }

    /// Allocate a zero-initialized buffer of `kind` with `len` elements.
    /// (Bool is false, Bytes is the empty string.)
    pub fn zeros(kind: Kind, len: usize) -> ArrayData {
        match kind {
            Kind::Bool => ArrayData::Bool(vec![false; len]),
            Kind::Int32 => ArrayData::Int32(vec![0; len]),
            Kind::Int64 => ArrayData::Int64(vec![0; len]),
            Kind::Float32 => ArrayData::Float32(vec![0.0; len]),
            Kind::Float64 => ArrayData::Float64(vec![0.0; len]),
            Kind::Complex128 => ArrayData::Complex128(vec![Complex64::new(0.0, 0.0); len]),
            Kind::Bytes => ArrayData::Bytes(vec![Vec::new(); len]),
        }
    }

    /// Allocate a buffer filled with `value`
    pub fn splat(value: &ScalarValue, len: usize) -> ArrayData {
        match value {
            ScalarValue::Bool(v) => ArrayData::Bool(vec![*v; len]),
            ScalarValue::Int32(v) => ArrayData::Int32(vec![*v; len]),
            ScalarValue::Int64(v) => ArrayData::Int64(vec![*v; len]),
            ScalarValue::Float32(v) => ArrayData::Float32(vec![*v; len]),
            ScalarValue::Float64(v) => ArrayData::Float64(vec![*v; len]),
            ScalarValue::Complex128(v) => ArrayData::Complex128(vec![*v; len]),
            ScalarValue::Bytes(v) => ArrayData::Bytes(vec![v.clone(); len]),
        }
    }

    /// Read one element as a [`ScalarValue`] (off the hot path)
    pub fn get(&self, index: usize) -> ScalarValue {
        match self {
            ArrayData::Bool(v) => ScalarValue::Bool(v[index]),
            ArrayData::Int32(v) => ScalarValue::Int32(v[index]),
            ArrayData::Int64(v) => ScalarValue::Int64(v[index]),
            ArrayData::Float32(v) => ScalarValue::Float32(v[index]),
            ArrayData::Float64(v) => ScalarValue::Float64(v[index]),
            ArrayData::Complex128(v) => ScalarValue::Complex128(v[index]),
            ArrayData::Bytes(v) => ScalarValue::Bytes(v[index].clone()),
        }
    }
}

/// An owned, contiguous, row-major n-dimensional array
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Create an array from storage and a shape.
    /// The element count must match the shape's product.
    pub fn new(data: ArrayData, shape: Vec<usize>) -> Result<NdArray> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::value(format!(
                "buffer holds {} elements but shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(NdArray { shape, data })
    }

    /// Create a 0-d array holding one value
    pub fn scalar(value: ScalarValue) -> NdArray {
        NdArray {
            shape: Vec::new(),
            data: ArrayData::splat(&value, 1),
        }
    }

    /// Create a 1-d array from a vector
    pub fn from_vec(data: ArrayData) -> NdArray {
        let shape = vec![data.len()];
        NdArray { shape, data }
    }

    /// Allocate a zero-initialized array
    pub fn zeros(kind: Kind, shape: Vec<usize>) -> NdArray {
        let len = shape.iter().product();
        NdArray {
            shape,
            data: ArrayData::zeros(kind, len),
        }
    }

    /// Allocate an array filled with `value`
    pub fn full(value: &ScalarValue, shape: Vec<usize>) -> NdArray {
        let len = shape.iter().product();
        NdArray {
            shape,
            data: ArrayData::splat(value, len),
        }
    }

    /// Element kind
    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    /// Shape (empty slice for 0-d scalars)
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total element count (1 for 0-d scalars)
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// True when any axis has length zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True for 0-d arrays
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Underlying storage
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Mutable underlying storage
    pub fn data_mut(&mut self) -> &mut ArrayData {
        &mut self.data
    }

    /// Consume into storage and shape
    pub fn into_parts(self) -> (ArrayData, Vec<usize>) {
        (self.data, self.shape)
    }

    /// Read one element by flat index (off the hot path, for tests)
    pub fn get(&self, index: usize) -> ScalarValue {
        self.data.get(index)
    }

    /// Widen every element to `target`. Upward promotion only.
    pub fn widen_to(&self, target: Kind) -> Result<NdArray> {
        if self.kind() == target {
            return Ok(self.clone());
        }
        if !self.kind().promotes_to(target) {
            return Err(Error::type_error(format!(
                "cannot widen a {} array to {}",
                self.kind(),
                target
            )));
        }
        let len = self.data.len();
        let mut out = ArrayData::zeros(target, 0);
        match (&self.data, &mut out) {
            (ArrayData::Bool(src), ArrayData::Int32(dst)) => {
                dst.extend(src.iter().map(|&v| v as i32));
            }
            (ArrayData::Bool(src), ArrayData::Int64(dst)) => {
                dst.extend(src.iter().map(|&v| v as i64));
            }
            (ArrayData::Bool(src), ArrayData::Float32(dst)) => {
                dst.extend(src.iter().map(|&v| v as i32 as f32));
            }
            (ArrayData::Bool(src), ArrayData::Float64(dst)) => {
                dst.extend(src.iter().map(|&v| v as i64 as f64));
            }
            (ArrayData::Bool(src), ArrayData::Complex128(dst)) => {
                dst.extend(src.iter().map(|&v| Complex64::new(v as i64 as f64, 0.0)));
            }
            (ArrayData::Int32(src), ArrayData::Int64(dst)) => {
                dst.extend(src.iter().map(|&v| v as i64));
            }
            (ArrayData::Int32(src), ArrayData::Float32(dst)) => {
                dst.extend(src.iter().map(|&v| v as f32));
            }
            (ArrayData::Int32(src), ArrayData::Float64(dst)) => {
                dst.extend(src.iter().map(|&v| v as f64));
            }
            (ArrayData::Int32(src), ArrayData::Complex128(dst)) => {
                dst.extend(src.iter().map(|&v| Complex64::new(v as f64, 0.0)));
            }
            (ArrayData::Int64(src), ArrayData::Float32(dst)) => {
                dst.extend(src.iter().map(|&v| v as f32));
            }
            (ArrayData::Int64(src), ArrayData::Float64(dst)) => {
                dst.extend(src.iter().map(|&v| v as f64));
            }
            (ArrayData::Int64(src), ArrayData::Complex128(dst)) => {
                dst.extend(src.iter().map(|&v| Complex64::new(v as f64, 0.0)));
            }
            (ArrayData::Float32(src), ArrayData::Float64(dst)) => {
                dst.extend(src.iter().map(|&v| v as f64));
            }
            (ArrayData::Float32(src), ArrayData::Complex128(dst)) => {
                dst.extend(src.iter().map(|&v| Complex64::new(v as f64, 0.0)));
            }
            (ArrayData::Float64(src), ArrayData::Complex128(dst)) => {
                dst.extend(src.iter().map(|&v| Complex64::new(v, 0.0)));
            }
            _ => {
                return Err(Error::internal(format!(
                    "unhandled widening {} -> {}",
                    self.kind(),
                    target
                )))
            }
        }
        debug_assert_eq!(out.len(), len);
        Ok(NdArray {
            shape: self.shape.clone(),
            data: out,
        })
    }

    /// Typed slice view, for tests and result extraction
    pub fn as_bool(&self) -> Option<&[bool]> {
        match &self.data {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Typed slice view, for tests and result extraction
    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            ArrayData::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Typed slice view, for tests and result extraction
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArrayData::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Typed slice view, for tests and result extraction
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            ArrayData::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Typed slice view, for tests and result extraction
    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Typed slice view, for tests and result extraction
    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match &self.data {
            ArrayData::Complex128(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for NdArray {
    fn from(v: bool) -> Self {
        NdArray::scalar(ScalarValue::Bool(v))
    }
}

impl From<i32> for NdArray {
    fn from(v: i32) -> Self {
        NdArray::scalar(ScalarValue::Int32(v))
    }
}

impl From<i64> for NdArray {
    fn from(v: i64) -> Self {
        NdArray::scalar(ScalarValue::Int64(v))
    }
}

impl From<f64> for NdArray {
    fn from(v: f64) -> Self {
        NdArray::scalar(ScalarValue::Float64(v))
    }
}

impl From<Vec<bool>> for NdArray {
    fn from(v: Vec<bool>) -> Self {
        NdArray::from_vec(ArrayData::Bool(v))
    }
}

impl From<Vec<i32>> for NdArray {
    fn from(v: Vec<i32>) -> Self {
        NdArray::from_vec(ArrayData::Int32(v))
    }
}

impl From<Vec<i64>> for NdArray {
    fn from(v: Vec<i64>) -> Self {
        NdArray::from_vec(ArrayData::Int64(v))
    }
}

impl From<Vec<f32>> for NdArray {
    fn from(v: Vec<f32>) -> Self {
        NdArray::from_vec(ArrayData::Float32(v))
    }
}

impl From<Vec<f64>> for NdArray {
    fn from(v: Vec<f64>) -> Self {
        NdArray::from_vec(ArrayData::Float64(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_shape() {
        let ok = NdArray::new(ArrayData::Float64(vec![0.0; 6]), vec![2, 3]);
        assert!(ok.is_ok());
        let bad = NdArray::new(ArrayData::Float64(vec![0.0; 5]), vec![2, 3]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_scalar_is_zero_d() {
        let a = NdArray::scalar(ScalarValue::Float64(3.5));
        assert!(a.is_scalar());
        assert_eq!(a.shape(), &[] as &[usize]);
        assert_eq!(a.len(), 1);
        assert_eq!(a.get(0), ScalarValue::Float64(3.5));
    }

    #[test]
    fn test_empty_axis() {
        let a = NdArray::zeros(Kind::Float64, vec![0]);
        assert!(a.is_empty());
        assert_eq!(a.len(), 0);
        assert_eq!(a.shape(), &[0]);
    }

    #[test]
    fn test_widen_int32_to_float64() {
        let a: NdArray = vec![1i32, 2, 3].into();
        let w = a.widen_to(Kind::Float64).unwrap();
        assert_eq!(w.kind(), Kind::Float64);
        assert_eq!(w.as_f64().unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(w.shape(), a.shape());
    }

    #[test]
    fn test_widen_rejects_downward() {
        let a: NdArray = vec![1.5f64].into();
        assert!(a.widen_to(Kind::Int64).is_err());
    }

    #[test]
    fn test_widen_to_complex() {
        let a: NdArray = vec![2.0f64].into();
        let w = a.widen_to(Kind::Complex128).unwrap();
        assert_eq!(w.as_complex().unwrap()[0], Complex64::new(2.0, 0.0));
    }

    #[test]
    fn test_full_and_zeros() {
        let ones = NdArray::full(&ScalarValue::Int64(1), vec![4]);
        assert_eq!(ones.as_i64().unwrap(), &[1, 1, 1, 1]);
        let z = NdArray::zeros(Kind::Bool, vec![2, 2]);
        assert_eq!(z.as_bool().unwrap(), &[false; 4]);
    }
}
