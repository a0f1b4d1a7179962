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

//! Chunk-local register buffers
//!
//! Each register of an executing program is backed by one [`ChunkBuf`]: a
//! contiguous typed buffer holding one chunk's worth of elements. A worker
//! owns its whole register file; kernels take disjoint mutable/shared
//! borrows of it through the split helpers here. No unsafe.

use num_complex::Complex64;

use crate::core::kind::Kind;
use crate::core::scalar::ScalarValue;

/// One register's chunk storage
#[derive(Debug, Clone)]
pub enum ChunkBuf {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Complex128(Vec<Complex64>),
    Bytes(Vec<Vec<u8>>),
}

impl ChunkBuf {
    /// Allocate a zeroed buffer of `kind` holding `len` elements
    pub fn new(kind: Kind, len: usize) -> Self {
        match kind {
            Kind::Bool => ChunkBuf::Bool(vec![false; len]),
            Kind::Int32 => ChunkBuf::Int32(vec![0; len]),
            Kind::Int64 => ChunkBuf::Int64(vec![0; len]),
            Kind::Float32 => ChunkBuf::Float32(vec![0.0; len]),
            Kind::Float64 => ChunkBuf::Float64(vec![0.0; len]),
            Kind::Complex128 => ChunkBuf::Complex128(vec![Complex64::new(0.0, 0.0); len]),
            Kind::Bytes => ChunkBuf::Bytes(vec![Vec::new(); len]),
        }
    }

    /// Fill a buffer with one value (constant registers)
    pub fn splat(value: &ScalarValue, len: usize) -> Self {
        match value {
            ScalarValue::Bool(v) => ChunkBuf::Bool(vec![*v; len]),
            ScalarValue::Int32(v) => ChunkBuf::Int32(vec![*v; len]),
            ScalarValue::Int64(v) => ChunkBuf::Int64(vec![*v; len]),
            ScalarValue::Float32(v) => ChunkBuf::Float32(vec![*v; len]),
            ScalarValue::Float64(v) => ChunkBuf::Float64(vec![*v; len]),
            ScalarValue::Complex128(v) => ChunkBuf::Complex128(vec![*v; len]),
            ScalarValue::Bytes(v) => ChunkBuf::Bytes(vec![v.clone(); len]),
        }
    }

    /// The element kind this buffer stores
    pub fn kind(&self) -> Kind {
        match self {
            ChunkBuf::Bool(_) => Kind::Bool,
            ChunkBuf::Int32(_) => Kind::Int32,
            ChunkBuf::Int64(_) => Kind::Int64,
            ChunkBuf::Float32(_) => Kind::Float32,
            ChunkBuf::Float64(_) => Kind::Float64,
            ChunkBuf::Complex128(_) => Kind::Complex128,
            ChunkBuf::Bytes(_) => Kind::Bytes,
        }
    }

    /// Element count
    pub fn len(&self) -> usize {
        match self {
            ChunkBuf::Bool(v) => v.len(),
            ChunkBuf::Int32(v) => v.len(),
            ChunkBuf::Int64(v) => v.len(),
            ChunkBuf::Float32(v) => v.len(),
            ChunkBuf::Float64(v) => v.len(),
            ChunkBuf::Complex128(v) => v.len(),
            ChunkBuf::Bytes(v) => v.len(),
        }
    }

    /// True when the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one element as a scalar (slow path and tests only)
    pub fn get_scalar(&self, index: usize) -> ScalarValue {
        match self {
            ChunkBuf::Bool(v) => ScalarValue::Bool(v[index]),
            ChunkBuf::Int32(v) => ScalarValue::Int32(v[index]),
            ChunkBuf::Int64(v) => ScalarValue::Int64(v[index]),
            ChunkBuf::Float32(v) => ScalarValue::Float32(v[index]),
            ChunkBuf::Float64(v) => ScalarValue::Float64(v[index]),
            ChunkBuf::Complex128(v) => ScalarValue::Complex128(v[index]),
            ChunkBuf::Bytes(v) => ScalarValue::Bytes(v[index].clone()),
        }
    }

    /// Write one element from a scalar (slow path only).
    /// The value's kind must match the buffer's kind.
    pub fn set_scalar(&mut self, index: usize, value: ScalarValue) {
        match (self, value) {
            (ChunkBuf::Bool(v), ScalarValue::Bool(x)) => v[index] = x,
            (ChunkBuf::Int32(v), ScalarValue::Int32(x)) => v[index] = x,
            (ChunkBuf::Int64(v), ScalarValue::Int64(x)) => v[index] = x,
            (ChunkBuf::Float32(v), ScalarValue::Float32(x)) => v[index] = x,
            (ChunkBuf::Float64(v), ScalarValue::Float64(x)) => v[index] = x,
            (ChunkBuf::Complex128(v), ScalarValue::Complex128(x)) => v[index] = x,
            (ChunkBuf::Bytes(v), ScalarValue::Bytes(x)) => v[index] = x,
            _ => debug_assert!(false, "scalar kind does not match buffer kind"),
        }
    }

    /// Read one bool element (where-condition slow path)
    pub fn get_bool(&self, index: usize) -> bool {
        match self {
            ChunkBuf::Bool(v) => v[index],
            _ => {
                debug_assert!(false, "condition register is not bool");
                false
            }
        }
    }
}

/// Disjoint mutable destination + shared source borrow. `dest != src`.
pub fn dest_src(regs: &mut [ChunkBuf], dest: usize, src: usize) -> (&mut ChunkBuf, &ChunkBuf) {
    debug_assert_ne!(dest, src);
    if dest < src {
        let (lo, hi) = regs.split_at_mut(src);
        (&mut lo[dest], &hi[0])
    } else {
        let (lo, hi) = regs.split_at_mut(dest);
        (&mut hi[0], &lo[src])
    }
}

/// Disjoint mutable destination + two shared sources.
/// `dest` must differ from both sources; the sources may coincide.
pub fn dest_src2(
    regs: &mut [ChunkBuf],
    dest: usize,
    a: usize,
    b: usize,
) -> (&mut ChunkBuf, &ChunkBuf, &ChunkBuf) {
    debug_assert!(dest != a && dest != b);
    let (lo, rest) = regs.split_at_mut(dest);
    let (dm, hi) = rest.split_first_mut().expect("dest register in range");
    let pick = |i: usize| {
        if i < dest {
            &lo[i]
        } else {
            &hi[i - dest - 1]
        }
    };
    (dm, pick(a), pick(b))
}

/// Disjoint mutable destination + three shared sources.
/// `dest` must differ from all three; the sources may coincide.
pub fn dest_src3(
    regs: &mut [ChunkBuf],
    dest: usize,
    a: usize,
    b: usize,
    c: usize,
) -> (&mut ChunkBuf, &ChunkBuf, &ChunkBuf, &ChunkBuf) {
    debug_assert!(dest != a && dest != b && dest != c);
    let (lo, rest) = regs.split_at_mut(dest);
    let (dm, hi) = rest.split_first_mut().expect("dest register in range");
    let pick = |i: usize| {
        if i < dest {
            &lo[i]
        } else {
            &hi[i - dest - 1]
        }
    };
    (dm, pick(a), pick(b), pick(c))
}
