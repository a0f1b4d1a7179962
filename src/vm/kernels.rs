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

//! Vectorized kernels
//!
//! One flat dispatch over the concrete opcode, then a plain `for` loop over
//! typed slices — tight enough for the compiler to autovectorize, with no
//! per-element dispatch. Temporary reuse means a destination register may
//! alias a source of the same kind; every kernel handles that with an
//! in-place loop (elementwise ops only depend on their own index, so
//! read-before-write per element is exact).
//!
//! Integer semantics the whole crate agrees on, compile-time folding
//! included (constant folding calls [`eval_scalar`], which runs these same
//! kernels on one-element buffers):
//! - integer divide/modulo by zero yields 0, never a trap
//! - integer overflow wraps
//! - float modulo follows the sign of the divisor
//! - float division by zero yields IEEE inf/nan

use num_complex::Complex64;
use smallvec::SmallVec;

use crate::compiler::opcodes::{global_registry, ConcreteOp, OpName};
use crate::core::array::ArrayData;
use crate::core::error::{Error, Result};
use crate::core::kind::{signature_string, Kind};
use crate::core::scalar::ScalarValue;

use super::broadcast::StridedIter;
use super::buffers::{dest_src, dest_src2, dest_src3, ChunkBuf};

/// One decoded instruction: opcode, destination register, source registers
/// (continuation operands already folded in)
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Concrete opcode
    pub op: ConcreteOp,
    /// Destination register index
    pub dest: usize,
    /// Source register indices in operand order
    pub srcs: SmallVec<[usize; 3]>,
}

fn kind_mismatch() -> Error {
    Error::internal("register kind does not match opcode")
}

// Same-kind unary op; destination may alias the source.
macro_rules! map_unary {
    ($regs:expr, $d:expr, $a:expr, $n:expr, $Var:ident, $f:expr) => {{
        if $d == $a {
            let ChunkBuf::$Var(dv) = &mut $regs[$d] else {
                return Err(kind_mismatch());
            };
            for x in dv[..$n].iter_mut() {
                *x = $f(*x);
            }
        } else {
            let (dm, sa) = dest_src($regs, $d, $a);
            let (ChunkBuf::$Var(dv), ChunkBuf::$Var(av)) = (dm, sa) else {
                return Err(kind_mismatch());
            };
            for (x, y) in dv[..$n].iter_mut().zip(&av[..$n]) {
                *x = $f(*y);
            }
        }
        Ok(())
    }};
}

// Kind-changing unary op (cast, abs of complex, real/imag); the kinds
// differ, so the registers cannot alias.
macro_rules! map_convert {
    ($regs:expr, $d:expr, $a:expr, $n:expr, $DVar:ident, $AVar:ident, $f:expr) => {{
        let (dm, sa) = dest_src($regs, $d, $a);
        let (ChunkBuf::$DVar(dv), ChunkBuf::$AVar(av)) = (dm, sa) else {
            return Err(kind_mismatch());
        };
        for (x, y) in dv[..$n].iter_mut().zip(&av[..$n]) {
            *x = $f(*y);
        }
        Ok(())
    }};
}

// Same-kind binary op; destination may alias either or both sources.
macro_rules! map_binary {
    ($regs:expr, $d:expr, $a:expr, $b:expr, $n:expr, $Var:ident, $f:expr) => {{
        if $d == $a && $d == $b {
            let ChunkBuf::$Var(dv) = &mut $regs[$d] else {
                return Err(kind_mismatch());
            };
            for x in dv[..$n].iter_mut() {
                let v = *x;
                *x = $f(v, v);
            }
        } else if $d == $a {
            let (dm, sb) = dest_src($regs, $d, $b);
            let (ChunkBuf::$Var(dv), ChunkBuf::$Var(bv)) = (dm, sb) else {
                return Err(kind_mismatch());
            };
            for (x, y) in dv[..$n].iter_mut().zip(&bv[..$n]) {
                let v = *x;
                *x = $f(v, *y);
            }
        } else if $d == $b {
            let (dm, sa) = dest_src($regs, $d, $a);
            let (ChunkBuf::$Var(dv), ChunkBuf::$Var(av)) = (dm, sa) else {
                return Err(kind_mismatch());
            };
            for (x, y) in dv[..$n].iter_mut().zip(&av[..$n]) {
                let v = *x;
                *x = $f(*y, v);
            }
        } else {
            let (dm, sa, sb) = dest_src2($regs, $d, $a, $b);
            let (ChunkBuf::$Var(dv), ChunkBuf::$Var(av), ChunkBuf::$Var(bv)) = (dm, sa, sb)
            else {
                return Err(kind_mismatch());
            };
            for i in 0..$n {
                dv[i] = $f(av[i], bv[i]);
            }
        }
        Ok(())
    }};
}

// Comparison producing Bool from same-kind sources. The destination is a
// bool register, the sources are not, so no aliasing (bool-kinded equality
// goes through map_binary instead).
macro_rules! map_compare {
    ($regs:expr, $d:expr, $a:expr, $b:expr, $n:expr, $Var:ident, $f:expr) => {{
        let (dm, sa, sb) = dest_src2($regs, $d, $a, $b);
        let (ChunkBuf::Bool(dv), ChunkBuf::$Var(av), ChunkBuf::$Var(bv)) = (dm, sa, sb) else {
            return Err(kind_mismatch());
        };
        for i in 0..$n {
            dv[i] = $f(&av[i], &bv[i]);
        }
        Ok(())
    }};
}

// Elementwise select with all registers distinct (the fast path).
macro_rules! map_where {
    ($regs:expr, $d:expr, $c:expr, $a:expr, $b:expr, $n:expr, $Var:ident) => {{
        let (dm, sc, sa, sb) = dest_src3($regs, $d, $c, $a, $b);
        let (
            ChunkBuf::$Var(dv),
            ChunkBuf::Bool(cv),
            ChunkBuf::$Var(av),
            ChunkBuf::$Var(bv),
        ) = (dm, sc, sa, sb)
        else {
            return Err(kind_mismatch());
        };
        for i in 0..$n {
            dv[i] = if cv[i] { av[i].clone() } else { bv[i].clone() };
        }
        Ok(())
    }};
}

/// Integer exponentiation by squaring; negative exponents collapse to the
/// 0/±1 cases (mirrors the divide-by-zero sentinel philosophy: no traps)
fn ipow64(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return match base {
            1 => 1,
            -1 => {
                if exp % 2 == 0 {
                    1
                } else {
                    -1
                }
            }
            _ => 0,
        };
    }
    let mut result = 1i64;
    let mut square = base;
    let mut remaining = exp as u64;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.wrapping_mul(square);
        }
        square = square.wrapping_mul(square);
        remaining >>= 1;
    }
    result
}

/// Integer modulo with the result taking the divisor's sign
fn floor_mod_i64(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        r.wrapping_add(y)
    } else {
        r
    }
}

fn floor_mod_i32(x: i32, y: i32) -> i32 {
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        r.wrapping_add(y)
    } else {
        r
    }
}

/// Float modulo with the result taking the divisor's sign (NumPy semantics)
fn floor_mod_f64(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && (r < 0.0) != (y < 0.0) {
        r + y
    } else {
        r
    }
}

fn floor_mod_f32(x: f32, y: f32) -> f32 {
    let r = x % y;
    if r != 0.0 && (r < 0.0) != (y < 0.0) {
        r + y
    } else {
        r
    }
}

/// Register-to-register copy (same kind); aliasing is a no-op
fn copy_buf(regs: &mut [ChunkBuf], dest: usize, src: usize, n: usize) -> Result<()> {
    if dest == src {
        return Ok(());
    }
    let (dm, sa) = dest_src(regs, dest, src);
    match (dm, sa) {
        (ChunkBuf::Bool(dv), ChunkBuf::Bool(av)) => dv[..n].clone_from_slice(&av[..n]),
        (ChunkBuf::Int32(dv), ChunkBuf::Int32(av)) => dv[..n].clone_from_slice(&av[..n]),
        (ChunkBuf::Int64(dv), ChunkBuf::Int64(av)) => dv[..n].clone_from_slice(&av[..n]),
        (ChunkBuf::Float32(dv), ChunkBuf::Float32(av)) => dv[..n].clone_from_slice(&av[..n]),
        (ChunkBuf::Float64(dv), ChunkBuf::Float64(av)) => dv[..n].clone_from_slice(&av[..n]),
        (ChunkBuf::Complex128(dv), ChunkBuf::Complex128(av)) => {
            dv[..n].clone_from_slice(&av[..n]);
        }
        (ChunkBuf::Bytes(dv), ChunkBuf::Bytes(av)) => dv[..n].clone_from_slice(&av[..n]),
        _ => return Err(kind_mismatch()),
    }
    Ok(())
}

/// Cast between kinds; the kinds differ so the registers cannot alias
fn dispatch_cast(
    regs: &mut [ChunkBuf],
    d: usize,
    a: usize,
    n: usize,
    from: Kind,
    to: Kind,
) -> Result<()> {
    use Kind::*;
    match (from, to) {
        (Bool, Int32) => map_convert!(regs, d, a, n, Int32, Bool, |x: bool| x as i32),
        (Bool, Int64) => map_convert!(regs, d, a, n, Int64, Bool, |x: bool| x as i64),
        (Bool, Float32) => map_convert!(regs, d, a, n, Float32, Bool, |x: bool| x as i32 as f32),
        (Bool, Float64) => map_convert!(regs, d, a, n, Float64, Bool, |x: bool| x as i64 as f64),
        (Bool, Complex128) => map_convert!(regs, d, a, n, Complex128, Bool, |x: bool| {
            Complex64::new(x as i64 as f64, 0.0)
        }),
        (Int32, Int64) => map_convert!(regs, d, a, n, Int64, Int32, |x: i32| x as i64),
        (Int32, Float32) => map_convert!(regs, d, a, n, Float32, Int32, |x: i32| x as f32),
        (Int32, Float64) => map_convert!(regs, d, a, n, Float64, Int32, |x: i32| x as f64),
        (Int32, Complex128) => map_convert!(regs, d, a, n, Complex128, Int32, |x: i32| {
            Complex64::new(x as f64, 0.0)
        }),
        (Int64, Float32) => map_convert!(regs, d, a, n, Float32, Int64, |x: i64| x as f32),
        (Int64, Float64) => map_convert!(regs, d, a, n, Float64, Int64, |x: i64| x as f64),
        (Int64, Complex128) => map_convert!(regs, d, a, n, Complex128, Int64, |x: i64| {
            Complex64::new(x as f64, 0.0)
        }),
        (Float32, Float64) => map_convert!(regs, d, a, n, Float64, Float32, |x: f32| x as f64),
        (Float32, Complex128) => map_convert!(regs, d, a, n, Complex128, Float32, |x: f32| {
            Complex64::new(x as f64, 0.0)
        }),
        (Float64, Complex128) => map_convert!(regs, d, a, n, Complex128, Float64, |x: f64| {
            Complex64::new(x, 0.0)
        }),
        _ => Err(kind_mismatch()),
    }
}

/// Elementwise select; falls back to a per-element loop when the
/// destination aliases a source (possible after temporary reuse)
fn dispatch_where(
    regs: &mut [ChunkBuf],
    d: usize,
    c: usize,
    a: usize,
    b: usize,
    n: usize,
    kind: Kind,
) -> Result<()> {
    if d == c || d == a || d == b {
        for i in 0..n {
            let take_a = regs[c].get_bool(i);
            let v = if take_a {
                regs[a].get_scalar(i)
            } else {
                regs[b].get_scalar(i)
            };
            regs[d].set_scalar(i, v);
        }
        return Ok(());
    }
    match kind {
        Kind::Bool => map_where!(regs, d, c, a, b, n, Bool),
        Kind::Int32 => map_where!(regs, d, c, a, b, n, Int32),
        Kind::Int64 => map_where!(regs, d, c, a, b, n, Int64),
        Kind::Float32 => map_where!(regs, d, c, a, b, n, Float32),
        Kind::Float64 => map_where!(regs, d, c, a, b, n, Float64),
        Kind::Complex128 => map_where!(regs, d, c, a, b, n, Complex128),
        Kind::Bytes => map_where!(regs, d, c, a, b, n, Bytes),
    }
}

/// Execute one decoded instruction over the first `n` elements of the
/// register file's chunk buffers
pub fn execute(step: &Decoded, regs: &mut [ChunkBuf], n: usize) -> Result<()> {
    use Kind::*;
    let spec = step.op.spec();
    let d = step.dest;
    let s = &step.srcs;

    match spec.name {
        OpName::Copy => copy_buf(regs, d, s[0], n),
        OpName::Cast => dispatch_cast(regs, d, s[0], n, spec.operands[0], spec.result),

        OpName::Neg => match spec.result {
            Int32 => map_unary!(regs, d, s[0], n, Int32, |x: i32| x.wrapping_neg()),
            Int64 => map_unary!(regs, d, s[0], n, Int64, |x: i64| x.wrapping_neg()),
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| -x),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| -x),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| -x),
            _ => Err(kind_mismatch()),
        },

        OpName::Abs => match spec.operands[0] {
            Int32 => map_unary!(regs, d, s[0], n, Int32, |x: i32| x.wrapping_abs()),
            Int64 => map_unary!(regs, d, s[0], n, Int64, |x: i64| x.wrapping_abs()),
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.abs()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.abs()),
            Complex128 => {
                map_convert!(regs, d, s[0], n, Float64, Complex128, |x: Complex64| x.norm())
            }
            _ => Err(kind_mismatch()),
        },

        OpName::Invert => match spec.result {
            Bool => map_unary!(regs, d, s[0], n, Bool, |x: bool| !x),
            Int32 => map_unary!(regs, d, s[0], n, Int32, |x: i32| !x),
            Int64 => map_unary!(regs, d, s[0], n, Int64, |x: i64| !x),
            _ => Err(kind_mismatch()),
        },

        OpName::Add => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                x.wrapping_add(y)
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                x.wrapping_add(y)
            }),
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, |x: f32, y: f32| x + y),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, |x: f64, y: f64| x + y),
            Complex128 => map_binary!(regs, d, s[0], s[1], n, Complex128, |x: Complex64,
                                                                           y: Complex64| {
                x + y
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::Sub => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                x.wrapping_sub(y)
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                x.wrapping_sub(y)
            }),
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, |x: f32, y: f32| x - y),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, |x: f64, y: f64| x - y),
            Complex128 => map_binary!(regs, d, s[0], s[1], n, Complex128, |x: Complex64,
                                                                           y: Complex64| {
                x - y
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::Mul => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                x.wrapping_mul(y)
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                x.wrapping_mul(y)
            }),
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, |x: f32, y: f32| x * y),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, |x: f64, y: f64| x * y),
            Complex128 => map_binary!(regs, d, s[0], s[1], n, Complex128, |x: Complex64,
                                                                           y: Complex64| {
                x * y
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::Div => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                if y == 0 {
                    0
                } else {
                    x.wrapping_div(y)
                }
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                if y == 0 {
                    0
                } else {
                    x.wrapping_div(y)
                }
            }),
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, |x: f32, y: f32| x / y),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, |x: f64, y: f64| x / y),
            Complex128 => map_binary!(regs, d, s[0], s[1], n, Complex128, |x: Complex64,
                                                                           y: Complex64| {
                x / y
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::Mod => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                if y == 0 {
                    0
                } else {
                    floor_mod_i32(x, y)
                }
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                if y == 0 {
                    0
                } else {
                    floor_mod_i64(x, y)
                }
            }),
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, floor_mod_f32),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, floor_mod_f64),
            _ => Err(kind_mismatch()),
        },

        OpName::Pow => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                ipow64(x as i64, y as i64) as i32
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, ipow64),
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, |x: f32, y: f32| x.powf(y)),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, |x: f64, y: f64| x.powf(y)),
            Complex128 => map_binary!(regs, d, s[0], s[1], n, Complex128, |x: Complex64,
                                                                           y: Complex64| {
                x.powc(y)
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::LShift => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                x.wrapping_shl(y as u32)
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                x.wrapping_shl(y as u32)
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::RShift => match spec.result {
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| {
                x.wrapping_shr(y as u32)
            }),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| {
                x.wrapping_shr(y as u32)
            }),
            _ => Err(kind_mismatch()),
        },

        OpName::BitAnd => match spec.result {
            Bool => map_binary!(regs, d, s[0], s[1], n, Bool, |x: bool, y: bool| x & y),
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| x & y),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| x & y),
            _ => Err(kind_mismatch()),
        },

        OpName::BitOr => match spec.result {
            Bool => map_binary!(regs, d, s[0], s[1], n, Bool, |x: bool, y: bool| x | y),
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| x | y),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| x | y),
            _ => Err(kind_mismatch()),
        },

        OpName::BitXor => match spec.result {
            Bool => map_binary!(regs, d, s[0], s[1], n, Bool, |x: bool, y: bool| x ^ y),
            Int32 => map_binary!(regs, d, s[0], s[1], n, Int32, |x: i32, y: i32| x ^ y),
            Int64 => map_binary!(regs, d, s[0], s[1], n, Int64, |x: i64, y: i64| x ^ y),
            _ => Err(kind_mismatch()),
        },

        OpName::Lt => dispatch_ordering(regs, d, s[0], s[1], n, spec.operands[0], Ordering::Lt),
        OpName::Le => dispatch_ordering(regs, d, s[0], s[1], n, spec.operands[0], Ordering::Le),
        OpName::Gt => dispatch_ordering(regs, d, s[0], s[1], n, spec.operands[0], Ordering::Gt),
        OpName::Ge => dispatch_ordering(regs, d, s[0], s[1], n, spec.operands[0], Ordering::Ge),
        OpName::Eq => dispatch_equality(regs, d, s[0], s[1], n, spec.operands[0], false),
        OpName::Ne => dispatch_equality(regs, d, s[0], s[1], n, spec.operands[0], true),

        OpName::Where => dispatch_where(regs, d, s[0], s[1], s[2], n, spec.result),

        OpName::Sqrt => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.sqrt()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.sqrt()),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.sqrt()),
            _ => Err(kind_mismatch()),
        },
        OpName::Exp => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.exp()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.exp()),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.exp()),
            _ => Err(kind_mismatch()),
        },
        OpName::Log => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.ln()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.ln()),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.ln()),
            _ => Err(kind_mismatch()),
        },
        OpName::Expm1 => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.exp_m1()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.exp_m1()),
            _ => Err(kind_mismatch()),
        },
        OpName::Log10 => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.log10()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.log10()),
            _ => Err(kind_mismatch()),
        },
        OpName::Log1p => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.ln_1p()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.ln_1p()),
            _ => Err(kind_mismatch()),
        },
        OpName::Sin => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.sin()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.sin()),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.sin()),
            _ => Err(kind_mismatch()),
        },
        OpName::Cos => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.cos()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.cos()),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.cos()),
            _ => Err(kind_mismatch()),
        },
        OpName::Tan => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.tan()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.tan()),
            Complex128 => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.tan()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arcsin => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.asin()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.asin()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arccos => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.acos()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.acos()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arctan => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.atan()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.atan()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arctan2 => match spec.result {
            Float32 => map_binary!(regs, d, s[0], s[1], n, Float32, |x: f32, y: f32| x.atan2(y)),
            Float64 => map_binary!(regs, d, s[0], s[1], n, Float64, |x: f64, y: f64| x.atan2(y)),
            _ => Err(kind_mismatch()),
        },
        OpName::Sinh => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.sinh()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.sinh()),
            _ => Err(kind_mismatch()),
        },
        OpName::Cosh => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.cosh()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.cosh()),
            _ => Err(kind_mismatch()),
        },
        OpName::Tanh => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.tanh()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.tanh()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arcsinh => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.asinh()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.asinh()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arccosh => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.acosh()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.acosh()),
            _ => Err(kind_mismatch()),
        },
        OpName::Arctanh => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.atanh()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.atanh()),
            _ => Err(kind_mismatch()),
        },
        OpName::Floor => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.floor()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.floor()),
            _ => Err(kind_mismatch()),
        },
        OpName::Ceil => match spec.result {
            Float32 => map_unary!(regs, d, s[0], n, Float32, |x: f32| x.ceil()),
            Float64 => map_unary!(regs, d, s[0], n, Float64, |x: f64| x.ceil()),
            _ => Err(kind_mismatch()),
        },

        OpName::Real => map_convert!(regs, d, s[0], n, Float64, Complex128, |x: Complex64| x.re),
        OpName::Imag => map_convert!(regs, d, s[0], n, Float64, Complex128, |x: Complex64| x.im),
        OpName::Conj => map_unary!(regs, d, s[0], n, Complex128, |x: Complex64| x.conj()),

        OpName::Noop | OpName::Sum | OpName::Prod => Err(Error::internal(
            "noop and reduction opcodes are handled by the chunk loop, not the kernel table",
        )),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Ordering {
    Lt,
    Le,
    Gt,
    Ge,
}

fn dispatch_ordering(
    regs: &mut [ChunkBuf],
    d: usize,
    a: usize,
    b: usize,
    n: usize,
    kind: Kind,
    which: Ordering,
) -> Result<()> {
    macro_rules! per_kind {
        ($Var:ident, $t:ty) => {{
            match which {
                Ordering::Lt => map_compare!(regs, d, a, b, n, $Var, |x: &$t, y: &$t| x < y),
                Ordering::Le => map_compare!(regs, d, a, b, n, $Var, |x: &$t, y: &$t| x <= y),
                Ordering::Gt => map_compare!(regs, d, a, b, n, $Var, |x: &$t, y: &$t| x > y),
                Ordering::Ge => map_compare!(regs, d, a, b, n, $Var, |x: &$t, y: &$t| x >= y),
            }
        }};
    }
    match kind {
        Kind::Int32 => per_kind!(Int32, i32),
        Kind::Int64 => per_kind!(Int64, i64),
        Kind::Float32 => per_kind!(Float32, f32),
        Kind::Float64 => per_kind!(Float64, f64),
        Kind::Bytes => per_kind!(Bytes, Vec<u8>),
        _ => Err(kind_mismatch()),
    }
}

fn dispatch_equality(
    regs: &mut [ChunkBuf],
    d: usize,
    a: usize,
    b: usize,
    n: usize,
    kind: Kind,
    negate: bool,
) -> Result<()> {
    macro_rules! per_kind {
        ($Var:ident, $t:ty) => {{
            if negate {
                map_compare!(regs, d, a, b, n, $Var, |x: &$t, y: &$t| x != y)
            } else {
                map_compare!(regs, d, a, b, n, $Var, |x: &$t, y: &$t| x == y)
            }
        }};
    }
    match kind {
        // Bool equality may alias the destination; map_binary handles that.
        Kind::Bool => {
            if negate {
                map_binary!(regs, d, a, b, n, Bool, |x: bool, y: bool| x != y)
            } else {
                map_binary!(regs, d, a, b, n, Bool, |x: bool, y: bool| x == y)
            }
        }
        Kind::Int32 => per_kind!(Int32, i32),
        Kind::Int64 => per_kind!(Int64, i64),
        Kind::Float32 => per_kind!(Float32, f32),
        Kind::Float64 => per_kind!(Float64, f64),
        Kind::Complex128 => per_kind!(Complex128, Complex64),
        Kind::Bytes => per_kind!(Bytes, Vec<u8>),
    }
}

/// Evaluate one operation on scalar operands by running its chunk kernel
/// over one-element buffers. Constant folding uses this, which is what
/// keeps compile-time folding and run-time execution byte-for-byte agreed.
pub fn eval_scalar(name: OpName, result_kind: Kind, args: &[ScalarValue]) -> Result<ScalarValue> {
    if name == OpName::Copy {
        return Ok(args[0].clone());
    }
    if name == OpName::Cast {
        return args[0].cast_to(result_kind);
    }
    let kinds: Vec<Kind> = args.iter().map(|v| v.kind()).collect();
    let op = global_registry().lookup(name, &kinds).ok_or_else(|| {
        Error::internal(format!(
            "no concrete opcode while folding '{}' over \"{}\"",
            name,
            signature_string(&kinds)
        ))
    })?;
    debug_assert_eq!(op.result(), result_kind, "fold kind disagrees with resolver");

    let mut regs: Vec<ChunkBuf> = Vec::with_capacity(args.len() + 1);
    regs.push(ChunkBuf::new(result_kind, 1));
    let mut srcs: SmallVec<[usize; 3]> = SmallVec::new();
    for (index, arg) in args.iter().enumerate() {
        regs.push(ChunkBuf::splat(arg, 1));
        srcs.push(index + 1);
    }
    let step = Decoded { op, dest: 0, srcs };
    execute(&step, &mut regs, 1)?;
    Ok(regs[0].get_scalar(0))
}

/// The identity element a reduction's accumulator starts from
pub fn reduction_init(op: OpName, kind: Kind) -> ScalarValue {
    let one = matches!(op, OpName::Prod);
    match kind {
        Kind::Int64 => ScalarValue::Int64(if one { 1 } else { 0 }),
        Kind::Float32 => ScalarValue::Float32(if one { 1.0 } else { 0.0 }),
        Kind::Float64 => ScalarValue::Float64(if one { 1.0 } else { 0.0 }),
        Kind::Complex128 => ScalarValue::Complex128(Complex64::new(
            if one { 1.0 } else { 0.0 },
            0.0,
        )),
        // The resolver only produces the four kinds above for reductions.
        _ => ScalarValue::Int64(if one { 1 } else { 0 }),
    }
}

/// Fold one chunk of the source register into the accumulator, routing each
/// element to its output slot through `offsets` (all-zero strides for a
/// full reduction, axis-collapsed strides for an axis reduction).
pub fn fold_reduction(
    op: OpName,
    acc: &mut ArrayData,
    offsets: &mut StridedIter,
    src: &ChunkBuf,
    n: usize,
) -> Result<()> {
    macro_rules! fold {
        ($AVar:ident, $SVar:ident, $f:expr) => {{
            let (ArrayData::$AVar(av), ChunkBuf::$SVar(sv)) = (acc, src) else {
                return Err(kind_mismatch());
            };
            for value in sv[..n].iter() {
                let slot = offsets.next_offset();
                av[slot] = $f(av[slot], *value);
            }
            Ok(())
        }};
    }
    match (op, src.kind()) {
        (OpName::Sum, Kind::Int64) => {
            fold!(Int64, Int64, |a: i64, v: i64| a.wrapping_add(v))
        }
        (OpName::Sum, Kind::Float32) => fold!(Float32, Float32, |a: f32, v: f32| a + v),
        (OpName::Sum, Kind::Float64) => fold!(Float64, Float64, |a: f64, v: f64| a + v),
        (OpName::Sum, Kind::Complex128) => {
            fold!(Complex128, Complex128, |a: Complex64, v: Complex64| a + v)
        }
        (OpName::Prod, Kind::Int64) => {
            fold!(Int64, Int64, |a: i64, v: i64| a.wrapping_mul(v))
        }
        (OpName::Prod, Kind::Float32) => fold!(Float32, Float32, |a: f32, v: f32| a * v),
        (OpName::Prod, Kind::Float64) => fold!(Float64, Float64, |a: f64, v: f64| a * v),
        (OpName::Prod, Kind::Complex128) => {
            fold!(Complex128, Complex128, |a: Complex64, v: Complex64| a * v)
        }
        _ => Err(kind_mismatch()),
    }
}

/// Merge two per-thread partial accumulators of a full reduction
pub fn combine_partials(
    op: OpName,
    kind: Kind,
    a: ScalarValue,
    b: ScalarValue,
) -> Result<ScalarValue> {
    let merge = match op {
        OpName::Sum => OpName::Add,
        OpName::Prod => OpName::Mul,
        other => {
            return Err(Error::internal(format!(
                "'{}' is not a reduction operation",
                other
            )))
        }
    };
    eval_scalar(merge, kind, &[a, b])
}
