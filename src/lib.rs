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

//! # Vexpr - compiled vectorized expression engine
//!
//! Vexpr compiles numeric array expressions like `"2.0*a + 3.0*b*c"` into
//! compact register bytecode and evaluates them over n-dimensional arrays
//! in cache-sized chunks, optionally fanned out across worker threads.
//!
//! ## Key features
//!
//! - **Typed compilation** - every node gets one kind (bool, int32, int64,
//!   float32, float64, complex128, bytes) under NumPy-style promotion, with
//!   explicit casts inserted at compile time
//! - **Optimizing compiler** - constant folding through the VM's own
//!   kernels, algebraic rewrites (`x/c -> x*(1/c)`, `x**2 -> x*x`, power
//!   expansion by squaring), and common-subexpression elimination
//! - **Register reuse** - liveness-based temporary recycling keeps register
//!   pressure at peak simultaneous liveness, not op count
//! - **Chunked vectorized VM** - flat opcode dispatch over contiguous chunk
//!   buffers, NumPy-style broadcasting, fail-fast shape/type validation
//! - **Parallel evaluation** - large arrays split into disjoint chunk
//!   ranges across rayon workers; full reductions merge per-thread partials
//! - **Compile cache** - `evaluate()` memoizes programs by expression text,
//!   options and input signature
//!
//! ## Quick start
//!
//! ```rust
//! use vexpr::{evaluate, NdArray};
//!
//! let a: NdArray = vec![1.0f64, 2.0, 3.0].into();
//! let b: NdArray = vec![4.0f64, 5.0, 6.0].into();
//! let c: NdArray = vec![7.0f64, 8.0, 9.0].into();
//!
//! let out = evaluate("2.0*a + 3.0*b*c", &[("a", &a), ("b", &b), ("c", &c)]).unwrap();
//! assert_eq!(out.as_f64().unwrap(), &[86.0, 124.0, 168.0]);
//! ```
//!
//! Compiled programs can also be built and run explicitly:
//!
//! ```rust
//! use vexpr::{compile, CompileOptions, Kind, NdArray};
//!
//! let sig = vec![("x".to_string(), Kind::Float64)];
//! let prog = compile("sum(x**2, axis=0)", &sig, &CompileOptions::default()).unwrap();
//!
//! let x: NdArray = vec![1.0f64, 2.0, 3.0].into();
//! let out = prog.run(&[&x], None).unwrap();
//! assert_eq!(out.as_f64().unwrap(), &[14.0]);
//! ```
//!
//! ## Modules
//!
//! - [`core`] - fundamental types ([`Kind`], [`ScalarValue`], [`NdArray`], [`Error`])
//! - [`parser`] - expression text -> AST
//! - [`compiler`] - kind resolution, optimization, register allocation, assembly
//! - [`vm`] - chunked, broadcast-aware, multi-threaded execution
//! - [`api`] - evaluate-by-string convenience layer with the compile cache

pub mod api;
pub mod compiler;
pub mod core;
pub mod parser;
pub mod vm;

// Re-export main types for convenience
pub use crate::core::{ArrayData, Error, Kind, NdArray, Result, ScalarValue};

pub use crate::compiler::{
    compile, compile_tree, CompileOptions, CompiledExpression, ExprTree, Instruction, NodeId,
    OpName, OptLevel, Reduction,
};

pub use crate::api::{cache_size, clear_cache, evaluate, evaluate_with_options};

pub use crate::vm::{get_num_threads, set_num_threads};
