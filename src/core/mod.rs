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

//! Core types and definitions for vexpr
//!
//! This module contains the fundamental types used throughout the engine:
//!
//! - [`Kind`] - Element kinds (bool, int32, int64, float32, float64, complex128, bytes)
//! - [`ScalarValue`] - A single typed value (constants, folded results)
//! - [`NdArray`] - An owned n-dimensional array of one kind
//! - [`Error`] - Error types for all compile and run operations

pub mod array;
pub mod error;
pub mod kind;
pub mod scalar;

// Re-export main types for convenience
pub use array::{ArrayData, NdArray};
pub use error::{Error, Result};
pub use kind::Kind;
pub use scalar::ScalarValue;
