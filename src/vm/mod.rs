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

//! Virtual machine
//!
//! Executes compiled programs over arrays in fixed-size chunks: inputs are
//! gathered (with broadcast strides) into contiguous chunk buffers, every
//! instruction dispatches to a vectorized kernel over those buffers, and the
//! output register's chunk is written back to the result array. Large
//! element counts fan out across rayon workers, each owning private scratch.

pub mod broadcast;
pub mod buffers;
pub mod kernels;
pub mod machine;
pub mod threads;

pub use broadcast::broadcast_shapes;
pub use threads::{get_num_threads, set_num_threads, CHUNK_SIZE, PARALLEL_THRESHOLD};
