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

//! Worker-thread configuration and work partitioning
//!
//! The worker count is process-wide mutable state, initialized to the
//! detected core count. An evaluate call either runs inline or splits the
//! chunk space into that many contiguous ranges and joins them on the rayon
//! pool before returning; changing the count concurrently with in-flight
//! evaluations is the caller's synchronization problem, not ours.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Elements processed per chunk. Sized so a handful of per-register chunk
/// buffers stay cache-resident; a tuning knob, not a correctness one.
pub const CHUNK_SIZE: usize = 4096;

/// Minimum total element count before an evaluation fans out to workers.
/// Below this the split/join overhead outweighs the parallelism.
pub const PARALLEL_THRESHOLD: usize = 32_768;

/// 0 means "not yet initialized"; the first read detects the core count.
static NUM_THREADS: AtomicUsize = AtomicUsize::new(0);

fn detected_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// The configured worker count
pub fn get_num_threads() -> usize {
    let current = NUM_THREADS.load(Ordering::Relaxed);
    if current != 0 {
        return current;
    }
    let cores = detected_cores();
    // Keep whatever another thread raced in first.
    match NUM_THREADS.compare_exchange(0, cores, Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => cores,
        Err(actual) => actual,
    }
}

/// Set the worker count, returning the previous value.
/// Counts are clamped to at least 1.
pub fn set_num_threads(n: usize) -> usize {
    let previous = get_num_threads();
    NUM_THREADS.store(n.max(1), Ordering::Relaxed);
    previous
}

/// Split `total` elements into per-worker ranges of whole chunks.
/// Returns the range length; ranges are `[i*len, min((i+1)*len, total))`.
pub fn range_size(total: usize, workers: usize) -> usize {
    let n_chunks = total.div_ceil(CHUNK_SIZE);
    let chunks_per_worker = n_chunks.div_ceil(workers.max(1));
    (chunks_per_worker * CHUNK_SIZE).max(CHUNK_SIZE)
}
