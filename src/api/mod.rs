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

//! Evaluate-by-string convenience layer
//!
//! [`evaluate`] goes from expression text and a name -> array environment to
//! a result in one call: variable kinds are inferred from the arrays,
//! inputs are ordered by first appearance in the expression, and compiled
//! programs are memoized in a process-wide bounded cache keyed by
//! (expression text, options, concrete signature).
//!
//! Cache eviction is deliberately relaxed: when the bound is hit, an
//! arbitrary ~10% batch of entries is dropped rather than tracking strict
//! LRU order. Hot expressions recompile at most once after a prune.

use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::compiler::{compile, CompileOptions, CompiledExpression};
use crate::core::array::NdArray;
use crate::core::error::{Error, Result};
use crate::core::kind::Kind;
use crate::parser::parse;

/// Bound on cached compiled programs
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Share of entries dropped when the cache is full
const PRUNE_FACTOR: f64 = 0.1;

type CacheKey = (String, CompileOptions, Vec<(String, Kind)>);

/// Bounded compile cache with batch eviction
struct ExprCache {
    programs: RwLock<FxHashMap<CacheKey, Arc<CompiledExpression>>>,
    /// Variable order per expression text, so cache hits skip re-parsing
    names: RwLock<FxHashMap<String, Arc<Vec<String>>>>,
    max_size: usize,
}

impl ExprCache {
    fn new(max_size: usize) -> Self {
        Self {
            programs: RwLock::new(FxHashMap::default()),
            names: RwLock::new(FxHashMap::default()),
            max_size,
        }
    }

    fn variable_order(&self, expr: &str) -> Result<Arc<Vec<String>>> {
        if let Some(names) = self.names.read().get(expr) {
            return Ok(names.clone());
        }
        let (tree, root) = parse(expr).map_err(|e| e.with_expr(expr))?;
        let names = Arc::new(tree.variable_order(root));
        let mut map = self.names.write();
        if map.len() >= self.max_size {
            Self::prune(&mut map, self.max_size);
        }
        map.insert(expr.to_string(), names.clone());
        Ok(names)
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<CompiledExpression>> {
        self.programs.read().get(key).cloned()
    }

    fn put(&self, key: CacheKey, program: Arc<CompiledExpression>) {
        let mut map = self.programs.write();
        if map.len() >= self.max_size {
            Self::prune(&mut map, self.max_size);
        }
        map.insert(key, program);
    }

    /// Drop an arbitrary ~10% of entries (at least one)
    fn prune<K: Clone + std::hash::Hash + Eq, V>(map: &mut FxHashMap<K, V>, max_size: usize) {
        let n_remove = ((max_size as f64 * PRUNE_FACTOR).ceil() as usize).max(1);
        let victims: Vec<K> = map.keys().take(n_remove).cloned().collect();
        for key in victims {
            map.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.programs.read().len()
    }

    fn clear(&self) {
        self.programs.write().clear();
        self.names.write().clear();
    }
}

fn global_cache() -> &'static ExprCache {
    static CACHE: OnceLock<ExprCache> = OnceLock::new();
    CACHE.get_or_init(|| ExprCache::new(DEFAULT_CACHE_SIZE))
}

/// Evaluate an expression against named arrays with default options
pub fn evaluate(expr: &str, env: &[(&str, &NdArray)]) -> Result<NdArray> {
    evaluate_with_options(expr, env, &CompileOptions::default())
}

/// Evaluate an expression against named arrays.
///
/// Variables take their kinds from the environment arrays; the compiled
/// program is cached under (text, options, signature) and reused by later
/// calls with matching kinds.
pub fn evaluate_with_options(
    expr: &str,
    env: &[(&str, &NdArray)],
    options: &CompileOptions,
) -> Result<NdArray> {
    let cache = global_cache();
    let names = cache.variable_order(expr)?;

    let mut signature = Vec::with_capacity(names.len());
    let mut inputs: Vec<&NdArray> = Vec::with_capacity(names.len());
    for name in names.iter() {
        let array = env
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| *a)
            .ok_or_else(|| {
                Error::type_error(format!("variable '{}' missing from environment", name))
                    .with_expr(expr)
            })?;
        signature.push((name.clone(), array.kind()));
        inputs.push(array);
    }

    let key: CacheKey = (expr.to_string(), *options, signature);
    let program = match cache.get(&key) {
        Some(program) => program,
        None => {
            let program = Arc::new(compile(expr, &key.2, options)?);
            cache.put(key, program.clone());
            program
        }
    };
    program.run(&inputs, None)
}

/// Number of compiled programs currently cached
pub fn cache_size() -> usize {
    global_cache().len()
}

/// Drop every cached program and parsed-name entry
pub fn clear_cache() {
    global_cache().clear();
}
