//! Sandboxed expression evaluation for Tickloom.
//!
//! Trigger conditions (`"cpu > 80"`) and data-to-parameter mappings
//! (`"value / 100"`) are user-supplied strings. This crate compiles
//! them into a closed, whitelisted AST and evaluates them under step
//! and memory budgets:
//!
//! - **Compile** ([`compile`], [`ExprCompiler`]) — parse, resolve
//!   variables, enforce the whitelist and size limits. Anything
//!   dynamic (loops, name binding, attribute lookup, imports) simply
//!   has no node to compile to.
//! - **Evaluate** ([`Evaluator`]) — tree-walk with a deterministic
//!   step budget; render-path helpers degrade to typed zeros instead
//!   of propagating errors into the frame loop.
//!
//! The same compiled expression with the same bindings produces the
//! same bits everywhere, which is why trigger conditions are allowed
//! to participate in frame pre-computation.

mod ast;
mod error;
mod eval;
mod parser;
mod token;

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

pub use ast::Value;
pub use error::ExprError;
pub use eval::Evaluator;
pub use parser::{compile as compile_with_limits, CompiledExpr};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Compile-time resource limits.
#[derive(Debug, Clone)]
pub struct ExprLimits {
    /// Maximum source length in bytes.
    pub max_source_bytes: usize,
    /// Maximum parser nesting depth.
    pub max_depth: usize,
    /// Maximum estimated AST footprint in bytes.
    pub max_memory_bytes: usize,
}

impl Default for ExprLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: 4 * 1024,
            max_depth: 32,
            max_memory_bytes: 64 * 1024,
        }
    }
}

/// Compiles `src` against `allowed_vars` with default limits.
///
/// # Errors
/// See [`compile_with_limits`].
pub fn compile(
    src: &str,
    allowed_vars: &[&str],
) -> Result<CompiledExpr, ExprError> {
    compile_with_limits(src, allowed_vars, &ExprLimits::default())
}

// ---------------------------------------------------------------------------
// Compile cache
// ---------------------------------------------------------------------------

/// How many compiled expressions the cache keeps before evicting.
const CACHE_CAPACITY: usize = 256;

/// A bounded compile cache keyed by source text and variable set.
///
/// Trigger conditions are re-evaluated every tick but compiled once.
/// Eviction is insertion-order (oldest first) — expression sets are
/// small and stable, so anything fancier buys nothing.
#[derive(Debug, Default)]
pub struct ExprCompiler {
    limits: ExprLimits,
    cache: HashMap<String, Arc<CompiledExpr>>,
    insertion_order: VecDeque<String>,
}

impl ExprCompiler {
    pub fn new(limits: ExprLimits) -> Self {
        Self {
            limits,
            cache: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Compiles or returns the cached result.
    ///
    /// # Errors
    /// Same as [`compile_with_limits`]; failures are not cached.
    pub fn compile(
        &mut self,
        src: &str,
        allowed_vars: &[&str],
    ) -> Result<Arc<CompiledExpr>, ExprError> {
        let key = cache_key(src, allowed_vars);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit));
        }
        let compiled =
            Arc::new(compile_with_limits(src, allowed_vars, &self.limits)?);
        if self.cache.len() >= CACHE_CAPACITY {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
        self.cache.insert(key.clone(), Arc::clone(&compiled));
        self.insertion_order.push_back(key);
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn cache_key(src: &str, allowed_vars: &[&str]) -> String {
    // '\u{1f}' cannot appear in identifiers, so the key is unambiguous.
    let mut key = String::with_capacity(src.len() + 16);
    key.push_str(src);
    for var in allowed_vars {
        key.push('\u{1f}');
        key.push_str(var);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_caches_by_source_and_vars() {
        let mut compiler = ExprCompiler::default();
        let a = compiler.compile("x + 1", &["x"]).unwrap();
        let b = compiler.compile("x + 1", &["x"]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(compiler.len(), 1);

        // Same source, different variable table → different entry.
        let c = compiler.compile("x + 1", &["x", "y"]).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(compiler.len(), 2);
    }

    #[test]
    fn test_compiler_failures_are_not_cached() {
        let mut compiler = ExprCompiler::default();
        assert!(compiler.compile("x +", &["x"]).is_err());
        assert!(compiler.is_empty());
    }

    #[test]
    fn test_cache_eviction_is_bounded() {
        let mut compiler = ExprCompiler::default();
        for i in 0..(CACHE_CAPACITY + 10) {
            compiler.compile(&format!("{i} + 1"), &[]).unwrap();
        }
        assert_eq!(compiler.len(), CACHE_CAPACITY);
    }

    #[test]
    fn test_top_level_compile_smoke() {
        let expr = compile("min(a, b)", &["a", "b"]).unwrap();
        assert_eq!(expr.variables(), ["a", "b"]);
    }
}
