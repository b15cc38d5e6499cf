//! Function objects and their rewrite artifacts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::object::{Code, Value};
use crate::rewrite;

/// A function under execution: a code object plus the artifacts the
/// rewriter produced from it.
///
/// Construction runs the rewriter exactly once, before the function is
/// visible to anything else; every observer of a live function sees a fully
/// rewritten buffer and a fully sized, empty-primed cache array. The
/// original bytecode stays on the code object untouched, so constructing a
/// function from the same code again yields the same artifacts.
#[derive(Debug)]
pub struct Function {
    name: Arc<str>,
    code: Code,
    rewritten_bytecode: Vec<u8>,
    caches: Option<Vec<Value>>,
    global_cache_slots: HashMap<u32, u32>,
}

impl Function {
    /// Builds a function from a code object, rewriting its bytecode.
    pub fn with_code(name: &str, code: Code) -> Self {
        let rewritten = rewrite::rewrite_code(&code);
        Self {
            name: Arc::from(name),
            code,
            rewritten_bytecode: rewritten.bytecode,
            caches: rewritten.caches,
            global_cache_slots: rewritten.global_cache_slots,
        }
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The code object this function was built from.
    pub const fn code(&self) -> &Code {
        &self.code
    }

    /// The compiler-encoded bytecode, as retained by the code object.
    pub fn original_bytecode(&self) -> &[u8] {
        self.code.bytecode()
    }

    /// The rewritten, 4-byte-unit bytecode the interpreter executes.
    pub fn rewritten_bytecode(&self) -> &[u8] {
        &self.rewritten_bytecode
    }

    /// The inline-cache slots, or `None` when the rewrite allocated none.
    pub fn caches(&self) -> Option<&[Value]> {
        self.caches.as_deref()
    }

    /// The reserved-region cache slot assigned to a module-global name
    /// operand, if any global operation references it.
    pub fn global_cache_slot(&self, name_index: u32) -> Option<u32> {
        self.global_cache_slots.get(&name_index).copied()
    }

    /// Number of distinct global name operands seen by the rewriter.
    pub fn global_cache_slot_count(&self) -> usize {
        self.global_cache_slots.len()
    }
}
