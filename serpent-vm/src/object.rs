//! Minimal object model consumed by the rewriter.
//!
//! The full runtime has a tagged-pointer object system; the front-end only
//! needs enough of it to inspect constants tuples, fill cache slots with
//! the none sentinel, and reconstruct immediate operands. [`Value`] is that
//! projection.

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::CodeError;
use serpent_bytecode::COMPILER_CODE_UNIT_SIZE;

/// A runtime value as seen by the bytecode front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The none singleton. Also the empty sentinel of cache slots.
    None,
    /// A boolean singleton.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A string.
    Str(Arc<str>),
    /// An immutable sequence.
    Tuple(Arc<[Value]>),
    /// A mutable sequence; stands in for arbitrary heap objects here.
    List(Arc<[Value]>),
}

impl Value {
    /// Builds a string value.
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Whether this is the none singleton.
    pub const fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The boolean payload, if this is a boolean singleton.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this is the empty-string singleton.
    pub fn is_empty_str(&self) -> bool {
        matches!(self, Value::Str(s) if s.is_empty())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

/// Smallest integer encodable as an immediate operand byte.
pub const MIN_IMMEDIATE_INT: i64 = -64;

/// Largest integer encodable as an immediate operand byte.
pub const MAX_IMMEDIATE_INT: i64 = 63;

/// Operand tag of the none singleton.
const OPARG_NONE: u8 = 0x07;

/// Operand tag of the empty-string singleton.
const OPARG_EMPTY_STR: u8 = 0x0d;

/// Encodes a value into the operand byte of an immediate load.
///
/// The tagging is invertible by [`value_from_oparg`]. Bit 0 clear means a
/// small integer stored two's-complement in the upper seven bits; the
/// remaining odd values tag the none and empty-string singletons. Booleans
/// are deliberately not part of this domain: they get their own load opcode
/// with the truth value in bit 7, which overlaps the small-int space and
/// therefore can never be folded into these tags.
///
/// Returns `None` for every value outside the encodable domain.
pub fn oparg_from_value(value: &Value) -> Option<u8> {
    match value {
        Value::None => Some(OPARG_NONE),
        Value::Str(s) if s.is_empty() => Some(OPARG_EMPTY_STR),
        Value::Int(i) if (MIN_IMMEDIATE_INT..=MAX_IMMEDIATE_INT).contains(i) => {
            Some((i << 1) as u8)
        }
        _ => None,
    }
}

/// Decodes the operand byte of an immediate load back into its value.
///
/// Inverse of [`oparg_from_value`] on the tag domain; unassigned odd tags
/// yield `None`.
pub fn value_from_oparg(oparg: u8) -> Option<Value> {
    if oparg & 1 == 0 {
        return Some(Value::Int(i64::from((oparg as i8) >> 1)));
    }
    match oparg {
        OPARG_NONE => Some(Value::None),
        OPARG_EMPTY_STR => Some(Value::str("")),
        _ => None,
    }
}

bitflags! {
    /// Compiler-visible flags of a code object.
    pub struct CodeFlags: u32 {
        /// Locals resolve through fast slots instead of a namespace.
        const OPTIMIZED = 0x0001;
        /// Execution gets a fresh local namespace.
        const NEWLOCALS = 0x0002;
        /// The function collects extra positional arguments.
        const VARARGS = 0x0004;
        /// The function collects extra keyword arguments.
        const VARKEYARGS = 0x0008;
        /// The code object is nested in another function.
        const NESTED = 0x0010;
        /// The code object belongs to a generator.
        const GENERATOR = 0x0020;
        /// No free or cell variables are referenced.
        const NOFREE = 0x0040;
        /// The code object belongs to a coroutine.
        const COROUTINE = 0x0080;
        /// A generator-based coroutine.
        const ITERABLE_COROUTINE = 0x0100;
        /// The code object belongs to an async generator.
        const ASYNC_GENERATOR = 0x0200;
    }
}

/// A compiled code object: the rewriter's sole input.
///
/// The bytecode held here is the compiler encoding and is never mutated;
/// functions retain it alongside their rewritten stream.
#[derive(Debug, Clone)]
pub struct Code {
    argcount: usize,
    nlocals: usize,
    flags: CodeFlags,
    bytecode: Vec<u8>,
    consts: Vec<Value>,
    names: Vec<Arc<str>>,
    varnames: Vec<Arc<str>>,
    freevars: Vec<Arc<str>>,
    cellvars: Vec<Arc<str>>,
}

impl Code {
    /// Builds a code object, validating the stream alignment.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        argcount: usize,
        nlocals: usize,
        flags: CodeFlags,
        bytecode: Vec<u8>,
        consts: Vec<Value>,
        names: Vec<Arc<str>>,
        varnames: Vec<Arc<str>>,
        freevars: Vec<Arc<str>>,
        cellvars: Vec<Arc<str>>,
    ) -> Result<Self, CodeError> {
        if bytecode.len() % COMPILER_CODE_UNIT_SIZE != 0 {
            return Err(CodeError::UnalignedBytecode(bytecode.len()));
        }
        Ok(Self {
            argcount,
            nlocals,
            flags,
            bytecode,
            consts,
            names,
            varnames,
            freevars,
            cellvars,
        })
    }

    /// Number of positional parameters.
    pub const fn argcount(&self) -> usize {
        self.argcount
    }

    /// Number of fast local slots, parameters included.
    pub const fn nlocals(&self) -> usize {
        self.nlocals
    }

    /// Total frame slots: fast locals plus free and cell variables.
    ///
    /// This is the count reverse local indices are measured against.
    pub fn total_locals(&self) -> usize {
        self.nlocals + self.freevars.len() + self.cellvars.len()
    }

    /// Compiler-visible flags.
    pub const fn flags(&self) -> CodeFlags {
        self.flags
    }

    /// The compiler-encoded bytecode.
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// The constants tuple.
    pub fn consts(&self) -> &[Value] {
        &self.consts
    }

    /// The names tuple: global and attribute names referenced by index.
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// The local variable names.
    pub fn varnames(&self) -> &[Arc<str>] {
        &self.varnames
    }

    /// The free variable names.
    pub fn freevars(&self) -> &[Arc<str>] {
        &self.freevars
    }

    /// The cell variable names.
    pub fn cellvars(&self) -> &[Arc<str>] {
        &self.cellvars
    }
}
