//! Instruction stream primitives of the Serpent VM.
//!
//! The compiler emits 2-byte code units `(opcode, arg)`. Function
//! construction widens the stream into 4-byte code units
//! `(opcode, arg, cache_lo, cache_hi)` so every operation has room for an
//! inline-cache index. This crate defines the opcode wire identities, both
//! unit sizes, the decoded-operation model with extended-argument assembly,
//! and the operator tags shared between the rewriter and the interpreter.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

#[macro_use]
mod macros;

mod args;
mod instruction;
mod opcode;

pub use args::{BinaryOp, CompareOp};
pub use instruction::{
    next_compiler_op, next_op, Instr, InstrIter, CODE_UNIT_SIZE, COMPILER_CODE_UNIT_SIZE,
};
pub use opcode::{InvalidOpcode, Opcode};
