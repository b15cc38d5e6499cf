//! Front-end of the Serpent VM execution pipeline.
//!
//! Function construction takes the 2-byte-unit bytecode produced by the
//! source compiler and rewrites it into a 4-byte-unit, cache-annotated,
//! specialization-ready stream. The rewriter reserves inline-cache entries
//! deterministically, folds encodable constants into immediate operands,
//! and remaps local slots to the reverse frame layout where that fits in a
//! byte. The [`cfg`] module builds the basic-block view consumed by the
//! optional bytecode optimizer.
//!
//! Execution itself lives elsewhere: this crate stops at the rewritten
//! buffer, the primed-empty cache array, and the block structure.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod cfg;
pub mod error;
pub mod function;
pub mod ic;
pub mod object;

mod rewrite;

pub mod prelude {
    //! Re-exports of the types most consumers need.

    pub use serpent_bytecode::{
        next_compiler_op, next_op, BinaryOp, CompareOp, Instr, Opcode, CODE_UNIT_SIZE,
        COMPILER_CODE_UNIT_SIZE,
    };

    pub use crate::cfg::{
        optimize_function, BasicBlock, BlockId, BlockMap, BytecodeInstruction, BytecodeView, Cfg,
        IrInstr, RegisterId,
    };
    pub use crate::error::{CodeError, OptimizeError};
    pub use crate::function::Function;
    pub use crate::ic::{IC_CACHE_LIMIT, IC_POINTERS_PER_ENTRY};
    pub use crate::object::{
        oparg_from_value, value_from_oparg, Code, CodeFlags, Value, MAX_IMMEDIATE_INT,
        MIN_IMMEDIATE_INT,
    };
}
