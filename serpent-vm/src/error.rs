//! Error types of the bytecode front-end.
//!
//! The rewriter itself is total: capacity exhaustion, encoding
//! ineligibility, and local-reversal ineligibility all degrade silently
//! into unspecialized output. Errors only surface at the construction seam
//! (a malformed compiler stream) and at the optimizer stage that is not
//! implemented yet.

use thiserror::Error;

/// Code-object construction error variants.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodeError {
    /// The compiler stream must be a whole number of 2-byte code units.
    #[error("bytecode length {0} is not a multiple of the compiler code unit size")]
    UnalignedBytecode(usize),
}

/// Bytecode optimizer error variants.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeError {
    /// Block formation succeeded, but lowering bytecode blocks to IR
    /// operations is a later phase.
    #[error("translation from bytecode blocks to IR operations is not implemented")]
    TranslationUnimplemented,
}
