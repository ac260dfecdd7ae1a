//! Error types for the asm.js backend.
//!
//! Using thiserror for more idiomatic error handling. Fatal conditions
//! terminate emission before any further text is produced; the non-fatal
//! diagnostics go through `log::warn!` instead.

use thiserror::Error;

/// Main error type for module emission.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unsupported {width}-bit integer at emit time (legalization problem)")]
    UnlegalizedInteger { width: u32 },

    #[error("unsupported instruction: {opcode}")]
    UnsupportedInstruction { opcode: &'static str },

    #[error("invalid SIMD shape: {reason}")]
    InvalidSimdShape { reason: String },

    #[error("unsupported atomic operation: {op}")]
    InvalidAtomicOp { op: &'static str },

    #[error("cannot find global address {name}")]
    UnknownGlobalAddress { name: String },

    #[error("unsupported constant kind: {kind} (should have been lowered upstream)")]
    UnloweredConstant { kind: &'static str },

    #[error("invalid branch instruction: {reason}")]
    InvalidBranch { reason: String },

    #[error("32-bit global bucket is reserved and must stay empty ({size} bytes allocated)")]
    NonEmptyBucket { size: usize },

    #[error("invalid value reference: {reason}")]
    InvalidValue { reason: String },

    #[error("invoke state machine violation: {reason}")]
    InvokeState { reason: String },

    #[error("unsupported type in cast: {ty}")]
    UnsupportedCast { ty: String },

    #[error("alloca alignment {align} exceeds the stack alignment")]
    OverAlignedDynamicAlloca { align: u32 },
}

/// Result type alias for emission operations.
pub type CompileResult<T> = Result<T, CompileError>;
