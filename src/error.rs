//! The top-level error type, composed from each pass's own error enum.

use thiserror::Error;

use crate::ast::AssembleError;
use crate::exceptions::NormalizeError;
use crate::instruction::decoder::DecodeError;
use crate::stack_analysis::StackAnalysisError;

/// Any fatal failure while lifting a method body into an AST.
///
/// Recoverable conditions (dangling branches, unreachable code, missing
/// debug tables) never surface here: the pass that notices them repairs the
/// situation inline and continues.
#[derive(Debug, Error)]
pub enum DecompileError {
    /// The instruction decoder failed.
    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),
    /// Exception table normalization failed.
    #[error("exception table normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
    /// The stack analyzer detected an inconsistency.
    #[error("stack analysis failed: {0}")]
    StackAnalysis(#[from] StackAnalysisError),
    /// The AST assembler could not build a well-formed tree.
    #[error("AST assembly failed: {0}")]
    Assemble(#[from] AssembleError),
}
