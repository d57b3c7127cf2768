//! Recoverable save/load failures.
//!
//! A failure here means the input is well formed but the destination (or
//! source) runtime cannot satisfy a resolution request. The caller treats it
//! as a cache miss and recompiles. Broken invariants and unknown tags are
//! not represented: they panic.

use thiserror::Error;

/// First failure recorded by a save or load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveloadError {
    #[error("unexpected end of stream at offset {offset} ({needed} more bytes needed)")]
    UnexpectedEnd { offset: usize, needed: usize },

    #[error("saved string is not valid utf-8")]
    InvalidUtf8,

    #[error("cyclic shape chains")]
    CyclicShapeChain,

    #[error("refs to inner functions cannot be saved")]
    InnerFunctionReference,

    #[error("could not save a function: no resolution strategy applies")]
    UnresolvableFunction,

    #[error("function not found by start position {position}")]
    FunctionNotFound { position: i32 },

    #[error("`{name}` not found in {namespace}")]
    NameNotFound { namespace: &'static str, name: String },

    #[error("could not reach shared function info - may not be compiled yet")]
    SharedFunctionUnreachable,

    #[error("object layout changed - can't reference `{name}` by name")]
    LayoutChanged { name: String },

    #[error("could not ensure deoptimization support for inlined function")]
    NoDeoptSupport,

    #[error("symbol is neither a root nor registered")]
    UnregisteredSymbol,

    #[error("context is not on the compiled function's scope chain")]
    UnreachableContext,
}

/// Result of a save/load step.
pub type SaveloadResult<T> = Result<T, SaveloadError>;
