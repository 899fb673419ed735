//! Crate-wide error type.
//!
//! Runtime failures surface as exception objects in the language itself
//! (see [`crate::exceptions`]); this enum is the bridge between a Rust
//! `Result::Err` at the host boundary and that in-language taxonomy, plus
//! the handful of host-only conditions (resource limits, bytecode
//! corruption) that have no in-language counterpart.

use crate::diagnostic::Diagnostic;
use crate::value::Value;
use std::rc::Rc;
use thiserror::Error;

/// Tags a [`Error::Typed`] failure with the builtin exception type it should
/// surface as once the VM has access to [`crate::exceptions::ExceptionTypes`]
/// (operator/builtin/method code raising these has no such access itself —
/// see `NativeFn` in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcKind {
    Type,
    Name,
    Attr,
    Key,
    Index,
    Val,
    Assert,
    Math,
    Overflow,
    Arg,
    Size,
}

#[derive(Debug, Error)]
pub enum Error {
    /// A lexer or parser failure, carrying a rendered diagnostic.
    #[error("{0}")]
    Syntax(Box<Diagnostic>),

    /// An exception raised by running code (`throw`, or a builtin operator
    /// failure) that was never caught by a `try`/`catch`.
    #[error("{}", .0.to_display_string())]
    Runtime(Rc<Value>),

    /// A failure from operator/builtin/method code identifying which
    /// exception type it corresponds to (§4.7's taxonomy), raised before the
    /// VM has wrapped it into an actual `ExceptionObj`.
    #[error("{1}")]
    Typed(ExcKind, String),

    /// The dispatch loop exceeded `Limits::max_instructions`.
    #[error("instruction limit exceeded")]
    InstructionLimitExceeded,

    /// A call pushed more frames than `Limits::max_recursion_depth`.
    #[error("recursion limit exceeded")]
    RecursionLimitExceeded,

    /// The VM encountered bytecode that could not have been produced by the
    /// compiler (out-of-range pool index, unbalanced handler stack, ...).
    #[error("internal error: {0}")]
    Internal(String),

    /// No handler was registered for an imported module name.
    #[error("no module named '{0}'")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}
