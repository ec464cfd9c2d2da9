//! The single failure channel shared by lookup, invocation, adaptation,
//! combinators and call sites.

use thiserror::Error;

use crate::runtime::value::Thrown;
use crate::types::TypeDescriptor;

#[derive(Error, Debug, Clone)]
pub enum HandleError {
    /// The lookup's access context may not observe the member.
    #[error("access denied: {caller} cannot access {member}")]
    Access { caller: String, member: String },

    #[error("not found: {owner}.{name}")]
    NotFound { owner: String, name: String },

    /// The member exists but its shape does not match what was asked for.
    #[error("linkage error: {member}: {reason}")]
    Linkage { member: String, reason: String },

    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        expected: TypeDescriptor,
        actual: TypeDescriptor,
    },

    #[error("cannot adapt {from} to {to}: {reason}")]
    Adaptation {
        from: String,
        to: String,
        reason: String,
    },

    #[error("wrong number of parameters for {context}: expected {expected}, got {actual}")]
    Arity {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("index {index} out of range for {len} parameters")]
    Index { index: usize, len: usize },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("call site target is immutable")]
    ImmutableCallSite,

    #[error("invalid descriptor `{input}`: {reason}")]
    InvalidDescriptor { input: String, reason: String },

    /// A failure raised by the invoked target, passed through untouched.
    #[error("{0}")]
    Thrown(Thrown),
}

pub type Result<T> = std::result::Result<T, HandleError>;

impl HandleError {
    /// Stable diagnostic code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            HandleError::Access { .. } => "E2001",
            HandleError::NotFound { .. } => "E2002",
            HandleError::Linkage { .. } => "E2003",
            HandleError::WrongType { .. } => "E2004",
            HandleError::Adaptation { .. } => "E2005",
            HandleError::Arity { .. } => "E2006",
            HandleError::Index { .. } => "E2007",
            HandleError::TypeMismatch { .. } => "E2008",
            HandleError::ImmutableCallSite => "E2009",
            HandleError::InvalidDescriptor { .. } => "E2010",
            HandleError::Thrown(_) => "E2100",
        }
    }

    pub(crate) fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        HandleError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn adaptation(
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        HandleError::Adaptation {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<Thrown> for HandleError {
    fn from(thrown: Thrown) -> Self {
        HandleError::Thrown(thrown)
    }
}
