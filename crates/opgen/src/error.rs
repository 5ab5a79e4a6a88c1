use thiserror::Error;

use crate::spec::DType;

/// Errors raised while generating source for an operator.
///
/// Generation is all-or-nothing: any of these aborts before text is returned.
/// Every variant names the operator so the caller can localize it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("{op}: dimension `{symbol}` is referenced before it is bound")]
    UnresolvedDimension { op: String, symbol: String },
    #[error("{op}: shape mismatch{}: {message}", member_suffix(.member))]
    ShapeMismatch {
        op: String,
        member: Option<usize>,
        message: String,
    },
    #[error(
        "{op}: element function `{func}` has no {dtype} implementation for {lanes}-wide elements{}",
        capability_suffix(.capability)
    )]
    UnsupportedFusion {
        op: String,
        func: String,
        dtype: DType,
        lanes: usize,
        capability: Option<u32>,
    },
    #[error("{op}: invalid slice for input {member} on axis {axis}: {message}")]
    InvalidSliceSpec {
        op: String,
        member: usize,
        axis: usize,
        message: String,
    },
    #[error("{op}: {message}")]
    InvalidAttrs { op: String, message: String },
    #[error("{op}: dtype {dtype} is not supported by target `{target}`")]
    UnsupportedDType {
        op: String,
        dtype: DType,
        target: String,
    },
    #[error("invalid generator config: {0}")]
    InvalidConfig(String),
    #[error("no `{op_kind}` generator registered for target `{target}`")]
    UnknownGenerator { target: String, op_kind: String },
}

fn member_suffix(member: &Option<usize>) -> String {
    match member {
        Some(index) => format!(" (input {index})"),
        None => String::new(),
    }
}

fn capability_suffix(capability: &Option<u32>) -> String {
    match capability {
        Some(cap) => format!(" on sm_{cap}"),
        None => String::new(),
    }
}

impl GenError {
    pub fn shape_mismatch(
        op: impl Into<String>,
        member: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        GenError::ShapeMismatch {
            op: op.into(),
            member,
            message: message.into(),
        }
    }

    pub fn invalid_slice(
        op: impl Into<String>,
        member: usize,
        axis: usize,
        message: impl Into<String>,
    ) -> Self {
        GenError::InvalidSliceSpec {
            op: op.into(),
            member,
            axis,
            message: message.into(),
        }
    }

    pub fn invalid_attrs(op: impl Into<String>, message: impl Into<String>) -> Self {
        GenError::InvalidAttrs {
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn unresolved(op: impl Into<String>, symbol: impl Into<String>) -> Self {
        GenError::UnresolvedDimension {
            op: op.into(),
            symbol: symbol.into(),
        }
    }

    /// Operator the failure belongs to, when it is operator-scoped.
    pub fn op(&self) -> Option<&str> {
        match self {
            GenError::UnresolvedDimension { op, .. }
            | GenError::ShapeMismatch { op, .. }
            | GenError::UnsupportedFusion { op, .. }
            | GenError::InvalidSliceSpec { op, .. }
            | GenError::InvalidAttrs { op, .. }
            | GenError::UnsupportedDType { op, .. } => Some(op),
            GenError::InvalidConfig(_) | GenError::UnknownGenerator { .. } => None,
        }
    }
}

pub type GenResult<T> = Result<T, GenError>;
