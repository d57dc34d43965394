use dagger_analyzer::AnalysisError;
use thiserror::Error;

/// Failures scoped to a single invocation. None of them affect other
/// invocations sharing the same module metadata.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("unknown object type `{object}`")]
    UnknownObject { object: String },
    #[error("`{object}` has no function or field named `{function}`")]
    UnknownFunction { object: String, function: String },
    #[error("no implementation registered for `{object}.{function}`")]
    NotImplemented { object: String, function: String },
    #[error("missing required field `{field}` of `{object}`")]
    MissingField { object: String, field: String },
    #[error("missing required argument `{argument}` of `{function}`")]
    MissingArgument { function: String, argument: String },
    #[error("`{name}` expected {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },
    #[error("`{name}` is null but {expected} is not optional")]
    UnexpectedNull { name: String, expected: String },
    #[error("{message}")]
    Application {
        message: String,
        error_type: Option<String>,
    },
    #[error("`{name}` did not finish within {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },
    #[error("invalid invocation request: {0}")]
    InvalidRequest(String),
}

impl DispatchError {
    /// Stable kind written to the error channel.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownObject { .. } => "UnknownObject",
            DispatchError::UnknownFunction { .. } => "UnknownFunction",
            DispatchError::NotImplemented { .. } => "NotImplemented",
            DispatchError::MissingField { .. } => "MissingField",
            DispatchError::MissingArgument { .. } => "MissingArgument",
            DispatchError::TypeMismatch { .. } => "TypeMismatch",
            DispatchError::UnexpectedNull { .. } => "UnexpectedNull",
            DispatchError::Application { .. } => "ApplicationError",
            DispatchError::Timeout { .. } => "Timeout",
            DispatchError::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// The parameter, field or type the error is about.
    pub fn subject(&self) -> Option<&str> {
        match self {
            DispatchError::UnknownObject { object } => Some(object),
            DispatchError::UnknownFunction { function, .. }
            | DispatchError::NotImplemented { function, .. } => Some(function),
            DispatchError::MissingField { field, .. } => Some(field),
            DispatchError::MissingArgument { argument, .. } => Some(argument),
            DispatchError::TypeMismatch { name, .. }
            | DispatchError::UnexpectedNull { name, .. }
            | DispatchError::Timeout { name, .. } => Some(name),
            DispatchError::Application { .. } | DispatchError::InvalidRequest(_) => None,
        }
    }

    pub(crate) fn mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        DispatchError::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Raised by handler code that reads a [`crate::Value`] as the wrong type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("expected {expected}, got {found}")]
pub struct ValueError {
    pub expected: &'static str,
    pub found: &'static str,
}

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("failed to plan type definitions")]
    Plan(#[source] eyre::Error),
    #[error("failed to announce module `{name}`")]
    Module {
        name: String,
        #[source]
        source: eyre::Error,
    },
    #[error("failed to announce type `{name}`")]
    TypeDef {
        name: String,
        #[source]
        source: eyre::Error,
    },
}

#[derive(Error, Debug)]
pub enum ModError {
    #[error("module analysis failed")]
    Analysis(#[from] AnalysisError),
    #[error("module registration failed")]
    Register(#[from] RegisterError),
    #[error("invalid module configuration")]
    Config(#[source] eyre::Error),
}
