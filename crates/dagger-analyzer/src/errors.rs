use itertools::Itertools;
use thiserror::Error;

use crate::metadata::LocationMetadata;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid module sources: {message}")]
    Input { message: String },
    #[error("{location}: syntax error: {message}")]
    Parse {
        message: String,
        location: LocationMetadata,
    },
    #[error("{location}: {message}")]
    Declaration {
        message: String,
        location: LocationMetadata,
    },
    #[error("{location}: unable to resolve type `{annotation}`: {message}")]
    TypeResolution {
        message: String,
        annotation: String,
        location: LocationMetadata,
    },
    #[error("{message}")]
    Validation {
        message: String,
        available: Vec<String>,
    },
    #[error("{location}: {message}")]
    Decorator {
        message: String,
        location: LocationMetadata,
    },
    #[error(
        "resolver \"{object}.{name}\" is defined {count} times ({})",
        .locations.iter().join(", ")
    )]
    NameConflict {
        object: String,
        name: String,
        count: usize,
        locations: Vec<LocationMetadata>,
    },
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Input { .. } => "AnalysisError",
            AnalysisError::Parse { .. } => "ParseError",
            AnalysisError::Declaration { .. } => "DeclarationError",
            AnalysisError::TypeResolution { .. } => "TypeResolutionError",
            AnalysisError::Validation { .. } => "ValidationError",
            AnalysisError::Decorator { .. } => "DecoratorError",
            AnalysisError::NameConflict { .. } => "NameConflictError",
        }
    }

    pub fn location(&self) -> Option<&LocationMetadata> {
        match self {
            AnalysisError::Parse { location, .. }
            | AnalysisError::Declaration { location, .. }
            | AnalysisError::TypeResolution { location, .. }
            | AnalysisError::Decorator { location, .. } => Some(location),
            AnalysisError::NameConflict { locations, .. } => locations.first(),
            AnalysisError::Input { .. } | AnalysisError::Validation { .. } => None,
        }
    }

    pub(crate) fn input(message: impl Into<String>) -> Self {
        AnalysisError::Input {
            message: message.into(),
        }
    }

    pub(crate) fn declaration(message: impl Into<String>, location: &LocationMetadata) -> Self {
        AnalysisError::Declaration {
            message: message.into(),
            location: location.clone(),
        }
    }

    pub(crate) fn decorator(message: impl Into<String>, location: &LocationMetadata) -> Self {
        AnalysisError::Decorator {
            message: message.into(),
            location: location.clone(),
        }
    }

    pub(crate) fn type_resolution(
        message: impl Into<String>,
        annotation: impl Into<String>,
        location: &LocationMetadata,
    ) -> Self {
        AnalysisError::TypeResolution {
            message: message.into(),
            annotation: annotation.into(),
            location: location.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::AnalysisError;
    use crate::metadata::LocationMetadata;

    #[test]
    fn name_conflict_lists_every_location() {
        let err = AnalysisError::NameConflict {
            object: "Foo".into(),
            name: "bar".into(),
            count: 2,
            locations: vec![
                LocationMetadata::new("main.py", 4, 4),
                LocationMetadata::new("main.py", 9, 4),
            ],
        };

        assert_eq!(
            err.to_string(),
            r#"resolver "Foo.bar" is defined 2 times (main.py:4:4, main.py:9:4)"#
        );
        assert_eq!(err.kind(), "NameConflictError");
    }

    #[test]
    fn validation_has_no_location() {
        let err = AnalysisError::Validation {
            message: "missing".into(),
            available: vec![],
        };

        assert_eq!(err.location(), None);
    }
}
