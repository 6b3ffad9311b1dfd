//! Error taxonomy of the translation pipeline.
//!
//! Fatal conditions are [`TranslateError`]s and abort the current job.
//! Advisory conditions ([`MergeInconsistency`], [`MissingTranslation`]) are
//! collected into the run report and never interrupt a run.

use crate::job::Shape;
use std::fmt;
use thiserror::Error;

/// Fatal failure of a translation run.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// A single key plus the prompt does not fit the input budget.
    #[error("{} needs {tokens} input tokens but the budget is {limit}", describe_key(.key))]
    OversizeEntry {
        key: Option<String>,
        tokens: usize,
        limit: usize,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn describe_key(key: &Option<String>) -> String {
    match key {
        Some(key) => format!("key '{}'", key),
        None => "the prompt alone".to_string(),
    }
}

/// Failure reported by a translation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to translation backend failed: {0}")]
    Request(String),

    #[error("translation backend returned an error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("translation backend returned malformed output: {0}")]
    MalformedResponse(String),

    #[error("translation backend returned no choices")]
    EmptyResponse,
}

impl BackendError {
    /// Rate limits, server errors, transport failures and unparsable output
    /// are worth another attempt. Other 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Request(_) | BackendError::MalformedResponse(_) => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::EmptyResponse => false,
        }
    }
}

/// Why a backend entry was rejected instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistencyKind {
    /// The value's shape differs from the key's source values.
    ShapeMismatch { expected: Shape },
    /// The key was not part of the submitted batch.
    UnexpectedKey,
    /// The language was not requested for this key.
    UnrequestedLanguage,
}

/// Advisory: a backend entry that did not match the job and was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInconsistency {
    pub key: String,
    pub language: String,
    pub kind: InconsistencyKind,
}

impl fmt::Display for MergeInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            InconsistencyKind::ShapeMismatch { expected } => write!(
                f,
                "'{}' [{}]: expected a {} value",
                self.key, self.language, expected
            ),
            InconsistencyKind::UnexpectedKey => {
                write!(f, "'{}' [{}]: key was not requested", self.key, self.language)
            }
            InconsistencyKind::UnrequestedLanguage => write!(
                f,
                "'{}' [{}]: language was not requested",
                self.key, self.language
            ),
        }
    }
}

/// Advisory: a requested slot that is still empty after the run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MissingTranslation {
    pub key: String,
    pub language: String,
}

impl fmt::Display for MissingTranslation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' [{}]", self.key, self.language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversize_message_names_key() {
        let err = TranslateError::OversizeEntry {
            key: Some("description".to_string()),
            tokens: 5000,
            limit: 4096,
        };
        assert_eq!(
            err.to_string(),
            "key 'description' needs 5000 input tokens but the budget is 4096"
        );
    }

    #[test]
    fn test_oversize_message_without_key() {
        let err = TranslateError::OversizeEntry {
            key: None,
            tokens: 10,
            limit: 5,
        };
        assert!(err.to_string().starts_with("the prompt alone"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Request("timeout".into()).is_transient());
        assert!(BackendError::MalformedResponse("eof".into()).is_transient());
        assert!(BackendError::Api { status: 429, body: String::new() }.is_transient());
        assert!(BackendError::Api { status: 503, body: String::new() }.is_transient());
        assert!(!BackendError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!BackendError::Api { status: 400, body: String::new() }.is_transient());
        assert!(!BackendError::EmptyResponse.is_transient());
    }

    #[test]
    fn test_backend_error_converts() {
        let err: TranslateError = BackendError::EmptyResponse.into();
        assert!(matches!(err, TranslateError::Backend(BackendError::EmptyResponse)));
    }

    #[test]
    fn test_inconsistency_display() {
        let issue = MergeInconsistency {
            key: "items".to_string(),
            language: "ru".to_string(),
            kind: InconsistencyKind::ShapeMismatch {
                expected: Shape::Plural,
            },
        };
        assert_eq!(issue.to_string(), "'items' [ru]: expected a plural value");
    }
}
