use thiserror::Error;

use crate::services::ServiceError;

/// Errors returned by generation tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task cannot start with the current session contents.
    #[error("{0}")]
    Precondition(&'static str),

    /// The target entity does not exist.
    #[error("unknown {kind} '{id}'")]
    UnknownEntity { kind: &'static str, id: String },

    /// The external service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl TaskError {
    pub(crate) fn unknown_config(id: &str) -> Self {
        TaskError::UnknownEntity {
            kind: "text config",
            id: id.to_string(),
        }
    }

    pub(crate) fn unknown_image(id: &str) -> Self {
        TaskError::UnknownEntity {
            kind: "image",
            id: id.to_string(),
        }
    }
}
