//! Error handling helpers and primitives.

use anyhow::Error;
use thiserror::Error as ThisError;
use tonic::Status;

/// Chain creates a string from an error stack.
pub fn chain(res: Error) -> String {
    res.chain()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

#[derive(Debug, ThisError)]
/// The error taxonomy shared by every pipeline. Distinguished by *kind*, not
/// by type name, so that the CRI boundary can map each to a stable status
/// code (see `impl From<CriError> for Status`).
pub enum CriError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} already in use")]
    NameCollision(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("request cancelled, retry: {0}")]
    Cancelled(String),

    #[error("pipeline failed: {0:#}")]
    PipelineFailed(#[source] anyhow::Error),

    #[error("runtime failure: {0}")]
    RuntimeFailure(String),

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

impl From<CriError> for Status {
    fn from(err: CriError) -> Self {
        match err {
            CriError::Validation(msg) => Status::invalid_argument(msg),
            CriError::NameCollision(msg) => Status::already_exists(msg),
            CriError::NotFound(msg) => Status::not_found(msg),
            CriError::RegistryUnavailable(msg) => Status::unavailable(msg),
            CriError::Cancelled(msg) => Status::deadline_exceeded(msg),
            CriError::PipelineFailed(e) => Status::internal(chain(e)),
            CriError::RuntimeFailure(msg) => Status::internal(msg),
            CriError::Internal(e) => Status::internal(chain(e)),
        }
    }
}
