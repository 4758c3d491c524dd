use itertools::Itertools;
use thiserror::Error;

use crate::idf::IdfError;
use crate::path::{FieldPath, PathParseError};
use crate::registry::SessionId;
use crate::simulation::SimulationDispatchError;
use crate::validate::ValidationIssue;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{path} has no IDF representation: {message}")]
    UnsupportedField { path: FieldPath, message: String },

    #[error("dangling reference at {path}: {message}")]
    ReferentialIntegrity { path: FieldPath, message: String },

    #[error("session is closed")]
    SessionClosed,

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("answer for {path} rejected: {reason}")]
    AnswerRejected { path: FieldPath, reason: String },

    #[error("no answer is pending confirmation")]
    NothingProposed,

    #[error("no earlier snapshot to restore")]
    NothingToUndo,

    #[error(transparent)]
    Idf(#[from] IdfError),

    #[error("simulation failed: {0}")]
    SimulationFailed(#[from] SimulationDispatchError),

    #[error(transparent)]
    InvalidPath(#[from] PathParseError),
}

/// Error-severity issues that block encoding, each with the path responsible.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "model has {} blocking issue(s): {}",
            self.issues.len(),
            self.issues
                .iter()
                .map(|issue| format!("{}: {}", issue.path, issue.message))
                .join("; ")
        )
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.issues.iter().map(|issue| &issue.path)
    }
}
