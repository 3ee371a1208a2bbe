//! Engine error type

use persistence::DbError;
use thiserror::Error;

use crate::types::PatternState;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A collaborator (draw history or pattern registry) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Invalid transition for '{name}': {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: PatternState,
        to: PatternState,
    },

    #[error("Pattern not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
