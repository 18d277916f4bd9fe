use std::path::PathBuf;

use thiserror::Error;

use crate::scheduler::EntityKind;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("{kind} [{id}] already existing")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("File [{0}] is not existing or can not be read")]
    ScriptNotReadable(PathBuf),

    #[error("Invalid scheduled start time [{0}], correct format is: [HH:mm:ss]")]
    InvalidTime(String),

    #[error("Unknown variable: [{0}]")]
    UnknownVariable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),

    #[error("Unknown frame tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
