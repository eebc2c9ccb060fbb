use std::path::PathBuf;

use thiserror::Error;

use crate::model::{EntityKind, Id};

pub type Result<T> = std::result::Result<T, CfgError>;

#[derive(Debug, Error)]
pub enum CfgError {
    /// Identity absent from the entity cache
    #[error("entity {0} not found")]
    NotFound(Id),

    #[error("entity {id} is a {found}, expected a {expected}")]
    WrongKind {
        id: Id,
        expected: &'static str,
        found: EntityKind,
    },

    /// `initialize` refused to overwrite a non-empty document
    #[error("refusing to initialize {0}: file already exists and is not empty")]
    AlreadyExists(PathBuf),

    #[error("no configuration document at {0}")]
    DocumentMissing(PathBuf),

    /// A reference field names an identity the cache does not hold
    #[error("dangling reference to {id}")]
    DanglingReference { id: Id },

    #[error("corrupt configuration document at {path}: {reason}")]
    CorruptDocument { path: PathBuf, reason: String },

    #[error("storage failure at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("the root node {0} cannot be deleted")]
    RootNode(Id),

    #[error("no backend registered under {0}")]
    UnknownBackend(usize),

    #[error("control layer failed for {pv}: {source}")]
    Control {
        pv: String,
        #[source]
        source: ControlError,
    },
}

/// Error type reported by a [`crate::client::ControlLayer`]
pub type ControlError = Box<dyn std::error::Error + Send + Sync>;

impl CfgError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CfgError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CfgError::NotFound(_))
    }
}
