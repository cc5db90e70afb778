#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormError>;

/// Rejected path-store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path must be empty or start with '/': {path}")]
    MissingSlash { path: String },

    #[error("cannot descend into a scalar at token {token:?} of {path}")]
    NotAContainer { path: String, token: String },

    #[error("invalid array index {token:?} in {path}")]
    BadIndex { path: String, token: String },

    #[error("the root of the data object cannot be removed")]
    RootRemoval,
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl FormError {
    /// The offending path, when the error concerns one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(
                PathError::MissingSlash { path }
                | PathError::NotAContainer { path, .. }
                | PathError::BadIndex { path, .. },
            ) => Some(path),
            _ => None,
        }
    }
}
