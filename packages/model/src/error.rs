use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Contract violations in raw document input.
///
/// `path` is a dotted location inside the raw structure, e.g. `ideas.5.ideas.-10`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected an object at {path}")]
    NotAnObject { path: String },

    #[error("Invalid idea id at {path}: {value}")]
    InvalidId { path: String, value: String },

    #[error("Missing idea id at {path}")]
    MissingId { path: String },

    #[error("Duplicate idea id {id}")]
    DuplicateId { id: String },

    #[error("Invalid rank key at {path}: {key}")]
    InvalidRank { path: String, key: String },

    #[error("Rank key {key} at {path} collides with another sibling")]
    DuplicateRank { path: String, key: String },

    #[error("Invalid link at index {index}: {message}")]
    InvalidLink { index: usize, message: String },

    #[error("No idea id left to allocate at {path}")]
    IdsExhausted { path: String },
}

impl ParseError {
    pub fn not_an_object(path: impl Into<String>) -> Self {
        Self::NotAnObject { path: path.into() }
    }

    pub fn invalid_id(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidId {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn missing_id(path: impl Into<String>) -> Self {
        Self::MissingId { path: path.into() }
    }

    pub fn invalid_rank(path: impl Into<String>, key: impl Into<String>) -> Self {
        Self::InvalidRank {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn duplicate_rank(path: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateRank {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn ids_exhausted(path: impl Into<String>) -> Self {
        Self::IdsExhausted { path: path.into() }
    }

    pub fn invalid_link(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidLink {
            index,
            message: message.into(),
        }
    }
}
