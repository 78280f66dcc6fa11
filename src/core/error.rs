use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Malformed container: {0}")]
    Format(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Restricted file type: .{0} (pass the restricted-type override to admit it)")]
    RestrictedType(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Index out of range: {0}")]
    Index(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported renderer: {0}")]
    UnsupportedRenderer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl ArchiveError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ArchiveError::Format(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ArchiveError::Validation(msg.into())
    }

    pub(crate) fn index(msg: impl Into<String>) -> Self {
        ArchiveError::Index(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        ArchiveError::UnsupportedFormat(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
