// Error type shared by the transfer engine and the cache layers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object does not exist: {0}")]
    ObjectNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Archive operation failed: {0}")]
    Archive(String),

    #[error("Read-only storage, cannot store file")]
    ReadOnly,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// True for the responses an existence probe reports as "absent"
    /// instead of raising: the object is missing or unreadable.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_) | Self::AccessDenied(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
