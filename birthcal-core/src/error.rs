//! Error types for birthcal.

use thiserror::Error;

/// Errors that can occur while building or serving the birthday feed.
#[derive(Error, Debug)]
pub enum BirthcalError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The vCard stream could not be opened or downloaded.
    #[error("Failed to parse vCard stream: {0}")]
    SourceAcquisition(#[source] Box<BirthcalError>),

    #[error("Unable to parse date: {0:?}")]
    DateParse(String),

    #[error("Malformed vCard: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to encode iCalendar data: {0}")]
    IcsGenerate(String),

    #[error("Invalid URL structure: {0}")]
    InvalidUrl(String),

    #[error("Unsupported protocol scheme (http/https only): {0}")]
    UnsupportedScheme(String),

    #[error("Network error during fetch: {0}")]
    Http(String),

    #[error("Server returned unexpected status: {0}")]
    HttpStatus(u16),

    #[error("A synchronization is already in progress")]
    SyncInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BirthcalError {
    /// True when the operation stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BirthcalError::Cancelled)
    }

    /// Configuration errors are fatal: retrying with the same settings cannot help.
    pub fn is_config(&self) -> bool {
        matches!(self, BirthcalError::Config(_))
    }
}

/// Result type alias for birthcal operations.
pub type BirthcalResult<T> = Result<T, BirthcalError>;
