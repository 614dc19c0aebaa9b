use std::{error::Error, fmt, io};

/// The server crate's result type.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Orchestration failures surfaced to callers.
#[derive(Debug)]
pub enum ServerError {
    /// Invalid configuration — caught before the engine starts.
    InvalidConfig(String),
    /// The work queue reached its configured cap.
    QueueFull { limit: usize },
    /// No version is configured to predict against.
    NoCurrentVersion,
    /// A prediction was requested but the version has no evaluated models.
    NoUsableModel { version: String },
    /// An underlying I/O error (configuration loading).
    Io(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            ServerError::QueueFull { limit } => {
                write!(f, "work queue is full: limit of {limit} items reached")
            }
            ServerError::NoCurrentVersion => write!(f, "no current version configured"),
            ServerError::NoUsableModel { version } => {
                write!(f, "no usable model for version {version}")
            }
            ServerError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ServerError> for io::Error {
    fn from(value: ServerError) -> Self {
        match value {
            ServerError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
