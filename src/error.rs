//! Error types for SFTP operations

use thiserror::Error;

use crate::protocol::StatusCode;

/// Result type alias for SFTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// SFTP error types
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(String),

    /// SFTP wire-protocol error (malformed packet, bad opcode, etc.)
    #[error("SFTP protocol error: {0}")]
    Protocol(String),

    /// A parsed request referenced a handle the registry no longer knows
    /// about, either because it was never issued or because its generation
    /// tag has been superseded by a CLOSE.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Requested path already exists (v4+ FILE_ALREADY_EXISTS)
    #[error("File already exists: {0}")]
    AlreadyExists(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Channel closed while a response was being written
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The registry or session has reached a hard resource limit (e.g. the
    /// maximum number of simultaneously open handles)
    #[error("Resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Opcode or extension the active protocol table has no handler for
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::InvalidHandle`].
    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Error::InvalidHandle(msg.into())
    }

    /// Build an [`Error::ResourceExhaustion`].
    pub fn resource_exhaustion(msg: impl Into<String>) -> Self {
        Error::ResourceExhaustion(msg.into())
    }

    /// Build an [`Error::Timeout`].
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Build an [`Error::ChannelClosed`].
    pub fn channel_closed(msg: impl Into<String>) -> Self {
        Error::ChannelClosed(msg.into())
    }

    /// True for failures worth surfacing to the audit log as a security
    /// event rather than an ordinary operational failure.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Error::InvalidPath(_)
                | Error::PermissionDenied(_)
                | Error::AuthenticationFailed(_)
                | Error::InvalidHandle(_)
        )
    }

    /// Map this error to the closest SFTP status code, capped at `max_status`
    /// so that a status unrepresentable in the negotiated protocol version
    /// (e.g. `INVALID_HANDLE` under v3) collapses to the nearest code that
    /// version's `sftpprotocol::max_status` declares as its ceiling.
    pub fn to_status_code(&self, max_status: u32) -> u32 {
        let code = match self {
            Error::FileNotFound(_) => StatusCode::NoSuchFile as u32,
            Error::PermissionDenied(_) | Error::AuthenticationFailed(_) => {
                StatusCode::PermissionDenied as u32
            }
            Error::InvalidPath(_) | Error::Protocol(_) => StatusCode::BadMessage as u32,
            Error::InvalidHandle(_) => StatusCode::InvalidHandle as u32,
            Error::AlreadyExists(_) => StatusCode::FileAlreadyExists as u32,
            Error::NotSupported(_) => StatusCode::OpUnsupported as u32,
            Error::Connection(_) | Error::ChannelClosed(_) => StatusCode::ConnectionLost as u32,
            Error::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::NotFound => StatusCode::NoSuchFile as u32,
                std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied as u32,
                std::io::ErrorKind::AlreadyExists => StatusCode::FileAlreadyExists as u32,
                _ => StatusCode::Failure as u32,
            },
            _ => StatusCode::Failure as u32,
        };
        code.min(max_status)
    }

    /// Human-readable message safe to send back to the client: no raw OS
    /// error internals beyond what the client already supplied as input.
    pub fn sanitized_message(&self) -> String {
        match self {
            Error::Io(_) => "I/O error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

impl From<russh_keys::Error> for Error {
    fn from(err: russh_keys::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

/// Map a raw `io::Error` arising from a path-based filesystem call into the
/// closest domain error, attaching the path the client supplied (not the
/// resolved host path) to the message.
pub fn map_io_error(err: std::io::Error, client_path: &str) -> Error {
    match err.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(client_path.to_string()),
        std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(client_path.to_string()),
        std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(client_path.to_string()),
        _ => Error::Io(err),
    }
}
