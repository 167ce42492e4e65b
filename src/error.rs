//! Error types for jarvis-transfer
//!
//! Every failure a transfer can surface is a variant of [`TransferError`].
//! The remote failover path wraps both attempt failures into a single
//! [`TransferError::FailoverExhausted`] so callers can see which protocol
//! failed for which reason.

use crate::config::RemoteProtocol;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for transfer operations
#[derive(Error, Debug)]
pub enum TransferError {
    /// Source path does not exist
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    /// Destination cannot be created or written
    #[error("Destination not writable: '{path}': {source}")]
    DestinationNotWritable {
        /// Path that could not be created or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Source and destination resolve to the same file, or the
    /// destination lies inside a directory source
    #[error("Source and destination overlap: {0}")]
    SameSourceAndDestination(PathBuf),

    /// Connect or timeout failure talking to a peer
    #[error("Connection error to '{host}': {message}")]
    ConnectivityError {
        /// Peer address
        host: String,
        /// What went wrong
        message: String,
    },

    /// No indicator port answered and no protocol was supplied
    #[error("Could not determine remote protocol for '{0}'; choose one explicitly")]
    ProtocolUndetermined(String),

    /// Remote side rejected the credentials
    #[error("Authentication failed for '{user}@{host}': {message}")]
    AuthenticationError {
        /// Login name
        user: String,
        /// Remote host
        host: String,
        /// Reason given by the remote side
        message: String,
    },

    /// Remote read/write/mkdir failure
    #[error("{protocol} remote I/O error: {message}")]
    RemoteIoError {
        /// Protocol in use
        protocol: RemoteProtocol,
        /// What went wrong
        message: String,
    },

    /// LAN receiver got fewer bytes than the header declared
    #[error("Truncated transfer of '{path}': expected {expected} bytes, received {received}")]
    TruncatedTransfer {
        /// File affected
        path: PathBuf,
        /// Declared size
        expected: u64,
        /// Bytes actually transferred
        received: u64,
    },

    /// Both remote protocols failed
    #[error(
        "Transfer failed with both protocols: {} ({}), then {} ({})",
        .primary.0, .primary.1, .fallback.0, .fallback.1
    )]
    FailoverExhausted {
        /// First protocol tried and its failure
        primary: (RemoteProtocol, Box<TransferError>),
        /// Alternate protocol and its failure
        fallback: (RemoteProtocol, Box<TransferError>),
    },

    /// I/O error during local file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Descriptor violates a mode invariant
    #[error("Invalid transfer descriptor: {0}")]
    InvalidDescriptor(String),

    /// Source kind not supported by the selected mode
    #[error("Unsupported source '{path}': {reason}")]
    UnsupportedSource {
        /// Rejected source
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Malformed LAN header or peer message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// SSH host key did not match the pinned fingerprint
    #[error("Host key mismatch for '{host}': expected {expected}, got {actual}")]
    HostKeyMismatch {
        /// Remote host
        host: String,
        /// Pinned fingerprint
        expected: String,
        /// Fingerprint the server presented
        actual: String,
    },

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration load/save error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TransferError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a connectivity error
    pub fn connectivity(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectivityError {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(
        user: impl Into<String>,
        host: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AuthenticationError {
            user: user.into(),
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a remote I/O error for the given protocol
    pub fn remote_io(protocol: RemoteProtocol, message: impl Into<String>) -> Self {
        Self::RemoteIoError {
            protocol,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::SourceNotFound(path)
            | Self::SameSourceAndDestination(path)
            | Self::DestinationNotWritable { path, .. }
            | Self::TruncatedTransfer { path, .. }
            | Self::UnsupportedSource { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Both causes of an exhausted failover, primary first
    pub fn failover_causes(&self) -> Option<[(RemoteProtocol, &TransferError); 2]> {
        match self {
            Self::FailoverExhausted { primary, fallback } => Some([
                (primary.0, primary.1.as_ref()),
                (fallback.0, fallback.1.as_ref()),
            ]),
            _ => None,
        }
    }
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Map the error to `DestinationNotWritable` for the given path
    fn not_writable(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| TransferError::io(path, e))
    }

    fn not_writable(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| TransferError::DestinationNotWritable {
            path: path.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = TransferError::io("/test/path", io_err);
        assert_eq!(err.path(), Some(&PathBuf::from("/test/path")));
    }

    #[test]
    fn test_error_display() {
        let err = TransferError::connectivity("nas:22", "refused");
        assert_eq!(err.to_string(), "Connection error to 'nas:22': refused");

        let err = TransferError::SameSourceAndDestination(PathBuf::from("/data/a.txt"));
        assert!(err.to_string().contains("/data/a.txt"));
        assert_eq!(err.path(), Some(&PathBuf::from("/data/a.txt")));
    }

    #[test]
    fn test_failover_reports_both_causes() {
        let err = TransferError::FailoverExhausted {
            primary: (
                RemoteProtocol::Sftp,
                Box::new(TransferError::auth("bob", "nas", "bad password")),
            ),
            fallback: (
                RemoteProtocol::Smb,
                Box::new(TransferError::remote_io(RemoteProtocol::Smb, "share missing")),
            ),
        };

        let message = err.to_string();
        assert!(message.contains("SFTP"));
        assert!(message.contains("bad password"));
        assert!(message.contains("SMB"));
        assert!(message.contains("share missing"));

        let causes = err.failover_causes().unwrap();
        assert_eq!(causes[0].0, RemoteProtocol::Sftp);
        assert!(matches!(causes[0].1, TransferError::AuthenticationError { .. }));
        assert_eq!(causes[1].0, RemoteProtocol::Smb);
        assert!(matches!(causes[1].1, TransferError::RemoteIoError { .. }));
    }

    #[test]
    fn test_not_writable_mapping() {
        let res: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = res.not_writable("/readonly").unwrap_err();
        assert!(matches!(err, TransferError::DestinationNotWritable { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/readonly")));
    }
}
