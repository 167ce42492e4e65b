//! Authenticated remote upload
//!
//! Two backends share the [`RemoteBackend`] contract: [`SftpBackend`] over an
//! SSH session and [`SmbBackend`] onto a Windows/SMB share. The
//! [`RemoteTransferClient`] picks one by [`RemoteProtocol`]; the orchestrator
//! talks to it through the [`RemoteClient`] trait so tests can substitute it.

mod sftp;
mod smb;

pub use sftp::*;
pub use smb::*;

use crate::config::{Credentials, RemoteProtocol};
use crate::error::{Result, TransferError};
use std::path::{Path, PathBuf};

/// Everything an upload needs
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Local file to upload
    pub source: &'a Path,
    /// Remote directory (SFTP) or `share/subpath` (SMB)
    pub destination: &'a str,
    /// Remote host name or IP
    pub host: &'a str,
    /// Login
    pub credentials: &'a Credentials,
}

/// One remote protocol implementation
pub trait RemoteBackend {
    /// Protocol this backend speaks
    fn protocol(&self) -> RemoteProtocol;

    /// Upload the request's source into its destination directory,
    /// creating the directory if absent, and return the remote path
    fn upload(&self, request: &UploadRequest<'_>) -> Result<String>;
}

/// Uploads with an explicitly chosen protocol
pub trait RemoteClient {
    /// Upload using `protocol`
    fn upload(&self, protocol: RemoteProtocol, request: &UploadRequest<'_>) -> Result<String>;
}

/// Production client dispatching to the SFTP and SMB backends
#[derive(Default)]
pub struct RemoteTransferClient {
    sftp: SftpBackend,
    smb: SmbBackend,
}

impl RemoteTransferClient {
    /// Client with default backends
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the SFTP backend
    pub fn with_sftp(mut self, sftp: SftpBackend) -> Self {
        self.sftp = sftp;
        self
    }

    /// Replace the SMB backend
    pub fn with_smb(mut self, smb: SmbBackend) -> Self {
        self.smb = smb;
        self
    }

    /// Reach SMB shares through mounts under `root` (`<root>/<host>/<share>`)
    pub fn with_mounted_shares(self, root: impl Into<PathBuf>) -> Self {
        self.with_smb(SmbBackend::new(MountedShares::new(root)))
    }

    /// Backend for `protocol`
    pub fn backend(&self, protocol: RemoteProtocol) -> &dyn RemoteBackend {
        match protocol {
            RemoteProtocol::Sftp => &self.sftp,
            RemoteProtocol::Smb => &self.smb,
        }
    }
}

impl RemoteClient for RemoteTransferClient {
    fn upload(&self, protocol: RemoteProtocol, request: &UploadRequest<'_>) -> Result<String> {
        let backend = self.backend(protocol);
        tracing::info!(
            "Uploading {} to {} via {}",
            request.source.display(),
            request.host,
            backend.protocol()
        );
        backend.upload(request)
    }
}

/// Check the upload source and return its file name
pub(crate) fn source_file_name(source: &Path) -> Result<String> {
    let metadata = match std::fs::metadata(source) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::SourceNotFound(source.to_path_buf()));
        }
        Err(e) => return Err(TransferError::io(source, e)),
    };

    let unsupported = |reason: &str| TransferError::UnsupportedSource {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    };

    if metadata.is_dir() {
        return Err(unsupported("remote mode uploads single files only"));
    }

    source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| unsupported("file name is missing or not valid UTF-8"))
}
