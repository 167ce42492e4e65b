//! SFTP upload over an SSH session
//!
//! Authenticates with username/password. By default any host key is
//! accepted (its SHA-256 fingerprint is logged); pin a fingerprint with
//! [`HostKeyPolicy::Sha256Fingerprint`] to refuse unknown hosts.

use super::{source_file_name, RemoteBackend, UploadRequest};
use crate::config::RemoteProtocol;
use crate::error::{Result, TransferError};
use crate::network::connect_with_timeout;
use ssh2::{HashType, Session, Sftp};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upload buffer size
const UPLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// How the server's host key is checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept any host key (no pinning)
    #[default]
    AcceptAny,
    /// Require this SHA-256 fingerprint, hex encoded (colons allowed)
    Sha256Fingerprint(String),
}

impl HostKeyPolicy {
    fn check(&self, host: &str, actual: &str) -> Result<()> {
        match self {
            Self::AcceptAny => {
                tracing::warn!(
                    "Accepting unverified host key for {} (SHA256 {})",
                    host,
                    actual
                );
                Ok(())
            }
            Self::Sha256Fingerprint(expected) => {
                let expected = expected.replace(':', "").to_ascii_lowercase();
                if expected == actual {
                    Ok(())
                } else {
                    Err(TransferError::HostKeyMismatch {
                        host: host.to_string(),
                        expected,
                        actual: actual.to_string(),
                    })
                }
            }
        }
    }
}

/// SFTP backend
#[derive(Debug, Clone)]
pub struct SftpBackend {
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
    host_key_policy: HostKeyPolicy,
}

impl Default for SftpBackend {
    fn default() -> Self {
        Self {
            port: RemoteProtocol::Sftp.indicator_port(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }
}

impl SftpBackend {
    /// Backend on port 22 accepting any host key
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the TCP connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the timeout of blocking session calls
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set the host key policy
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    fn connect(&self, request: &UploadRequest<'_>) -> Result<SftpSession> {
        let host = request.host;
        let tcp = connect_with_timeout(host, self.port, self.connect_timeout)
            .map_err(|e| TransferError::connectivity(host, e.to_string()))?;

        let mut session =
            Session::new().map_err(|e| TransferError::connectivity(host, e.to_string()))?;
        session.set_timeout(u32::try_from(self.io_timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| TransferError::connectivity(host, format!("SSH handshake: {}", e)))?;

        let fingerprint = session
            .host_key_hash(HashType::Sha256)
            .map(hex::encode)
            .unwrap_or_default();
        self.host_key_policy.check(host, &fingerprint)?;

        let user = &request.credentials.username;
        session
            .userauth_password(user, &request.credentials.password)
            .map_err(|e| TransferError::auth(user, host, e.message()))?;

        if !session.authenticated() {
            return Err(TransferError::auth(user, host, "Authentication failed"));
        }

        let sftp = session
            .sftp()
            .map_err(|e| TransferError::remote_io(RemoteProtocol::Sftp, e.to_string()))?;

        tracing::debug!("SFTP session open to {}@{}:{}", user, host, self.port);
        Ok(SftpSession { sftp, session })
    }
}

impl RemoteBackend for SftpBackend {
    fn protocol(&self) -> RemoteProtocol {
        RemoteProtocol::Sftp
    }

    fn upload(&self, request: &UploadRequest<'_>) -> Result<String> {
        let filename = source_file_name(request.source)?;
        let remote_path = join_remote_path(request.destination, &filename);

        let conn = self.connect(request)?;
        conn.ensure_dir(Path::new(request.destination))?;
        let bytes = conn.put(request.source, Path::new(&remote_path))?;

        tracing::info!("Uploaded {} bytes to {}:{}", bytes, request.host, remote_path);
        Ok(remote_path)
    }
}

/// Open SFTP channel; the session is disconnected on drop
struct SftpSession {
    sftp: Sftp,
    session: Session,
}

impl SftpSession {
    /// Create `dir` (and any missing parents) unless it already exists
    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        match self.sftp.stat(dir) {
            Ok(stat) if stat.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(TransferError::remote_io(
                    RemoteProtocol::Sftp,
                    format!("{} exists but is not a directory", dir.display()),
                ));
            }
            Err(_) => {}
        }

        let mut current = PathBuf::new();
        for component in dir.components() {
            current.push(component);

            match self.sftp.stat(&current) {
                Ok(stat) if stat.is_dir() => {}
                Ok(_) => {
                    return Err(TransferError::remote_io(
                        RemoteProtocol::Sftp,
                        format!("{} exists but is not a directory", current.display()),
                    ));
                }
                Err(_) => {
                    tracing::debug!("Creating remote directory {}", current.display());
                    self.sftp.mkdir(&current, 0o755).map_err(|e| {
                        TransferError::remote_io(
                            RemoteProtocol::Sftp,
                            format!("mkdir {}: {}", current.display(), e),
                        )
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Stream a local file into `remote_path`
    fn put(&self, local_path: &Path, remote_path: &Path) -> Result<u64> {
        let local_file =
            std::fs::File::open(local_path).map_err(|e| TransferError::io(local_path, e))?;

        let mut remote_file = self.sftp.create(remote_path).map_err(|e| {
            TransferError::remote_io(
                RemoteProtocol::Sftp,
                format!("create {}: {}", remote_path.display(), e),
            )
        })?;

        let mut reader = BufReader::with_capacity(UPLOAD_BUFFER_SIZE, local_file);
        let mut buffer = vec![0u8; UPLOAD_BUFFER_SIZE];
        let mut bytes_copied = 0u64;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| TransferError::io(local_path, e))?;

            if bytes_read == 0 {
                break;
            }

            remote_file
                .write_all(&buffer[..bytes_read])
                .map_err(|e| TransferError::remote_io(RemoteProtocol::Sftp, e.to_string()))?;

            bytes_copied += bytes_read as u64;
        }

        remote_file
            .flush()
            .map_err(|e| TransferError::remote_io(RemoteProtocol::Sftp, e.to_string()))?;

        Ok(bytes_copied)
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        let _ = self.session.disconnect(None, "transfer finished", None);
    }
}

/// `<destination>/<filename>` with POSIX separators
pub fn join_remote_path(destination: &str, filename: &str) -> String {
    let trimmed = destination.trim_end_matches('/');
    if trimmed.is_empty() && destination.starts_with('/') {
        format!("/{}", filename)
    } else if trimmed.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", trimmed, filename)
    }
}
