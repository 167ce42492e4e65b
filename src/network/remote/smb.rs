//! Upload onto an SMB share
//!
//! The destination is `share[/subpath]` on the remote host. It is composed
//! into a UNC path and handed to a [`ShareResolver`], which decides how
//! that location is reached from this machine.

use super::{source_file_name, RemoteBackend, UploadRequest};
use crate::config::{Credentials, RemoteProtocol};
use crate::error::{Result, TransferError};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// A file location on an SMB share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncPath {
    host: String,
    share: String,
    segments: Vec<String>,
    filename: String,
}

impl UncPath {
    /// Parse `share[/subpath]` (either separator) for `host`
    pub fn parse(host: &str, destination: &str, filename: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(TransferError::InvalidDescriptor(
                "SMB host is empty".to_string(),
            ));
        }

        let normalized = destination.replace('\\', "/");
        let mut parts = normalized.split('/').filter(|s| !s.is_empty() && *s != ".");

        let share = parts.next().ok_or_else(|| {
            TransferError::InvalidDescriptor(format!(
                "SMB destination '{}' names no share",
                destination
            ))
        })?;

        let segments: Vec<String> = parts.map(str::to_string).collect();
        if share == ".." || segments.iter().any(|s| s == "..") {
            return Err(TransferError::InvalidDescriptor(format!(
                "SMB destination '{}' must not contain '..'",
                destination
            )));
        }

        Ok(Self {
            host: host.to_string(),
            share: share.to_string(),
            segments,
            filename: filename.to_string(),
        })
    }

    /// Remote host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Share name
    pub fn share(&self) -> &str {
        &self.share
    }

    /// Directories below the share
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// `\\host\share[\subpath]\filename`
    pub fn to_unc_string(&self) -> String {
        let mut unc = format!(r"\\{}\{}", self.host, self.share);
        for segment in &self.segments {
            unc.push('\\');
            unc.push_str(segment);
        }
        unc.push('\\');
        unc.push_str(&self.filename);
        unc
    }
}

/// Validated SMB login
#[derive(Clone, Copy)]
pub struct SmbLogin<'a> {
    /// Domain from a `DOMAIN\user` username
    pub domain: Option<&'a str>,
    /// Account name without the domain
    pub user: &'a str,
    /// Account password, never empty
    pub password: &'a str,
}

impl std::fmt::Debug for SmbLogin<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbLogin")
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

/// Maps a share location onto a local filesystem directory
pub trait ShareResolver: Send + Sync {
    /// Directory that holds the file named by `unc`, reached as `login`
    fn resolve_dir(&self, unc: &UncPath, login: &SmbLogin<'_>) -> Result<PathBuf>;
}

/// Opens UNC paths directly (Windows only)
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeUnc;

impl ShareResolver for NativeUnc {
    #[cfg(windows)]
    fn resolve_dir(&self, unc: &UncPath, _login: &SmbLogin<'_>) -> Result<PathBuf> {
        let mut dir = PathBuf::from(format!(r"\\{}\{}\", unc.host, unc.share));
        for segment in &unc.segments {
            dir.push(segment);
        }
        Ok(dir)
    }

    #[cfg(not(windows))]
    fn resolve_dir(&self, unc: &UncPath, _login: &SmbLogin<'_>) -> Result<PathBuf> {
        Err(TransferError::remote_io(
            RemoteProtocol::Smb,
            format!(
                "UNC paths are not reachable on this platform; mount \\\\{}\\{} and use a mounted share root",
                unc.host, unc.share
            ),
        ))
    }
}

/// Shares mounted below a local root as `<root>/<host>/<share>`
///
/// The mount carries its own session, so the login is only checked, not
/// presented again.
#[derive(Debug, Clone)]
pub struct MountedShares {
    root: PathBuf,
}

impl MountedShares {
    /// Resolve shares under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShareResolver for MountedShares {
    fn resolve_dir(&self, unc: &UncPath, _login: &SmbLogin<'_>) -> Result<PathBuf> {
        let mut dir = self.root.join(&unc.host).join(&unc.share);
        for segment in &unc.segments {
            dir.push(segment);
        }
        Ok(dir)
    }
}

/// SMB backend
pub struct SmbBackend {
    resolver: Box<dyn ShareResolver>,
}

impl Default for SmbBackend {
    fn default() -> Self {
        Self::new(NativeUnc)
    }
}

impl std::fmt::Debug for SmbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbBackend").finish_non_exhaustive()
    }
}

impl SmbBackend {
    /// Backend using `resolver` to reach shares
    pub fn new(resolver: impl ShareResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }

    /// Replace the share resolver
    pub fn with_resolver(mut self, resolver: impl ShareResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }
}

impl RemoteBackend for SmbBackend {
    fn protocol(&self) -> RemoteProtocol {
        RemoteProtocol::Smb
    }

    fn upload(&self, request: &UploadRequest<'_>) -> Result<String> {
        let filename = source_file_name(request.source)?;
        let unc = UncPath::parse(request.host, request.destination, &filename)?;
        let login = establish_credentials(request.credentials, request.host)?;

        tracing::debug!(
            "SMB session for {}{} on {}",
            login.domain.map(|d| format!("{}\\", d)).unwrap_or_default(),
            login.user,
            unc.host()
        );

        let dir = self.resolver.resolve_dir(&unc, &login)?;
        std::fs::create_dir_all(&dir).map_err(|e| smb_error(&dir, e))?;

        let target = dir.join(&filename);
        let bytes = copy_bytes(request.source, &target)?;

        let unc_string = unc.to_unc_string();
        tracing::info!("Uploaded {} bytes to {}", bytes, unc_string);
        Ok(unc_string)
    }
}

/// Validate the login and split an optional `DOMAIN\user` prefix
fn establish_credentials<'a>(credentials: &'a Credentials, host: &str) -> Result<SmbLogin<'a>> {
    let name = credentials.username.trim();
    let (domain, user) = match name.split_once('\\') {
        Some((domain, user)) => (Some(domain), user),
        None => (None, name),
    };

    if user.is_empty() {
        return Err(TransferError::auth(name, host, "SMB username is empty"));
    }
    if credentials.password.is_empty() {
        return Err(TransferError::auth(name, host, "SMB password is empty"));
    }

    Ok(SmbLogin {
        domain: domain.filter(|d| !d.is_empty()),
        user,
        password: &credentials.password,
    })
}

fn copy_bytes(source: &Path, target: &Path) -> Result<u64> {
    let input = File::open(source).map_err(|e| TransferError::io(source, e))?;
    let output = File::create(target).map_err(|e| smb_error(target, e))?;

    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let bytes = std::io::copy(&mut reader, &mut writer).map_err(|e| smb_error(target, e))?;

    let output = writer
        .into_inner()
        .map_err(|e| smb_error(target, e.into_error()))?;
    output.sync_all().map_err(|e| smb_error(target, e))?;

    Ok(bytes)
}

fn smb_error(path: &Path, err: std::io::Error) -> TransferError {
    TransferError::remote_io(RemoteProtocol::Smb, format!("{}: {}", path.display(), err))
}
