//! Configuration settings for jarvis-transfer
//!
//! Defines the CLI arguments, the transfer mode and protocol enums, and the
//! immutable [`TransferDescriptor`] every transfer is executed from.

use crate::error::{Result, TransferError};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// jarvis-transfer - Send files locally, across the LAN, or to a remote host
#[derive(Parser, Debug, Clone)]
#[command(name = "jarvis-transfer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send and receive files across the local machine, LAN, or remote hosts")]
#[command(long_about = r#"
jarvis-transfer moves files in one of three modes:

  local    copy a file or directory tree on this machine
  network  stream a single file to a receiver on the LAN (raw TCP, port 5001)
  remote   upload over SFTP or SMB, with automatic protocol detection and
           a single fallback to the other protocol on failure

Examples:
  jarvis-transfer setup --mode local --source ./docs --destination /backup/docs
  jarvis-transfer setup --mode network --source a.txt --ip 192.168.1.20
  jarvis-transfer setup --mode remote --source a.txt --ip nas --username bob \
                        --password secret --destination share/inbox
  jarvis-transfer transfer
  jarvis-transfer receive --save-dir ./incoming

Network headers end in a newline. When one side is an older jarvis release
that sends or expects a bare `name:size` header, pass --legacy-framing to
both `transfer` and `receive` on the side talking to it.

On Linux and macOS SMB shares are reached through local mounts: mount
//host/share at <root>/host/share and pass --smb-mount-root <root>.
"#)]
pub struct CliArgs {
    /// Path of the saved transfer setup (default: ~/.jarvis/file_transfer.json)
    #[arg(long, global = true, value_name = "PATH", env = "JARVIS_TRANSFER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Configure a transfer setup once
    #[command(name = "setup")]
    Setup(SetupArgs),

    /// Execute the transfer based on the saved setup
    #[command(name = "transfer")]
    Transfer {
        /// Directory holding SMB mounts as <root>/<host>/<share>
        /// (required for SMB outside Windows)
        #[arg(long, value_name = "DIR", env = "JARVIS_TRANSFER_SMB_ROOT")]
        smb_mount_root: Option<PathBuf>,
        /// Send the header without a trailing newline, as older receivers
        /// expect. The default newline-terminated header is not understood
        /// by those receivers.
        #[arg(long)]
        legacy_framing: bool,
    },

    /// Start a one-shot receiver for network transfers
    #[command(name = "receive")]
    Receive {
        /// Directory to save incoming files
        #[arg(long, default_value = ".", value_name = "DIR")]
        save_dir: PathBuf,
        /// Port to listen on
        #[arg(short, long, default_value = "5001")]
        port: u16,
        /// Give up if no sender connects within this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Expect headers without a trailing newline, as older senders
        /// write them. Without this flag such a sender's header is not
        /// recognized.
        #[arg(long)]
        legacy_framing: bool,
        /// Fail if the sender closes before the declared size arrives
        #[arg(long)]
        strict: bool,
    },

    /// Probe a host to guess which remote protocol it supports
    #[command(name = "detect")]
    Detect {
        /// Host name or IP address
        host: String,
    },

    /// Show the saved transfer setup
    #[command(name = "show-config")]
    ShowConfig,

    /// Clear the saved transfer setup
    #[command(name = "reset")]
    Reset,
}

/// Arguments of the `setup` subcommand
#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Transfer mode
    #[arg(long, value_enum)]
    pub mode: TransferMode,

    /// Protocol for remote transfers (auto-detected if not provided)
    #[arg(long, value_enum)]
    pub protocol: Option<RemoteProtocol>,

    /// Path to the file or folder to transfer
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// Destination path (required for local and remote)
    #[arg(long, value_name = "PATH")]
    pub destination: Option<String>,

    /// Target IP or host name (required for network and remote)
    #[arg(long, value_name = "HOST")]
    pub ip: Option<String>,

    /// Username (required for remote)
    #[arg(long)]
    pub username: Option<String>,

    /// Password (required for remote)
    #[arg(long, env = "JARVIS_TRANSFER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Transfer mode
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Same-machine copy
    Local,
    /// Raw TCP transfer to a LAN receiver
    Network,
    /// Authenticated upload over SFTP or SMB
    Remote,
}

impl TransferMode {
    /// Get the lowercase name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Network => "network",
            Self::Remote => "remote",
        }
    }
}

/// Remote transfer protocol
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    /// SFTP over an SSH session
    #[value(name = "sftp")]
    Sftp,
    /// SMB/CIFS share
    #[value(name = "smb")]
    Smb,
}

impl RemoteProtocol {
    /// The other protocol, used for failover
    pub fn alternate(&self) -> Self {
        match self {
            Self::Sftp => Self::Smb,
            Self::Smb => Self::Sftp,
        }
    }

    /// Well-known port whose reachability indicates this protocol
    pub fn indicator_port(&self) -> u16 {
        match self {
            Self::Sftp => 22,
            Self::Smb => 445,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sftp => "SFTP",
            Self::Smb => "SMB",
        }
    }
}

impl fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Username/password pair for remote transfers
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// A fully described transfer, immutable once built
///
/// Field names serialize to the same keys the saved setup file has always
/// used (`mode`, `protocol`, `source`, `destination`, `ip`, `username`,
/// `password`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    mode: TransferMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protocol: Option<RemoteProtocol>,
    source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(rename = "ip", default, skip_serializing_if = "Option::is_none")]
    peer: Option<String>,
    #[serde(flatten)]
    credentials: Option<Credentials>,
}

impl TransferDescriptor {
    /// Same-machine copy of `source` to `destination`
    pub fn local(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            mode: TransferMode::Local,
            protocol: None,
            source: source.into(),
            destination: Some(destination.into().to_string_lossy().into_owned()),
            peer: None,
            credentials: None,
        }
    }

    /// LAN transfer of `source` to the receiver at `peer`
    pub fn network(source: impl Into<PathBuf>, peer: impl Into<String>) -> Self {
        Self {
            mode: TransferMode::Network,
            protocol: None,
            source: source.into(),
            destination: None,
            peer: Some(peer.into()),
            credentials: None,
        }
    }

    /// Authenticated upload of `source` into `destination` on `peer`
    pub fn remote(
        source: impl Into<PathBuf>,
        destination: impl Into<String>,
        peer: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            mode: TransferMode::Remote,
            protocol: None,
            source: source.into(),
            destination: Some(destination.into()),
            peer: Some(peer.into()),
            credentials: Some(credentials),
        }
    }

    /// Attach a protocol hint (remote mode only)
    pub fn with_protocol(mut self, protocol: RemoteProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Transfer mode
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Source path
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination path (local) or remote directory (remote)
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Peer address
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Remote credentials
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Protocol hint
    pub fn protocol(&self) -> Option<RemoteProtocol> {
        self.protocol
    }

    /// Check the per-mode invariants
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(TransferError::InvalidDescriptor(msg.to_string()));

        if self.source.as_os_str().is_empty() {
            return invalid("source path is required");
        }

        match self.mode {
            TransferMode::Local => {
                if self.destination.as_deref().map_or(true, str::is_empty) {
                    return invalid("local mode requires a destination");
                }
            }
            TransferMode::Network => {
                if self.destination.is_some() {
                    return invalid("network mode delivers to the receiver's save directory; drop the destination");
                }
                if self.peer.as_deref().map_or(true, str::is_empty) {
                    return invalid("network mode requires a peer address");
                }
            }
            TransferMode::Remote => {
                if self.peer.as_deref().map_or(true, str::is_empty) {
                    return invalid("remote mode requires a peer address");
                }
                if self.destination.as_deref().map_or(true, str::is_empty) {
                    return invalid("remote mode requires a destination directory");
                }
                match &self.credentials {
                    Some(c) if !c.username.is_empty() => {}
                    _ => return invalid("remote mode requires a username and password"),
                }
            }
        }

        Ok(())
    }

    /// Build a descriptor from `setup` arguments
    ///
    /// The protocol is taken from the arguments as-is; detection is the
    /// caller's job.
    pub fn from_setup(args: &SetupArgs) -> std::result::Result<Self, String> {
        let descriptor = match args.mode {
            TransferMode::Local => {
                let destination = args
                    .destination
                    .as_ref()
                    .ok_or("--destination is required for local mode")?;
                Self::local(&args.source, destination)
            }
            TransferMode::Network => {
                if args.destination.is_some() {
                    return Err("--destination is not used in network mode; the receiver picks the save directory".to_string());
                }
                let ip = args.ip.as_ref().ok_or("--ip is required for network mode")?;
                Self::network(&args.source, ip)
            }
            TransferMode::Remote => {
                let ip = args.ip.as_ref().ok_or("--ip is required for remote mode")?;
                let username = args
                    .username
                    .as_ref()
                    .ok_or("--username is required for remote mode")?;
                let password = args
                    .password
                    .as_ref()
                    .ok_or("--password is required for remote mode")?;
                let destination = args
                    .destination
                    .as_ref()
                    .ok_or("--destination is required for remote mode")?;
                let descriptor = Self::remote(
                    &args.source,
                    destination,
                    ip,
                    Credentials::new(username, password),
                );
                match args.protocol {
                    Some(p) => descriptor.with_protocol(p),
                    None => descriptor,
                }
            }
        };

        descriptor.validate().map_err(|e| e.to_string())?;
        Ok(descriptor)
    }
}
