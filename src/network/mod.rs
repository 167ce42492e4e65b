//! Network transfer module
//!
//! Provides the two networked delivery modes:
//! - LAN transfer over a raw TCP socket (sender + one-shot receiver)
//! - Remote upload over SFTP or SMB, selected by protocol
//!
//! plus the port prober that guesses which remote protocol a host speaks.
//!
//! ## Transport Comparison
//!
//! | Transport | Security | Auth | Use Case |
//! |-----------|----------|------|----------|
//! | LAN (TCP) | None | None | Trusted LAN, receiver running |
//! | SFTP | SSH | Password | Servers with sshd |
//! | SMB | Share-level | Password | Windows shares / NAS |

pub mod frame;
mod lan;
mod probe;
pub mod remote;

pub use frame::{decode_header, encode_header, FrameStyle, Header};
pub use lan::*;
pub use probe::*;
pub use remote::{
    HostKeyPolicy, MountedShares, NativeUnc, RemoteBackend, RemoteClient, RemoteTransferClient,
    ShareResolver, SftpBackend, SmbBackend, SmbLogin, UncPath, UploadRequest,
};

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connect to `host:port`, trying every resolved address within `timeout`
pub(crate) fn connect_with_timeout(
    host: &str,
    port: u16,
    timeout: Duration,
) -> std::io::Result<TcpStream> {
    let mut last_error = None;

    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("{} resolved to no addresses", host),
        )
    }))
}
