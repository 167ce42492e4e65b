//! Remote protocol detection by port probing
//!
//! A reachable SSH port suggests SFTP; a reachable SMB port suggests SMB.
//! Reachability is taken as sufficient evidence: nothing is authenticated
//! and no payload is exchanged.

use crate::config::RemoteProtocol;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connect timeout of each probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of probing a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// An indicator port accepted a connection
    Detected(RemoteProtocol),
    /// Neither indicator port answered
    Undetermined,
}

impl ProbeOutcome {
    /// The detected protocol, if any
    pub fn protocol(&self) -> Option<RemoteProtocol> {
        match self {
            Self::Detected(p) => Some(*p),
            Self::Undetermined => None,
        }
    }
}

/// Anything that can guess a host's remote protocol
pub trait ProtocolDetector {
    /// Probe `peer`
    fn detect(&self, peer: &str) -> ProbeOutcome;
}

/// Ports and timeout used by [`ProtocolProber`]
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Port indicating SFTP
    pub sftp_port: u16,
    /// Port indicating SMB
    pub smb_port: u16,
    /// Connect timeout per probe
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sftp_port: RemoteProtocol::Sftp.indicator_port(),
            smb_port: RemoteProtocol::Smb.indicator_port(),
            timeout: PROBE_TIMEOUT,
        }
    }
}

/// TCP connect prober
#[derive(Debug, Clone, Default)]
pub struct ProtocolProber {
    config: ProbeConfig,
}

impl ProtocolProber {
    /// Create a prober with the given ports and timeout
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Probe SFTP first, then SMB only if SFTP did not answer
    pub fn detect(&self, peer: &str) -> ProbeOutcome {
        let candidates = [
            (RemoteProtocol::Sftp, self.config.sftp_port),
            (RemoteProtocol::Smb, self.config.smb_port),
        ];

        for (protocol, port) in candidates {
            if self.port_open(peer, port) {
                tracing::debug!("{}:{} open, assuming {}", peer, port, protocol);
                return ProbeOutcome::Detected(protocol);
            }
        }

        tracing::debug!("No indicator port open on {}", peer);
        ProbeOutcome::Undetermined
    }

    fn port_open(&self, peer: &str, port: u16) -> bool {
        let addrs = match (peer, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::debug!("Cannot resolve {}: {}", peer, e);
                return false;
            }
        };

        // The probe connection is dropped right away
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.config.timeout).is_ok())
    }
}

impl ProtocolDetector for ProtocolProber {
    fn detect(&self, peer: &str) -> ProbeOutcome {
        ProtocolProber::detect(self, peer)
    }
}

/// Probe `peer` on the standard ports
pub fn probe_protocol(peer: &str) -> ProbeOutcome {
    ProtocolProber::default().detect(peer)
}
