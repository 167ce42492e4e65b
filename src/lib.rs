//! # jarvis-transfer - Local, LAN and Remote File Transfer
//!
//! jarvis-transfer moves a file (or, locally, a directory tree) in one of
//! three modes:
//!
//! - **Local**: same-machine copy preserving permissions and timestamps
//! - **Network**: raw TCP push to a one-shot receiver on the LAN
//! - **Remote**: authenticated upload over SFTP or SMB, with the protocol
//!   detected by port probing and a single fallback to the other protocol
//!
//! ## Quick Start
//!
//! ```no_run
//! use jarvis_transfer::config::{Credentials, TransferDescriptor};
//! use jarvis_transfer::transfer::TransferOrchestrator;
//!
//! let descriptor = TransferDescriptor::remote(
//!     "report.pdf",
//!     "/home/bob/inbox",
//!     "192.168.1.20",
//!     Credentials::new("bob", "secret"),
//! );
//!
//! let outcome = TransferOrchestrator::new().execute(&descriptor);
//! if outcome.succeeded {
//!     println!("Delivered to {}", outcome.resolved_path);
//! }
//! ```
//!
//! ## LAN Transfer
//!
//! ```no_run
//! use jarvis_transfer::network::{LanReceiver, LanSender};
//! use std::path::Path;
//!
//! // On the receiving machine
//! let receiver = LanReceiver::bind("0.0.0.0:5001").unwrap();
//! let received = receiver.receive(Path::new("./incoming")).unwrap();
//! println!("{} ({} bytes)", received.path.display(), received.bytes_received);
//!
//! // On the sending machine
//! let sent = LanSender::new().send(Path::new("a.txt"), "192.168.1.10").unwrap();
//! println!("Sent {} bytes", sent);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fs;
pub mod network;
pub mod transfer;

// Re-export commonly used types
pub use config::{Credentials, RemoteProtocol, TransferDescriptor, TransferMode};
pub use error::{Result, TransferError};
pub use transfer::{TransferOrchestrator, TransferOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use jarvis_transfer::prelude::*;
    //! ```

    pub use crate::config::{
        ConfigStore, Credentials, JsonFileStore, RemoteProtocol, TransferDescriptor, TransferMode,
    };
    pub use crate::error::{Result, TransferError};
    pub use crate::fs::{CopyReport, LocalCopier};
    pub use crate::network::{
        probe_protocol, receive_file, LanReceiver, LanSender, ProbeOutcome, ProtocolProber,
        RemoteTransferClient,
    };
    pub use crate::transfer::{
        execute_transfer, start_receiver, TransferOrchestrator, TransferOutcome, TransferState,
    };
}
