//! Transfer orchestration
//!
//! Ties the local copier, the LAN sender and the remote client together
//! behind [`TransferOrchestrator::execute`].

mod orchestrator;

pub use orchestrator::*;
pub use crate::network::probe_protocol;
