//! Configuration module for jarvis-transfer
//!
//! Provides CLI arguments, the transfer descriptor, and the store
//! that persists a saved transfer setup.

mod settings;
mod store;

pub use settings::*;
pub use store::*;
