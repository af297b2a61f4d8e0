//! Shared helpers for binaries and the batch engine.

pub mod bootstrap;
pub mod retry;
