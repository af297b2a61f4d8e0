//! Registrar - identity/profile consistency core.
//!
//! Keeps an identity-store principal and its profile record in step across
//! two stores that share no transaction, and bulk-loads items through a
//! document store that caps batch sizes and partially rejects batches.

pub mod batch;
pub mod bulk;
pub mod config;
pub mod identity;
pub mod profile;
pub mod saga;
pub mod storage;
pub mod utils;
