//! CLI subcommand implementations.
//!
//! Every command is generic over the storage backend so the same code runs
//! against the local database and the remote service.

pub mod summary;
pub mod tasks;
pub mod util;
pub mod work;
