//! Domain layer for post replication.
//!
//! Records, errors and the ports (traits) that the application layer drives
//! and the infrastructure layer implements.

pub mod codec;
pub mod comments;
pub mod events;
pub mod messaging;
pub mod posts;
pub mod replica;
pub mod shared_kernel;
pub mod transaction;

pub use shared_kernel::*;
