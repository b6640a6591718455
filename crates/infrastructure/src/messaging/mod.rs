//! Messaging adapters

pub mod nats;
