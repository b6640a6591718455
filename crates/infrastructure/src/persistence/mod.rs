//! Persistence adapters

pub mod postgres;
