//! Configuration module for the agora services
//!
//! Configuration is loaded once at startup, validated, and then handed to the
//! components that need it by value. Errors are reported immediately; a missing
//! or malformed variable never falls back silently.
//!
//! # Usage
//!
//! ```ignore
//! use agora_shared::config::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
//! let config = loader.load_service_config()?;
//! println!("Queue group: {}", config.replication.queue_group);
//! ```
//!
//! # Environment Variables
//!
//! ## Required Variables
//!
//! - `AGORA_DATABASE_URL`: PostgreSQL connection string
//! - `AGORA_NATS_URL`: comma separated NATS URLs
//!
//! ## Optional Variables
//!
//! - `AGORA_DB_POOL_SIZE`: Database pool size (default: 10)
//! - `AGORA_TX_TIMEOUT_SECS`: Bound on every transactional unit of work
//! - `AGORA_NATS_CLUSTER_ID`: Cluster namespace (default: "social-network")
//! - `AGORA_QUEUE_GROUP`: Queue group of the subscriber (default: "posts")
//! - `AGORA_ACK_WAIT_SECS`: Seconds before redelivery (default: 60)
//! - `AGORA_MAX_DELIVER`: Delivery attempts before dead-lettering (default: 5)
//! - `AGORA_EVENT_CODEC`: `bincode` or `json` (default: "bincode")
//! - `RUST_LOG`: Log level (default: "info")

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

pub use dto::{
    DatabaseConfig, LoggingConfig, NatsConfig, ReplicationConfig, ServiceConfigDto,
};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::{
    validate_codec_name, validate_database_url, validate_nats_urls, validate_pool_config,
    validate_replication_config, validate_service_config,
};
