//! Configuration module for exodetect
//!
//! Loads config from `$XDG_CONFIG_HOME/exodetect/config.toml` or the platform config dir.
//! Falls back to embedded defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use exodetect::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Training delay: {} ms", config.training.delay_ms);
//! println!("Records key: {}", config.storage.records_key);
//! ```

pub mod schema;

pub use schema::{Config, MetricsMode};
