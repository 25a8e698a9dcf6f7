//! Trained-model registry
//!
//! Holds the ordered record set and the active selection, writes both to a
//! [`KeyValueStore`] after every change and publishes [`RegistryEvent`]s to
//! subscribers. The base record (`base-model`) is always present and can
//! never be deleted.

pub mod manager;
pub mod record;
pub mod store;

pub use manager::{ModelRegistry, RegistryEvent, SharedRegistry, StorageKeys};
pub use record::{Hyperparameters, MetricsSource, ModelKind, ModelRecord, BASE_MODEL_ID};
pub use store::{validate_key, FileStore, KeyValueStore, MemoryStore};
