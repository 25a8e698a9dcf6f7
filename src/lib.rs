#![allow(clippy::multiple_crate_versions)]

pub mod app;
pub mod config;
pub mod error;
pub mod flows;
pub mod ipc;
pub mod notifications;
pub mod registry;

pub use error::{ExoError, NameError, Result};
