//! Infrastructure layer: configuration, logging, and persistence plumbing.

pub mod config;
pub mod logging;
pub mod store;

pub use config::{ConfigError, ConfigLoader};
pub use store::{JsonEntityStore, StoreError};
