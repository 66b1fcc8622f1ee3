//! Shared configuration types for sqlward.

pub mod config;

pub use config::{ConfigError, WhitelistConfig};
