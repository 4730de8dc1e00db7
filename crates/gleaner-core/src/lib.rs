//! Gleaner Core - Foundation crate for the Gleaner harvesting workspace.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other Gleaner crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`RunId`, `PageRange`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{AppConfig, PageRange};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.harvest.page_size, 25);
//!
//! let range = PageRange::new(1, 3)?;
//! assert_eq!(range.len(), 3);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, GeneralConfig, HarvestConfig, ListingSelector, SelectorConfig,
    StorageConfig,
};
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use types::{PageRange, RunId, Timestamp};
