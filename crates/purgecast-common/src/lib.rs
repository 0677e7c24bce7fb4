//! Purgecast Common Types
//!
//! This crate provides the data model and configuration loading shared by all
//! purgecast components:
//!
//! - **[`config`]** - `Cache` and `Group` definitions plus the INI/JSON
//!   configuration loaders
//! - **[`error`]** - The `PurgecastError` error enum and `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use purgecast_common::config::load_groups;
//!
//! let groups = load_groups("/etc/purgecast/caches.ini".as_ref()).unwrap();
//! for group in &groups {
//!     println!("{}: {} caches", group.name, group.caches.len());
//! }
//! ```

pub mod config;
pub mod error;

pub use config::{Cache, Group};
pub use error::{PurgecastError, Result};
