//! hostkeeper - configuration lifecycle and backup/restore engine
//!
//! This library renders service configuration artifacts from templates,
//! validates and activates them against a running service with rollback on
//! failure, and snapshots configuration plus auxiliary state into
//! manifest-described archives that can be restored under full, merge or
//! selective policies.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Home directory and settings management
//! - `error`: Custom error types
//! - `models`: Category/identifier names, artifacts and backup components
//! - `template`: Placeholder rendering and the template library
//! - `storage`: Available/active artifact store, markers, locks, patching
//! - `services`: Service controllers and the activation lifecycle
//! - `backup`: Backup creation, retention and restore
//! - `audit`: Audit logging system
//! - `display`: Terminal formatting
//! - `cli`: Command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use hostkeeper::config::{HostPaths, Settings};
//! use hostkeeper::services::{CommandController, Lifecycle};
//! use hostkeeper::storage::ArtifactStore;
//!
//! let paths = HostPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let controller = CommandController::new(&settings);
//! let store = ArtifactStore::new(paths, settings)?;
//! Lifecycle::new(&store, &controller).activate(&category, &identifier)?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod template;

pub use error::{KeeperError, KeeperResult};
