//! # Y-Share Core Library
//!
//! `yshare-core` provides the core functionality for Y-Share: upload files,
//! get a six-digit code, and let anyone who knows the code download the
//! files for the next ten minutes.
//!
//! ## Features
//!
//! - **Short numeric codes**: six digits, unique among live shares
//! - **Ephemeral**: sessions live in memory and expire on a fixed schedule
//! - **Streaming**: downloads are piped from remote storage, never buffered
//! - **On-the-fly archives**: several files arrive as one ZIP, encoded while sent
//!
//! ## Modules
//!
//! - [`blob`] - Remote blob storage boundary (memory and HTTP stores)
//! - [`code`] - Share code generation and validation
//! - [`config`] - Configuration management
//! - [`delivery`] - Streaming downloads and ZIP archives
//! - [`filename`] - Repair of mis-decoded file names
//! - [`ingest`] - Turning uploads into share sessions
//! - [`registry`] - Live share sessions and their expiry
//! - [`web`] - HTTP server
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use yshare_core::blob::MemoryBlobStore;
//! use yshare_core::delivery::{ArchiveOptions, DeliveryPipeline};
//! use yshare_core::registry::{CodeRegistry, FileRef, RegistryConfig};
//!
//! let store = Arc::new(MemoryBlobStore::new());
//! let url = store.insert("upload-1", "text/plain", "hello");
//!
//! let registry = CodeRegistry::new(RegistryConfig::default());
//! let code = registry.create(vec![FileRef::new(url, "hello.txt", "text/plain")])?;
//!
//! let pipeline = DeliveryPipeline::new(registry, store, ArchiveOptions::default());
//! let download = pipeline.deliver(code.as_str()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

pub mod blob;
pub mod code;
pub mod config;
pub mod delivery;
pub mod error;
pub mod filename;
pub mod ingest;
pub mod registry;

#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default lifetime of a share code in seconds
pub const DEFAULT_SESSION_TTL_SECS: u64 = 10 * 60;

/// Longest accepted share code lifetime in seconds
pub const MAX_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default number of random draws before giving up on a free code
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 32;

/// Default upload request limit (100 MB)
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Default key prefix for uploaded objects
pub const DEFAULT_STORAGE_FOLDER: &str = "y-share-temp";
