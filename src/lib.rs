//! # mindful-sync
//!
//! Offline-first data layer for a mental-wellness app: mood check-ins,
//! therapy goals and sessions, guided meditations and premium gating, kept
//! in sync with a hosted PostgREST-style backend.
//!
//! ## Features
//!
//! - **Domain stores**: per-entity caches with optimistic adds and rollback
//! - **Fallback data**: demo records stand in while the backend is down
//! - **Freshness policy**: repeated reads inside a window skip the network
//! - **Snapshots**: versioned last-known-good data in SQLite
//! - **Functions**: text-to-speech narration and subscription checks
//! - **Meditations**: seeded script generation by kind and duration
//!
//! ## Architecture
//!
//! ```text
//! Caller → AppState → DomainStore → run_query → RemoteCollection (HTTP)
//!                          ↓
//!                  SnapshotPersistence → SQLite
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mindful_sync::{AppState, Config};
//! use mindful_sync::backend::{Credentials, RestBackend};
//! use mindful_sync::persist::SqliteKv;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let credentials = Credentials::new(config.backend.anon_key.clone());
//!     let backend = RestBackend::new(&config.backend, credentials.clone(), config.request.clone())?;
//!     let kv = SqliteKv::new(&config.cache).await?;
//!     let state = AppState::new(config, credentials, Arc::new(backend), Arc::new(kv));
//!     state.sign_in("user-1", None).await;
//!     let summary = state.refresh_all().await;
//!     println!("{} moods", summary.moods);
//!     Ok(())
//! }
//! ```

/// Explicitly constructed application root.
pub mod app;
/// Remote collection surface, query wrapper and its implementations.
pub mod backend;
/// Command-line subcommands.
pub mod cli;
/// Configuration loaded from environment variables.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Data source tag and demo records.
pub mod fallback;
/// Serverless function clients.
pub mod functions;
/// Guided meditation scripts.
pub mod meditation;
/// Versioned snapshot persistence.
pub mod persist;
/// Record types and identifiers.
pub mod records;
/// Per-entity stores with optimistic updates.
pub mod store;

pub use app::AppState;
pub use config::Config;
pub use error::{AppError, AppResult};
