//! # Shelf
//!
//! Offline synchronization of novels: a persistent download queue that fetches
//! chapters with bounded concurrency, and a local content store that serves
//! them for offline reading.
//!
//! ## Architecture
//!
//! ```text
//! caller → DownloadQueue → Fetcher → ContentStore → KvStore
//! ```
//!
//! - [`queue`]: Bounded-concurrency download queue that survives restarts
//! - [`content`]: Collection metadata, item index, and item content
//! - [`store`]: Key-value persistence (SQLite or in-memory)
//! - [`fetcher`]: Remote source of collections and chapters
//!
//! ## Quick Start
//!
//! ```bash
//! # Download chapters 1 to 20 of a novel
//! shelf add my-novel --items 1-20
//!
//! # List downloaded novels
//! shelf list
//!
//! # Read a chapter
//! shelf read my-novel 3
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// storage, content store, fetcher, queue.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/shelf/config.toml`.
pub mod config;

/// Local content store.
///
/// - [`ContentStore`](content::ContentStore): metadata, per-collection index, item content
pub mod content;

/// Core domain models.
pub mod domain;

/// Remote fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for collection and item fetching
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Download queue.
///
/// - [`DownloadQueue`](queue::DownloadQueue): add, remove, subscribe, status queries
pub mod queue;

/// Key-value persistence.
///
/// - [`KvStore`](store::KvStore): Trait defining storage operations
/// - [`SqliteKv`](store::SqliteKv): SQLite implementation
/// - [`MemoryKv`](store::MemoryKv): In-memory implementation
pub mod store;
