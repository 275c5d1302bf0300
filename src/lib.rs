//! # ragsync
//!
//! A retrieval-augmented generation pipeline built around a hash-keyed
//! resource catalog.
//!
//! Collectors hand [`Resource`](ragsync_core::resource::Resource)s to the
//! persistence service, which writes them to a data directory and records
//! them in two JSON catalogs. A polling synchronizer diffs the catalog
//! against the vector index and embeds, upserts, or deletes whatever
//! differs. The hybrid retriever answers top-k queries over the index.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Collectors │──▶│ Persistence │──▶│ Synchronizer │──▶│  SQLite  │
//! │  FS / API  │   │ files+JSON  │   │ chunk+embed  │   │ vectors  │
//! └────────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                            │
//!                                    ┌───────────────────────┤
//!                                    ▼                       ▼
//!                               ┌──────────┐           ┌──────────┐
//!                               │   CLI    │           │   HTTP   │
//!                               │ (search) │           │  server  │
//!                               └──────────┘           └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Persistence error taxonomy |
//! | [`catalog`] | Locked, atomically-replaced JSON catalogs |
//! | [`persist`] | Persistence service |
//! | [`raw_resource`] | Resources submitted as JSON |
//! | [`collector`] | Collector trait |
//! | [`collector_fs`] | Filesystem collector |
//! | [`embedding`] | Embedding providers |
//! | [`retry`] | Retry with backoff and timeout |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Index schema |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`sync`] | Vector store synchronizer |
//! | [`coordinator`] | Wiring and polling loop |
//! | [`server`] | HTTP API |
//! | [`stats`] | Catalog vs. index overview |
//!
//! Chunking, lexical scoring, and ranking live in `ragsync-core`.

pub mod catalog;
pub mod catalog_cmd;
pub mod collector;
pub mod collector_fs;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod persist;
pub mod raw_resource;
pub mod retrieve;
pub mod retry;
pub mod server;
pub mod sqlite_index;
pub mod stats;
pub mod sync;
pub mod sync_cmd;
