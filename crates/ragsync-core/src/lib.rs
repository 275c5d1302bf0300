//! # ragsync core
//!
//! Runtime-agnostic logic for ragsync: the resource model, text chunking,
//! stemming, the vector index abstraction, the embedding trait with its
//! distance metrics, lexical scoring, and the hybrid retriever.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate supplies concrete storage, embedding backends, and scheduling.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod lexical;
pub mod resource;
pub mod search;
pub mod stem;

pub use error::{EmbeddingError, SearchError};
pub use index::{IndexedChunk, VectorIndex};
pub use resource::{ContentKind, ImageFormat, Resource, ResourceMetadata};
