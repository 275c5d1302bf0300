//! Resources submitted as loosely-typed JSON (the HTTP ingestion endpoint).
//!
//! ```json
//! {
//!   "kind": "markdown",
//!   "content": "# Helmholtz coils\n...",
//!   "display_name": "Helmholtz coils",
//!   "metadata": { "url": "https://course.example/h1", "week": 3 }
//! }
//! ```
//!
//! `kind` is parsed with [`ContentKind::from_str`]; an unknown kind is a
//! rejection. Binary kinds send `"encoding": "base64"`. Without an explicit
//! `hash`, one is computed from the decoded bytes.

use base64::Engine;
use ragsync_core::resource::{content_hash, ContentKind, Resource, ResourceMetadata};
use serde::Deserialize;
use std::str::FromStr;

use crate::error::PersistError;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResourceRequest {
    #[serde(default)]
    pub hash: Option<String>,
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Extra metadata; non-string values are coerced to strings.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct RawResource {
    hash: String,
    kind: ContentKind,
    bytes: Vec<u8>,
    metadata: Option<ResourceMetadata>,
}

impl RawResource {
    pub fn from_request(req: RawResourceRequest) -> Result<Self, PersistError> {
        let provisional = req.hash.clone().unwrap_or_default();
        let kind = ContentKind::from_str(&req.kind)
            .map_err(|reason| PersistError::rejected(&provisional, reason))?;

        let bytes = match req.encoding {
            ContentEncoding::Utf8 => req.content.into_bytes(),
            ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(req.content.trim())
                .map_err(|e| {
                    PersistError::rejected(&provisional, format!("invalid base64: {}", e))
                })?,
        };

        let hash = req.hash.unwrap_or_else(|| content_hash(&[bytes.as_slice()]));

        // Extras without a display name still count as metadata, and are
        // rejected at persist time for the missing name.
        let metadata = match (req.display_name, req.metadata.is_empty()) {
            (Some(name), _) => Some(ResourceMetadata::from_json_fields(name, &req.metadata)),
            (None, false) => Some(ResourceMetadata::from_json_fields("", &req.metadata)),
            (None, true) => None,
        };

        Ok(Self {
            hash,
            kind,
            bytes,
            metadata,
        })
    }
}

impl Resource for RawResource {
    fn hash(&self) -> &str {
        &self.hash
    }
    fn kind(&self) -> ContentKind {
        self.kind
    }
    fn content(&self) -> &[u8] {
        &self.bytes
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        self.metadata.as_ref()
    }
}
