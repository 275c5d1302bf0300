//! The resource model: one unit of collected content plus its metadata.
//!
//! Collectors produce values implementing [`Resource`]. The persistence
//! service only ever sees the trait, so adding a new content source means
//! implementing four small methods and nothing downstream changes.
//!
//! # Identity
//!
//! [`Resource::hash`] is the single key of identity and deduplication. It
//! is computed once by the producer with [`content_hash`], from the content
//! and, where the same bytes may legitimately come from different places,
//! from the source identity (URL, ticket id, relative path). Unchanged
//! content re-collected later yields the same hash; any change yields a new
//! one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Metadata keys written by the pipeline itself. Collector extras with the
/// same name are dropped when metadata is flattened into an index entry.
pub const RESERVED_KEYS: [&str; 4] = ["hash", "filename", "display_name", "embedding_model"];

/// Supported image encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

/// The closed set of content kinds the pipeline knows how to store and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Markdown,
    Html,
    Ticket,
    Image(ImageFormat),
}

impl ContentKind {
    /// File extension used for the stored content file.
    pub fn extension(&self) -> &'static str {
        match self {
            ContentKind::Text | ContentKind::Ticket => "txt",
            ContentKind::Markdown => "md",
            ContentKind::Html => "html",
            ContentKind::Image(format) => format.extension(),
        }
    }

    /// Whether the payload is indexed by its own text.
    pub fn is_text(&self) -> bool {
        !matches!(self, ContentKind::Image(_))
    }

    /// Map a file extension (case-insensitive, without the dot) to a kind.
    ///
    /// `txt` maps to [`ContentKind::Text`]; tickets share the extension and
    /// are indistinguishable on disk, which is fine since both are text.
    pub fn from_extension(ext: &str) -> Option<ContentKind> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(ContentKind::Text),
            "md" | "markdown" => Some(ContentKind::Markdown),
            "html" | "htm" => Some(ContentKind::Html),
            "png" => Some(ContentKind::Image(ImageFormat::Png)),
            "jpg" | "jpeg" => Some(ContentKind::Image(ImageFormat::Jpeg)),
            "gif" => Some(ContentKind::Image(ImageFormat::Gif)),
            "webp" => Some(ContentKind::Image(ImageFormat::Webp)),
            _ => None,
        }
    }

    /// Recognize a kind from a file name's extension.
    pub fn from_filename(name: &str) -> Option<ContentKind> {
        let (_, ext) = name.rsplit_once('.')?;
        ContentKind::from_extension(ext)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Text => "text",
            ContentKind::Markdown => "markdown",
            ContentKind::Html => "html",
            ContentKind::Ticket => "ticket",
            ContentKind::Image(ImageFormat::Png) => "image/png",
            ContentKind::Image(ImageFormat::Jpeg) => "image/jpeg",
            ContentKind::Image(ImageFormat::Gif) => "image/gif",
            ContentKind::Image(ImageFormat::Webp) => "image/webp",
        };
        f.write_str(s)
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentKind::Text),
            "markdown" => Ok(ContentKind::Markdown),
            "html" => Ok(ContentKind::Html),
            "ticket" => Ok(ContentKind::Ticket),
            "image/png" => Ok(ContentKind::Image(ImageFormat::Png)),
            "image/jpeg" => Ok(ContentKind::Image(ImageFormat::Jpeg)),
            "image/gif" => Ok(ContentKind::Image(ImageFormat::Gif)),
            "image/webp" => Ok(ContentKind::Image(ImageFormat::Webp)),
            other => Err(format!(
                "unrecognized content kind '{}': expected text, markdown, html, ticket, or image/<png|jpeg|gif|webp>",
                other
            )),
        }
    }
}

/// Optional metadata attached to a resource.
///
/// All `extra` values are strings. Producers with numeric, boolean, or
/// structured fields normalize them here, via [`with_extra`](Self::with_extra)
/// or [`from_json_fields`](Self::from_json_fields), before the resource
/// reaches persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub display_name: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ResourceMetadata {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra.insert(key.into(), value.to_string());
        self
    }

    /// Build metadata from loosely-typed JSON fields, coercing every value
    /// to a string. `null` values are dropped; arrays and objects are kept
    /// as compact JSON text.
    pub fn from_json_fields(
        display_name: impl Into<String>,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let extra = fields
            .iter()
            .filter_map(|(k, v)| json_to_string(v).map(|s| (k.clone(), s)))
            .collect();
        Self {
            display_name: display_name.into(),
            extra,
        }
    }
}

fn json_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// One unit of collected content.
pub trait Resource: Send + Sync {
    /// Stable, content-derived identifier.
    fn hash(&self) -> &str;

    fn kind(&self) -> ContentKind;

    /// On-disk file name, derived from the hash and content kind.
    fn filename(&self) -> String {
        format!("{}.{}", self.hash(), self.kind().extension())
    }

    /// Payload bytes (UTF-8 for text kinds).
    fn content(&self) -> &[u8];

    fn metadata(&self) -> Option<&ResourceMetadata> {
        None
    }
}

impl<R: Resource + ?Sized> Resource for Box<R> {
    fn hash(&self) -> &str {
        (**self).hash()
    }
    fn kind(&self) -> ContentKind {
        (**self).kind()
    }
    fn filename(&self) -> String {
        (**self).filename()
    }
    fn content(&self) -> &[u8] {
        (**self).content()
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        (**self).metadata()
    }
}

/// SHA-256 over the given parts, hex encoded.
///
/// Parts are separated by a NUL byte so `["ab", "c"]` and `["a", "bc"]`
/// hash differently.
pub fn content_hash(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// Whether `hash` is usable as a resource identity (and therefore as part
/// of a file name): non-empty ASCII alphanumerics, `-`, and `_`.
pub fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty()
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Flatten resource metadata into the string map stored with each chunk.
///
/// Reserved keys (`hash`, `filename`, `display_name`, `embedding_model`)
/// always reflect the pipeline's values. When the resource carries no
/// metadata, `display_name` falls back to the file name.
pub fn chunk_metadata(
    hash: &str,
    filename: &str,
    metadata: Option<&ResourceMetadata>,
    embedding_model: &str,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(meta) = metadata {
        for (k, v) in &meta.extra {
            if !RESERVED_KEYS.contains(&k.as_str()) {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    out.insert("hash".to_string(), hash.to_string());
    out.insert("filename".to_string(), filename.to_string());
    out.insert(
        "display_name".to_string(),
        metadata
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| filename.to_string()),
    );
    out.insert("embedding_model".to_string(), embedding_model.to_string());
    out
}

// ============ Concrete resources ============

/// Plain text, markdown, or HTML content whose identity is its text.
#[derive(Debug, Clone)]
pub struct TextResource {
    hash: String,
    kind: ContentKind,
    text: String,
    metadata: Option<ResourceMetadata>,
}

impl TextResource {
    /// Create a resource hashed from its text alone.
    pub fn new(kind: ContentKind, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            hash: content_hash(&[text.as_bytes()]),
            kind,
            text,
            metadata: None,
        }
    }

    /// Create a resource whose hash also covers a source identity such as
    /// a relative path, so equal bytes from two sources stay distinct.
    pub fn from_source(kind: ContentKind, source_id: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            hash: content_hash(&[source_id.as_bytes(), text.as_bytes()]),
            kind,
            text,
            metadata: None,
        }
    }

    /// Use a collector-assigned hash instead of the computed one.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_metadata(mut self, metadata: ResourceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Resource for TextResource {
    fn hash(&self) -> &str {
        &self.hash
    }
    fn kind(&self) -> ContentKind {
        self.kind
    }
    fn content(&self) -> &[u8] {
        self.text.as_bytes()
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        self.metadata.as_ref()
    }
}

/// A scraped web page. Identity covers the URL and the page text.
#[derive(Debug, Clone)]
pub struct WebPage {
    hash: String,
    body: String,
    metadata: ResourceMetadata,
}

impl WebPage {
    pub fn new(url: &str, title: Option<&str>, body: impl Into<String>) -> Self {
        let body = body.into();
        let display = title.unwrap_or(url);
        Self {
            hash: content_hash(&[url.as_bytes(), body.as_bytes()]),
            body,
            metadata: ResourceMetadata::new(display).with_extra("url", url),
        }
    }
}

impl Resource for WebPage {
    fn hash(&self) -> &str {
        &self.hash
    }
    fn kind(&self) -> ContentKind {
        ContentKind::Html
    }
    fn content(&self) -> &[u8] {
        self.body.as_bytes()
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        Some(&self.metadata)
    }
}

/// An issue-tracker ticket rendered as text.
///
/// Structured ticket fields (status, priority, numeric ids) become string
/// extras; the ticket id plus rendered text form the identity.
#[derive(Debug, Clone)]
pub struct Ticket {
    hash: String,
    rendered: String,
    metadata: ResourceMetadata,
}

impl Ticket {
    pub fn new(
        ticket_id: &str,
        title: &str,
        body: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let rendered = format!("{}\n\n{}", title, body);
        let metadata =
            ResourceMetadata::from_json_fields(title, fields).with_extra("ticket_id", ticket_id);
        Self {
            hash: content_hash(&[ticket_id.as_bytes(), rendered.as_bytes()]),
            rendered,
            metadata,
        }
    }
}

impl Resource for Ticket {
    fn hash(&self) -> &str {
        &self.hash
    }
    fn kind(&self) -> ContentKind {
        ContentKind::Ticket
    }
    fn content(&self) -> &[u8] {
        self.rendered.as_bytes()
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        Some(&self.metadata)
    }
}

/// Binary image content. Indexed by its display name.
#[derive(Debug, Clone)]
pub struct ImageResource {
    hash: String,
    format: ImageFormat,
    bytes: Vec<u8>,
    metadata: ResourceMetadata,
}

impl ImageResource {
    pub fn new(format: ImageFormat, bytes: Vec<u8>, display_name: impl Into<String>) -> Self {
        Self {
            hash: content_hash(&[bytes.as_slice()]),
            format,
            bytes,
            metadata: ResourceMetadata::new(display_name),
        }
    }

    /// Use a collector-assigned hash, e.g. one covering the source path.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_metadata(mut self, metadata: ResourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl Resource for ImageResource {
    fn hash(&self) -> &str {
        &self.hash
    }
    fn kind(&self) -> ContentKind {
        ContentKind::Image(self.format)
    }
    fn content(&self) -> &[u8] {
        &self.bytes
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        Some(&self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_same_hash() {
        let a = TextResource::new(ContentKind::Text, "hello");
        let b = TextResource::new(ContentKind::Text, "hello");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_changed_content_changes_hash() {
        let a = TextResource::new(ContentKind::Text, "hello");
        let b = TextResource::new(ContentKind::Text, "hello!");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_source_identity_separates_equal_content() {
        let a = TextResource::from_source(ContentKind::Markdown, "a.md", "same");
        let b = TextResource::from_source(ContentKind::Markdown, "b.md", "same");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_content_hash_part_boundaries() {
        assert_ne!(
            content_hash(&["ab".as_bytes(), "c".as_bytes()]),
            content_hash(&["a".as_bytes(), "bc".as_bytes()])
        );
    }

    #[test]
    fn test_filename_from_kind() {
        let r = TextResource::new(ContentKind::Markdown, "# hi").with_hash("h1");
        assert_eq!(r.filename(), "h1.md");
        let t = TextResource::new(ContentKind::Ticket, "x").with_hash("t1");
        assert_eq!(t.filename(), "t1.txt");
        let img = ImageResource::new(ImageFormat::Jpeg, vec![1, 2, 3], "cat");
        assert!(img.filename().ends_with(".jpg"));
    }

    #[test]
    fn test_kind_parse_and_display() {
        for s in ["text", "markdown", "html", "ticket", "image/png", "image/webp"] {
            let kind: ContentKind = s.parse().unwrap();
            assert_eq!(kind.to_string(), s);
        }
        assert!("pdf".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(ContentKind::from_filename("x.MD"), Some(ContentKind::Markdown));
        assert_eq!(
            ContentKind::from_filename("x.jpeg"),
            Some(ContentKind::Image(ImageFormat::Jpeg))
        );
        assert_eq!(ContentKind::from_filename("x.exe"), None);
        assert_eq!(ContentKind::from_filename("noext"), None);
    }

    #[test]
    fn test_json_fields_coerced_to_strings() {
        let fields = serde_json::json!({
            "priority": 3,
            "open": true,
            "ratio": 0.5,
            "labels": ["a", "b"],
            "assignee": null,
            "status": "new"
        });
        let meta = ResourceMetadata::from_json_fields("T-1", fields.as_object().unwrap());
        assert_eq!(meta.extra["priority"], "3");
        assert_eq!(meta.extra["open"], "true");
        assert_eq!(meta.extra["ratio"], "0.5");
        assert_eq!(meta.extra["labels"], r#"["a","b"]"#);
        assert_eq!(meta.extra["status"], "new");
        assert!(!meta.extra.contains_key("assignee"));
    }

    #[test]
    fn test_ticket_fields_become_extras() {
        let fields = serde_json::json!({"status": "open", "number": 42});
        let t = Ticket::new(
            "T-42",
            "Broken coil",
            "The coil is broken.",
            fields.as_object().unwrap(),
        );
        let meta = t.metadata().unwrap();
        assert_eq!(meta.display_name, "Broken coil");
        assert_eq!(meta.extra["number"], "42");
        assert_eq!(meta.extra["ticket_id"], "T-42");
        assert_eq!(t.content(), b"Broken coil\n\nThe coil is broken.");
    }

    #[test]
    fn test_web_page_carries_url() {
        let p = WebPage::new("https://example.org/a", Some("A"), "<p>a</p>");
        assert_eq!(p.metadata().unwrap().extra["url"], "https://example.org/a");
        assert_eq!(p.kind(), ContentKind::Html);
    }

    #[test]
    fn test_valid_hash() {
        assert!(is_valid_hash("abc-123_X"));
        assert!(!is_valid_hash(""));
        assert!(!is_valid_hash("../etc"));
        assert!(!is_valid_hash("a b"));
    }

    #[test]
    fn test_chunk_metadata_reserved_keys_win() {
        let meta = ResourceMetadata::new("Doc")
            .with_extra("hash", "spoofed")
            .with_extra("url", "https://x");
        let flat = chunk_metadata("h1", "h1.md", Some(&meta), "hashing-256");
        assert_eq!(flat["hash"], "h1");
        assert_eq!(flat["display_name"], "Doc");
        assert_eq!(flat["url"], "https://x");
        assert_eq!(flat["embedding_model"], "hashing-256");
    }

    #[test]
    fn test_chunk_metadata_without_metadata() {
        let flat = chunk_metadata("h1", "h1.txt", None, "m");
        assert_eq!(flat["display_name"], "h1.txt");
        assert_eq!(flat.len(), 4);
    }
}
