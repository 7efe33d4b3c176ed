//! Knowledge-base data types.
//!
//! These flow through the indexing pipeline (file → document → chunks) and
//! back out of retrieval as [`Passage`]s. Conversation types live in
//! [`crate::session`].

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A text file discovered under the knowledge-base root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the docs root, used as the stable source identifier.
    pub source_id: String,
    pub title: String,
    pub modified_at: DateTime<Utc>,
    pub body: String,
}

/// Normalized document stored in the knowledge database.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub updated_at: i64,
    pub body: String,
    pub content_hash: String,
}

/// A window of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A retrieved context passage, ordered by descending similarity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Passage {
    pub text: String,
    /// Source identifier of the document the passage came from.
    pub source: String,
    pub score: f64,
}
