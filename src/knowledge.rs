//! Knowledge store: top-k semantic retrieval over the indexed documents.
//!
//! [`KnowledgeStore`] is the seam the conversation controller depends on.
//! Two implementations ship:
//!
//! - [`SqliteKnowledgeStore`] reads the database written by `concierge index`.
//!   The file is reopened on every query, so rebuilding the index while the
//!   server runs takes effect on the next message.
//! - [`InMemoryKnowledgeStore`] keeps vectors in memory; used by tests and
//!   setups that load passages programmatically.
//!
//! Both rank by brute-force cosine similarity.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::Passage;

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Whether an index exists to query. When false the caller must not
    /// attempt [`search`](KnowledgeStore::search).
    async fn is_built(&self) -> bool;

    /// The `k` passages most similar to `query`, by descending similarity.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
}

/// Sort by descending score and keep the best `k`.
fn rank(mut passages: Vec<Passage>, k: usize) -> Vec<Passage> {
    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    passages.truncate(k);
    passages
}

// ============ SQLite-backed store ============

pub struct SqliteKnowledgeStore {
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteKnowledgeStore {
    pub fn new(path: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            path: path.into(),
            embedder,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn is_built(&self) -> bool {
        self.path.is_file()
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let pool = db::connect_read_only(&self.path).await?;

        let built_with: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_model'")
                .fetch_optional(&pool)
                .await?;
        if let Some(model) = built_with.as_deref() {
            if model != self.embedder.model_name() {
                bail!(
                    "Knowledge index was built with embedding model '{}' but queries use '{}'; rebuild the index with `concierge index`",
                    model,
                    self.embedder.model_name()
                );
            }
        }

        let query_vec = embedding::embed_query(self.embedder.as_ref(), query)
            .await
            .context("Failed to embed query")?;

        let built_dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_dims'")
                .fetch_optional(&pool)
                .await?;
        if let Some(dims) = built_dims.as_deref() {
            let dims: usize = dims
                .parse()
                .with_context(|| format!("Invalid embedding_dims in index: {}", dims))?;
            if dims != query_vec.len() {
                bail!(
                    "Knowledge index has {} embedding dimensions but the query embedding has {}; rebuild the index with `concierge index`",
                    dims,
                    query_vec.len()
                );
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT c.text, d.source_id, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            "#,
        )
        .fetch_all(&pool)
        .await?;
        pool.close().await;

        let passages = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                if vec.len() != query_vec.len() {
                    bail!(
                        "Stored vector has {} dimensions, expected {}; rebuild the index with `concierge index`",
                        vec.len(),
                        query_vec.len()
                    );
                }
                Ok(Passage {
                    text: row.get("text"),
                    source: row.get("source_id"),
                    score: embedding::cosine_similarity(&query_vec, &vec) as f64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let ranked = rank(passages, k);
        debug!(k, hits = ranked.len(), "knowledge search");
        Ok(ranked)
    }
}

// ============ In-memory store ============

struct StoredPassage {
    text: String,
    source: String,
    vector: Vec<f32>,
}

pub struct InMemoryKnowledgeStore {
    embedder: Arc<dyn EmbeddingProvider>,
    passages: RwLock<Vec<StoredPassage>>,
}

impl InMemoryKnowledgeStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            passages: RwLock::new(Vec::new()),
        }
    }

    /// Embed `texts` and add them under `source`.
    pub async fn add_texts(&self, source: &str, texts: &[String]) -> Result<()> {
        let vectors = self.embedder.embed(texts).await?;
        let mut stored = self
            .passages
            .write()
            .map_err(|_| anyhow!("knowledge store lock poisoned"))?;
        for (text, vector) in texts.iter().zip(vectors) {
            stored.push(StoredPassage {
                text: text.clone(),
                source: source.to_string(),
                vector,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passages.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn is_built(&self) -> bool {
        !self.is_empty()
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;
        let stored = self
            .passages
            .read()
            .map_err(|_| anyhow!("knowledge store lock poisoned"))?;
        let passages = stored
            .iter()
            .map(|sp| Passage {
                text: sp.text.clone(),
                source: sp.source.clone(),
                score: embedding::cosine_similarity(&query_vec, &sp.vector) as f64,
            })
            .collect();
        Ok(rank(passages, k))
    }
}
