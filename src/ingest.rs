//! Knowledge index build: scan → chunk → embed → store.
//!
//! The index is written to a sibling `*.building` file and renamed over the
//! configured path only once every chunk has been embedded, so a failed or
//! interrupted build never leaves a half-written knowledge base behind for
//! the server to query.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::{Config, KnowledgeConfig};
use crate::connector_fs;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::migrate;
use crate::models::{Chunk, Document, SourceFile};

/// Counts reported after a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
    pub db_path: PathBuf,
}

/// Build the knowledge index described by `config` with `embedder`.
pub async fn build_index(
    config: &KnowledgeConfig,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<IndexReport> {
    let files = connector_fs::scan_docs(config)?;
    let files: Vec<SourceFile> = files
        .into_iter()
        .filter(|f| !f.body.trim().is_empty())
        .collect();
    if files.is_empty() {
        bail!(
            "No knowledge base documents found in {}. Cannot build the knowledge index.",
            config.docs_root.display()
        );
    }

    let mut documents = Vec::with_capacity(files.len());
    let mut chunks: Vec<Chunk> = Vec::new();
    for file in &files {
        let doc = normalize(file);
        chunks.extend(chunk_text(
            &doc.id,
            &doc.body,
            config.chunk_chars,
            config.overlap_chars,
        ));
        documents.push(doc);
    }
    info!(documents = documents.len(), chunks = chunks.len(), "processed knowledge chunks");

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder
            .embed(&texts)
            .await
            .context("Failed to embed knowledge chunks")?;
        if embedded.len() != texts.len() {
            bail!(
                "Embedding provider returned {} vectors for {} chunks",
                embedded.len(),
                texts.len()
            );
        }
        vectors.extend(embedded);
    }

    let staging = staging_path(&config.db_path);
    if staging.exists() {
        std::fs::remove_file(&staging)?;
    }
    write_index(&staging, embedder, &documents, &chunks, &vectors).await?;
    std::fs::rename(&staging, &config.db_path).with_context(|| {
        format!(
            "Failed to move knowledge index into place at {}",
            config.db_path.display()
        )
    })?;

    info!(path = %config.db_path.display(), "knowledge index saved");
    Ok(IndexReport {
        documents: documents.len(),
        chunks: chunks.len(),
        db_path: config.db_path.clone(),
    })
}

/// `concierge index`: build the index with the configured embedder and
/// print a summary.
pub async fn run_index(config: &Config, batch_size: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Building the knowledge index requires embeddings. Set [embedding] provider in config.");
    }
    let embedder = embedding::create_provider(&config.embedding)?;
    let batch_size = batch_size.unwrap_or(config.embedding.batch_size);

    let report = build_index(&config.knowledge, embedder.as_ref(), batch_size).await?;

    println!("Knowledge index built");
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  model: {} ({} dims)", embedder.model_name(), embedder.dims());
    println!("  path: {}", report.db_path.display());
    Ok(())
}

fn normalize(file: &SourceFile) -> Document {
    let mut hasher = Sha256::new();
    hasher.update(file.body.as_bytes());

    Document {
        id: Uuid::new_v4().to_string(),
        source_id: file.source_id.clone(),
        title: file.title.clone(),
        updated_at: file.modified_at.timestamp(),
        body: file.body.clone(),
        content_hash: format!("{:x}", hasher.finalize()),
    }
}

fn staging_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".building");
    PathBuf::from(name)
}

async fn write_index(
    path: &Path,
    embedder: &dyn EmbeddingProvider,
    documents: &[Document],
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<()> {
    let pool = db::connect(path).await?;
    migrate::run_migrations(&pool).await?;

    let mut tx = pool.begin().await?;

    for doc in documents {
        sqlx::query(
            "INSERT INTO documents (id, source_id, title, updated_at, body, content_hash) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(doc.updated_at)
        .bind(&doc.body)
        .bind(&doc.content_hash)
        .execute(&mut *tx)
        .await?;
    }

    for (chunk, vector) in chunks.iter().zip(vectors) {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, document_id, embedding) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
    }

    for (key, value) in [
        ("embedding_model", embedder.model_name().to_string()),
        ("embedding_dims", embedder.dims().to_string()),
        ("built_at", chrono::Utc::now().to_rfc3339()),
    ] {
        sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    pool.close().await;
    Ok(())
}
