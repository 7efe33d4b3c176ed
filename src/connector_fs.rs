//! Filesystem scanner for knowledge-base source files.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;
use crate::models::SourceFile;

/// Walk `docs_root` and load every file matching the include globs.
///
/// Files that cannot be read as UTF-8 are logged and skipped. The result is
/// sorted by relative path so index builds are deterministic.
pub fn scan_docs(config: &KnowledgeConfig) -> Result<Vec<SourceFile>> {
    let root = &config.docs_root;
    if !root.is_dir() {
        bail!("Knowledge base directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match load_file(path, &rel_str) {
            Ok(file) => {
                info!(path = %rel_str, "loaded knowledge file");
                files.push(file);
            }
            Err(e) => warn!(path = %rel_str, error = %e, "failed to load knowledge file"),
        }
    }

    files.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok(files)
}

fn load_file(path: &Path, relative_path: &str) -> Result<SourceFile> {
    let modified = std::fs::metadata(path)?
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let body = std::fs::read_to_string(path)?;

    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("file has no name: {}", path.display()))?;

    Ok(SourceFile {
        source_id: relative_path.to_string(),
        title,
        modified_at: DateTime::<Utc>::from(modified),
        body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
