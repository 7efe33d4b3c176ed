//! `concierge search`: query the knowledge index from the command line.
//!
//! Runs the same retrieval the chat fallback uses, so an operator can check
//! which passages a question would be answered from.

use anyhow::Result;

use crate::config::Config;
use crate::embedding;
use crate::knowledge::{KnowledgeStore, SqliteKnowledgeStore};

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.knowledge.db_path.is_file() {
        println!(
            "Knowledge base not found at {}. Run `concierge index` first.",
            config.knowledge.db_path.display()
        );
        return Ok(());
    }

    let embedder = embedding::create_provider(&config.embedding)?;
    let store = SqliteKnowledgeStore::new(config.knowledge.db_path.clone(), embedder);
    let passages = store
        .search(query, k.unwrap_or(config.knowledge.top_k))
        .await?;

    if passages.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, passage) in passages.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, passage.score, passage.source);
        println!(
            "    excerpt: \"{}\"",
            excerpt(&passage.text, 240).replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_short_text_unchanged() {
        assert_eq!(excerpt("hello", 10), "hello");
    }

    #[test]
    fn test_excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("héllo wörld", 4), "héll…");
    }
}
