//! `ragsync search`: top-k retrieval from the command line.

use anyhow::{bail, Result};
use ragsync_core::search::SearchResponse;

use crate::config::Config;
use crate::coordinator::Coordinator;

const EXCERPT_CHARS: usize = 240;

/// Hybrid override from `--hybrid` / `--semantic`. `None` keeps the
/// configured mode.
pub fn mode_override(hybrid: bool, semantic: bool) -> Option<bool> {
    match (hybrid, semantic) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    hybrid: Option<bool>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let k = k.unwrap_or(config.retrieval.k);
    if k == 0 {
        bail!("--k must be >= 1");
    }

    let coordinator = Coordinator::from_config(config).await?;
    let response = coordinator.search(query, k, hybrid).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &SearchResponse) {
    if response.hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in response.hits.iter().enumerate() {
        let name = hit.chunk.display_name().unwrap_or("(untitled)");
        println!("{}. [{:.3}] {}", i + 1, hit.score, name);
        println!("    distance: {:.4}", hit.distance);
        if let Some(lexical) = hit.lexical_score {
            println!(
                "    semantic: {:.3}  bm25: {:.3}",
                hit.semantic_score, lexical
            );
        }
        if let Some(url) = hit.chunk.url() {
            println!("    url: {}", url);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, EXCERPT_CHARS));
        println!("    chunk: {}", hit.chunk.id);
        println!();
    }

    match &response.source_link {
        Some(link) if response.include_source_link => println!("Source: {}", link),
        _ => println!("Source: (below similarity threshold)"),
    }
}

/// Single-line excerpt of at most `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_override() {
        assert_eq!(mode_override(false, false), None);
        assert_eq!(mode_override(true, false), Some(true));
        assert_eq!(mode_override(false, true), Some(false));
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n\nb   c", 100), "a b c");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
