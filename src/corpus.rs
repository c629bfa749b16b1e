//! Chunk files feeding the lexical index: a JSON array, or JSON Lines.

use crate::types::Chunk;
use crate::Result;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let raw = fs::read_to_string(path)?;
    let parsed = parse_chunks(&raw)?;
    let total = parsed.len();

    let chunks: Vec<Chunk> = parsed
        .into_iter()
        .enumerate()
        .filter_map(|(line, chunk)| {
            if chunk.content.trim().is_empty() {
                warn!("[CORPUS] Skipping entry {} with empty content", line);
                None
            } else {
                Some(chunk)
            }
        })
        .collect();

    info!(
        "[CORPUS] Loaded {} chunks from {} ({} skipped)",
        chunks.len(),
        path.display(),
        total - chunks.len()
    );
    Ok(chunks)
}

fn parse_chunks(raw: &str) -> Result<Vec<Chunk>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }

    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}
