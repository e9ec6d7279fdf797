//! Reading chunk files produced by the chunker.
//!
//! Each `*.jsonl` file holds one JSON object per line:
//!
//! ```json
//! {"id": "KSC_15.1:5022:0", "text": "...", "meta": {"product": "KSC", "version": "15.1",
//!  "url": "https://...", "h1": "...", "h2": null, "sha256": "..."}}
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::types::Chunk;

/// Lists `*.jsonl` files in `dir`, sorted by name. A missing directory yields nothing.
///
/// # Errors
/// [`RagError::Persistence`] if the directory exists but cannot be read.
pub fn list_chunk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RagError::persistence(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| RagError::persistence(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses one chunk file, skipping blank lines and normalizing metadata.
///
/// # Errors
/// [`RagError::MalformedChunk`] naming the first bad line.
pub fn read_chunk_file(path: &Path) -> Result<Vec<Chunk>> {
    let file = File::open(path).map_err(|e| RagError::persistence(path, e))?;
    let mut chunks = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RagError::persistence(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut chunk: Chunk =
            serde_json::from_str(&line).map_err(|e| RagError::MalformedChunk {
                path: path.to_path_buf(),
                line: idx + 1,
                message: e.to_string(),
            })?;
        chunk.meta = chunk.meta.normalized();
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Reads every chunk file in `dir` in file-name order.
///
/// # Errors
/// See [`list_chunk_files`] and [`read_chunk_file`].
pub fn load_chunks(dir: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for path in list_chunk_files(dir)? {
        let before = chunks.len();
        chunks.extend(read_chunk_file(&path)?);
        tracing::debug!(file = %path.display(), chunks = chunks.len() - before, "read chunk file");
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const LINE_A: &str = r#"{"id": "KSC_15.1:1:0", "text": "alpha", "meta": {"product": "KSC", "url": "https://docs.example/1", "h1": "Intro", "h2": ""}}"#;
    const LINE_B: &str = r#"{"id": "KATA_7.1:9:0", "text": "beta", "meta": {"product": "KATA"}}"#;

    #[test]
    fn reads_sorted_files_and_skips_blank_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.jsonl"), format!("{LINE_B}\n")).unwrap();
        fs::write(dir.path().join("a.jsonl"), format!("\n{LINE_A}\n   \n")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let chunks = load_chunks(dir.path()).unwrap();
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["KSC_15.1:1:0", "KATA_7.1:9:0"]);
        assert_eq!(chunks[0].meta.h2, None);
        assert_eq!(chunks[0].url(), Some("https://docs.example/1"));
    }

    #[test]
    fn malformed_line_names_file_and_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, format!("{LINE_A}\n\n{{not json\n")).unwrap();

        match read_chunk_file(&path) {
            Err(RagError::MalformedChunk { path: p, line, .. }) => {
                assert_eq!(p, path);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_directory_has_no_chunks() {
        let dir = tempdir().unwrap();
        assert!(load_chunks(&dir.path().join("absent")).unwrap().is_empty());
    }
}
