//! On-disk index artifacts.
//!
//! An index is stored as two co-located files in one directory:
//!
//! - [`INDEX_FILE`]: rkyv header, build parameters, graph seed and the vectors, plus an
//!   xxh3 digest of the metadata file
//! - [`META_FILE`]: the chunk list as JSON, in slot order
//!
//! Both files are first written in full under a `.pending` name and then renamed over the
//! live ones, metadata first. The live pair therefore never disappears once written, and the
//! digest in [`INDEX_FILE`] names the metadata it was built with. A reader that lands
//! between the two renames sees a digest mismatch and reads again. A save interrupted after
//! the first rename leaves the matching index pending, and [`load`] picks it up from there.

mod rkyv_backend;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{RagError, Result};
use crate::index::{AnnIndex, HnswParams};
use crate::types::Chunk;

use rkyv_backend::{IndexArtifact, to_usize};

/// Binary index artifact name.
pub const INDEX_FILE: &str = "chunks.index";
/// Metadata artifact name.
pub const META_FILE: &str = "meta.json";

const PENDING_SUFFIX: &str = ".pending";
const LOAD_ATTEMPTS: u32 = 4;
const RETRY_DELAY: Duration = Duration::from_millis(25);

/// Returns `true` when both artifacts are present in `dir`.
#[must_use]
pub fn artifacts_exist(dir: &Path) -> bool {
    dir.join(INDEX_FILE).is_file() && dir.join(META_FILE).is_file()
}

/// Writes `index` to `dir`, replacing any previous artifacts.
///
/// Each live file is replaced by a single rename, so concurrent readers always find both
/// artifacts and [`load`] only accepts a pair whose digests agree.
///
/// # Errors
/// [`RagError::Persistence`] on filesystem failures, [`RagError::Serialization`] if
/// encoding fails.
pub fn save(index: &AnnIndex, dir: &Path) -> Result<()> {
    let meta_bytes =
        serde_json::to_vec(index.chunks()).map_err(|e| RagError::Serialization(e.to_string()))?;
    let artifact = IndexArtifact::from_index(index, xxh3_64(&meta_bytes));
    let index_bytes = rkyv_backend::encode(&artifact)?;

    fs::create_dir_all(dir).map_err(|e| RagError::persistence(dir, e))?;
    let index_pending = pending(dir, INDEX_FILE);
    let meta_pending = pending(dir, META_FILE);
    write_synced(&index_pending, &index_bytes)?;
    write_synced(&meta_pending, &meta_bytes)?;

    publish(&meta_pending, &dir.join(META_FILE))?;
    publish(&index_pending, &dir.join(INDEX_FILE))?;

    tracing::info!(
        dir = %dir.display(),
        chunks = index.len(),
        dimension = index.dimension(),
        "saved index"
    );
    Ok(())
}

/// Loads the index in `dir` and sets its query-time `ef_search`.
///
/// A pair whose digests disagree is read again a few times before giving up, which covers
/// a concurrent [`save`] swapping the files.
///
/// # Errors
/// - [`RagError::NotFound`] if either artifact is missing
/// - [`RagError::IndexIntegrity`] if an artifact is corrupt, the pair does not match, or
///   vector and metadata counts differ
pub fn load(dir: &Path, ef_search: usize) -> Result<AnnIndex> {
    let meta_path = dir.join(META_FILE);
    let has_index = dir.join(INDEX_FILE).is_file() || pending(dir, INDEX_FILE).is_file();
    if !has_index || !meta_path.is_file() {
        return Err(RagError::NotFound(format!(
            "index artifacts missing in {}",
            dir.display()
        )));
    }

    let mut attempt = 1;
    let (artifact, meta_bytes) = loop {
        match read_pair(dir) {
            Ok(pair) => break pair,
            Err(RagError::IndexIntegrity(reason)) if attempt < LOAD_ATTEMPTS => {
                tracing::debug!(attempt, %reason, "index artifacts inconsistent, reading again");
                attempt += 1;
                std::thread::sleep(RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    };

    let chunks: Vec<Chunk> = serde_json::from_slice(&meta_bytes)
        .map_err(|e| RagError::IndexIntegrity(format!("corrupt {META_FILE}: {e}")))?;
    let count = to_usize(artifact.count, "count")?;
    if chunks.len() != count {
        return Err(RagError::IndexIntegrity(format!(
            "{count} vectors but {} metadata records",
            chunks.len()
        )));
    }

    let params = HnswParams {
        m: to_usize(artifact.m, "m")?,
        ef_construction: to_usize(artifact.ef_construction, "ef_construction")?,
        ef_search,
    };
    let index = AnnIndex::from_parts(artifact.rows()?, chunks, params, artifact.seed)?;
    tracing::info!(
        dir = %dir.display(),
        chunks = index.len(),
        dimension = index.dimension(),
        ef_search,
        "loaded index"
    );
    Ok(index)
}

/// Reads `meta.json` and the index artifact that was built with it.
fn read_pair(dir: &Path) -> Result<(IndexArtifact, Vec<u8>)> {
    let meta_path = dir.join(META_FILE);
    let meta_bytes = read_if_present(&meta_path)?.ok_or_else(|| {
        RagError::NotFound(format!("{} disappeared while loading", meta_path.display()))
    })?;
    let digest = xxh3_64(&meta_bytes);

    if let Some(bytes) = read_if_present(&dir.join(INDEX_FILE))? {
        let artifact = rkyv_backend::decode(&bytes)?;
        if artifact.meta_digest == digest {
            return Ok((artifact, meta_bytes));
        }
    }

    let pending_path = pending(dir, INDEX_FILE);
    if let Some(artifact) = read_if_present(&pending_path)?
        .and_then(|bytes| rkyv_backend::decode(&bytes).ok())
        .filter(|artifact| artifact.meta_digest == digest)
    {
        tracing::warn!(
            path = %pending_path.display(),
            "using index from an unfinished save"
        );
        return Ok((artifact, meta_bytes));
    }

    Err(RagError::IndexIntegrity(format!(
        "{META_FILE} does not belong to {INDEX_FILE} in {}",
        dir.display()
    )))
}

fn pending(dir: &Path, file: &str) -> PathBuf {
    dir.join(format!("{file}{PENDING_SUFFIX}"))
}

fn publish(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| RagError::persistence(to, e))
}

fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RagError::persistence(path, e)),
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| RagError::persistence(path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| RagError::persistence(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMeta;
    use tempfile::tempdir;

    fn sample() -> AnnIndex {
        let meta = ChunkMeta {
            product: Some("KSC".into()),
            url: Some("https://docs.example/ksc/1".into()),
            ..ChunkMeta::default()
        };
        AnnIndex::build(
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            vec![
                Chunk::with_meta("a", "alpha", meta.clone()),
                Chunk::with_meta("b", "beta", meta),
                Chunk::new("c", "gamma"),
            ],
            HnswParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        let index = sample();

        save(&index, &index_dir).unwrap();
        assert!(artifacts_exist(&index_dir));
        assert!(!pending(&index_dir, INDEX_FILE).exists());
        assert!(!pending(&index_dir, META_FILE).exists());

        let loaded = load(&index_dir, 16).unwrap();
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(loaded.vectors(), index.vectors());
        assert_eq!(loaded.params().ef_search, 16);
        assert_eq!(loaded.params().m, 32);

        let query = [0.0, 1.0, 0.0];
        assert_eq!(
            loaded.search(&query, 3).unwrap(),
            index.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn save_replaces_previous_artifacts() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        save(&sample(), &index_dir).unwrap();

        let smaller = AnnIndex::build(
            vec![vec![1.0, 0.0]],
            vec![Chunk::new("only", "one")],
            HnswParams::default(),
        )
        .unwrap();
        save(&smaller, &index_dir).unwrap();

        let loaded = load(&index_dir, 64).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!pending(&index_dir, INDEX_FILE).exists());
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempdir().unwrap();
        assert!(load(dir.path(), 64).unwrap_err().is_not_found());

        let index_dir = dir.path().join("index");
        save(&sample(), &index_dir).unwrap();
        fs::remove_file(index_dir.join(META_FILE)).unwrap();
        assert!(load(&index_dir, 64).unwrap_err().is_not_found());
    }

    #[test]
    fn foreign_metadata_is_an_integrity_error() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        save(&sample(), &index_dir).unwrap();

        let truncated = serde_json::to_vec(&sample().chunks()[..2]).unwrap();
        fs::write(index_dir.join(META_FILE), truncated).unwrap();
        assert!(matches!(
            load(&index_dir, 64),
            Err(RagError::IndexIntegrity(_))
        ));
    }

    #[test]
    fn corrupt_index_file_is_an_integrity_error() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        save(&sample(), &index_dir).unwrap();
        fs::write(index_dir.join(INDEX_FILE), b"\0\0\0garbage").unwrap();
        assert!(matches!(
            load(&index_dir, 64),
            Err(RagError::IndexIntegrity(_))
        ));
    }

    fn single() -> AnnIndex {
        AnnIndex::build(
            vec![vec![1.0, 0.0, 0.0]],
            vec![Chunk::new("only", "one")],
            HnswParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn save_interrupted_between_renames_still_loads() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        save(&sample(), &index_dir).unwrap();

        // Artifacts of the next save, as if it stopped after publishing the metadata.
        let next_dir = dir.path().join("next");
        save(&single(), &next_dir).unwrap();
        fs::copy(next_dir.join(META_FILE), index_dir.join(META_FILE)).unwrap();
        fs::copy(next_dir.join(INDEX_FILE), pending(&index_dir, INDEX_FILE)).unwrap();

        let loaded = load(&index_dir, 64).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.chunks()[0].id, "only");
    }

    #[test]
    fn first_save_interrupted_between_renames_still_loads() {
        let dir = tempdir().unwrap();
        let next_dir = dir.path().join("next");
        save(&single(), &next_dir).unwrap();

        let index_dir = dir.path().join("index");
        fs::create_dir_all(&index_dir).unwrap();
        fs::copy(next_dir.join(META_FILE), index_dir.join(META_FILE)).unwrap();
        fs::copy(next_dir.join(INDEX_FILE), pending(&index_dir, INDEX_FILE)).unwrap();

        assert_eq!(load(&index_dir, 64).unwrap().len(), 1);
    }

    #[test]
    fn readers_never_miss_artifacts_during_resave() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        save(&sample(), &index_dir).unwrap();

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for round in 0..40 {
                    let index = if round % 2 == 0 { single() } else { sample() };
                    save(&index, &index_dir).unwrap();
                }
            });
            while !writer.is_finished() {
                match load(&index_dir, 64) {
                    Ok(index) => assert!(matches!(index.len(), 1 | 3)),
                    Err(err) => assert!(!err.is_not_found(), "{err}"),
                }
            }
        });
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("index");
        let empty = AnnIndex::build(Vec::new(), Vec::new(), HnswParams::default()).unwrap();
        save(&empty, &index_dir).unwrap();
        let loaded = load(&index_dir, 64).unwrap();
        assert!(loaded.is_empty());
    }
}
