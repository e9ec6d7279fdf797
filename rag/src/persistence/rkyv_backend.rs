//! rkyv-based binary layout of the `chunks.index` artifact.

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{from_bytes, to_bytes};

use crate::error::{RagError, Result};
use crate::index::AnnIndex;

/// `DOCQAIDX` in ASCII.
const MAGIC: u64 = 0x444F_4351_4149_4458;
const FORMAT_VERSION: u32 = 1;

/// Header, build parameters and flattened vectors of an index.
#[derive(Debug, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub(crate) struct IndexArtifact {
    magic: u64,
    format_version: u32,
    pub(crate) m: u64,
    pub(crate) ef_construction: u64,
    pub(crate) seed: u64,
    pub(crate) dimension: u64,
    pub(crate) count: u64,
    /// xxh3 of the `meta.json` bytes written alongside.
    pub(crate) meta_digest: u64,
    pub(crate) vectors: Vec<f32>,
}

impl IndexArtifact {
    pub(crate) fn from_index(index: &AnnIndex, meta_digest: u64) -> Self {
        let params = index.params();
        Self {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            m: params.m as u64,
            ef_construction: params.ef_construction as u64,
            seed: index.seed(),
            dimension: index.dimension() as u64,
            count: index.len() as u64,
            meta_digest,
            vectors: index.vectors().iter().flatten().copied().collect(),
        }
    }

    /// Splits the flat vector buffer back into rows.
    pub(crate) fn rows(&self) -> Result<Vec<Vec<f32>>> {
        let count = to_usize(self.count, "count")?;
        let dimension = to_usize(self.dimension, "dimension")?;
        if count == 0 {
            return Ok(Vec::new());
        }
        if dimension == 0 || self.vectors.len() != count.saturating_mul(dimension) {
            return Err(RagError::IndexIntegrity(format!(
                "{} floats cannot hold {count} vectors of width {dimension}",
                self.vectors.len()
            )));
        }
        Ok(self
            .vectors
            .chunks_exact(dimension)
            .map(<[f32]>::to_vec)
            .collect())
    }
}

pub(crate) fn to_usize(value: u64, field: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| RagError::IndexIntegrity(format!("{field} {value} does not fit this platform")))
}

pub(crate) fn encode(artifact: &IndexArtifact) -> Result<Vec<u8>> {
    let bytes =
        to_bytes::<RkyvError>(artifact).map_err(|e| RagError::Serialization(e.to_string()))?;
    Ok(bytes.to_vec())
}

pub(crate) fn decode(bytes: &[u8]) -> Result<IndexArtifact> {
    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    let artifact = from_bytes::<IndexArtifact, RkyvError>(&aligned)
        .map_err(|e| RagError::IndexIntegrity(format!("corrupt index artifact: {e}")))?;
    if artifact.magic != MAGIC {
        return Err(RagError::IndexIntegrity("not a docqa index artifact".into()));
    }
    if artifact.format_version != FORMAT_VERSION {
        return Err(RagError::IndexIntegrity(format!(
            "unsupported index format version {}",
            artifact.format_version
        )));
    }
    Ok(artifact)
}
