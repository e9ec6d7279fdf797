//! Approximate nearest-neighbor index.
//!
//! [`AnnIndex`] is an HNSW graph over unit vectors with one [`Chunk`](crate::Chunk) per
//! slot. Searching never dereferences metadata on the caller's behalf: it returns raw slot
//! ids, which may be [`SENTINEL_SLOT`] when the index holds fewer vectors than requested.

mod hnsw;

pub use hnsw::AnnIndex;

use crate::error::{RagError, Result};

/// Slot id meaning "no candidate".
pub const SENTINEL_SLOT: i64 = -1;

/// HNSW graph parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    /// Target connectivity; sets the level multiplier `1 / ln(m)`.
    pub m: usize,
    /// Candidate list size while inserting.
    pub ef_construction: usize,
    /// Candidate list size while searching.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

impl HnswParams {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn level_multiplier(&self) -> f32 {
        1.0 / (self.m as f32).ln()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(RagError::Config(format!("hnsw m must be >= 2, got {}", self.m)));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(RagError::Config("hnsw ef values must be positive".into()));
        }
        Ok(())
    }
}

/// Parallel arrays of similarities and slot ids, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Inner products; `f32::NEG_INFINITY` at sentinel positions.
    pub similarities: Vec<f32>,
    /// Slot ids; [`SENTINEL_SLOT`] marks padding.
    pub slots: Vec<i64>,
}

impl SearchResults {
    fn with_capacity(n: usize) -> Self {
        Self {
            similarities: Vec::with_capacity(n),
            slots: Vec::with_capacity(n),
        }
    }

    fn pad_to(&mut self, n: usize) {
        while self.slots.len() < n {
            self.slots.push(SENTINEL_SLOT);
            self.similarities.push(f32::NEG_INFINITY);
        }
    }

    /// `(position, slot, similarity)` for every non-sentinel entry.
    pub fn valid(&self) -> impl Iterator<Item = (usize, i64, f32)> + '_ {
        self.slots
            .iter()
            .zip(&self.similarities)
            .enumerate()
            .filter(|(_, (slot, _))| **slot != SENTINEL_SLOT)
            .map(|(rank, (&slot, &similarity))| (rank, slot, similarity))
    }

    /// Number of entries, sentinels included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no entries were requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
