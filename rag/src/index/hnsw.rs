//! HNSW-based ANN index using instant-distance.

use instant_distance::{Builder, HnswMap, Point, Search};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

use crate::error::{RagError, Result};
use crate::types::Chunk;

use super::{HnswParams, SENTINEL_SLOT, SearchResults};

/// Seed used for new graphs; persisted so a reload rebuilds the same levels.
pub(crate) const DEFAULT_SEED: u64 = 0x5EED_D0C5;

/// A unit vector. Distance is `1 - dot`, so nearer means higher inner product.
#[derive(Clone, Debug)]
struct UnitPoint(Vec<f32>);

impl Point for UnitPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - dot(&self.0, &other.0)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Approximate nearest-neighbor index over unit vectors with per-slot chunk metadata.
///
/// Slots are dense and follow insertion order: slot `i` is vector `i` and chunk `i`.
/// The index is immutable once built; a corpus change means a full rebuild.
///
/// ```rust
/// use docqa_rag::index::{AnnIndex, HnswParams};
/// use docqa_rag::Chunk;
///
/// let index = AnnIndex::build(
///     vec![vec![1.0, 0.0], vec![0.0, 1.0]],
///     vec![Chunk::new("a", "first"), Chunk::new("b", "second")],
///     HnswParams::default(),
/// )?;
/// let results = index.search(&[1.0, 0.0], 3)?;
/// assert_eq!(results.slots, [0, 1, -1]);
/// # Ok::<(), docqa_rag::RagError>(())
/// ```
pub struct AnnIndex {
    params: HnswParams,
    seed: u64,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<Chunk>,
    hnsw: Option<HnswMap<UnitPoint, usize>>,
}

impl std::fmt::Debug for AnnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnIndex")
            .field("params", &self.params)
            .field("dimension", &self.dimension)
            .field("len", &self.chunks.len())
            .finish_non_exhaustive()
    }
}

impl AnnIndex {
    /// Builds an index over `vectors`, attaching `chunks[i]` to slot `i`.
    ///
    /// Vectors are expected to be L2-normalized.
    ///
    /// # Errors
    /// - [`RagError::IndexIntegrity`] if the two lists differ in length
    /// - [`RagError::DimensionMismatch`] if the vectors differ in width
    /// - [`RagError::Config`] if `params` are out of range
    pub fn build(vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>, params: HnswParams) -> Result<Self> {
        Self::from_parts(vectors, chunks, params, DEFAULT_SEED)
    }

    pub(crate) fn from_parts(
        vectors: Vec<Vec<f32>>,
        chunks: Vec<Chunk>,
        params: HnswParams,
        seed: u64,
    ) -> Result<Self> {
        params.validate()?;
        if vectors.len() != chunks.len() {
            return Err(RagError::IndexIntegrity(format!(
                "{} vectors but {} metadata records",
                vectors.len(),
                chunks.len()
            )));
        }
        let dimension = vectors.first().map_or(0, Vec::len);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let hnsw = if vectors.is_empty() {
            None
        } else {
            let points: Vec<UnitPoint> = vectors.iter().cloned().map(UnitPoint).collect();
            let slots: Vec<usize> = (0..vectors.len()).collect();
            Some(
                Builder::default()
                    .ef_construction(params.ef_construction)
                    .ef_search(params.ef_search)
                    .ml(params.level_multiplier())
                    .seed(seed)
                    .build(points, slots),
            )
        };

        tracing::debug!(
            vectors = vectors.len(),
            dimension,
            m = params.m,
            ef_construction = params.ef_construction,
            ef_search = params.ef_search,
            "built hnsw graph"
        );

        Ok(Self {
            params,
            seed,
            dimension,
            vectors,
            chunks,
            hnsw,
        })
    }

    /// Returns up to `topk` nearest slots, padded with [`SENTINEL_SLOT`] to exactly `topk`.
    ///
    /// Exactly `min(topk, len)` entries are real slots. Similarities are exact inner products
    /// against the stored vectors, in descending order; ties keep the lower slot first.
    /// The graph walk yields at most `ef_search` candidates, so a `topk` above that is
    /// answered by scoring every stored vector.
    ///
    /// # Errors
    /// [`RagError::DimensionMismatch`] if the query width differs from the index.
    pub fn search(&self, query: &[f32], topk: usize) -> Result<SearchResults> {
        let mut found: Vec<(usize, f32)> = Vec::new();
        if let Some(hnsw) = &self.hnsw {
            if query.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: query.len(),
                });
            }
            if topk > self.params.ef_search && self.vectors.len() > self.params.ef_search {
                tracing::debug!(
                    topk,
                    ef_search = self.params.ef_search,
                    "topk exceeds ef_search, scoring all vectors"
                );
                found = self
                    .vectors
                    .iter()
                    .enumerate()
                    .map(|(slot, vector)| (slot, dot(query, vector)))
                    .collect();
            } else {
                let point = UnitPoint(query.to_vec());
                let mut search = Search::default();
                found = hnsw
                    .search(&point, &mut search)
                    .map(|item| {
                        let slot = *item.value;
                        (slot, dot(query, &self.vectors[slot]))
                    })
                    .collect();
            }
            found.sort_by_key(|&(slot, similarity)| (Reverse(OrderedFloat(similarity)), slot));
            found.truncate(topk);
        }

        let mut results = SearchResults::with_capacity(topk);
        for (slot, similarity) in found {
            results.similarities.push(similarity);
            results
                .slots
                .push(i64::try_from(slot).unwrap_or(SENTINEL_SLOT));
        }
        results.pad_to(topk);
        Ok(results)
    }

    /// Chunk for a slot id as returned by [`search`](Self::search).
    ///
    /// Sentinel and out-of-range ids yield `None`.
    #[must_use]
    pub fn chunk(&self, slot: i64) -> Option<&Chunk> {
        usize::try_from(slot).ok().and_then(|s| self.chunks.get(s))
    }

    /// All chunks in slot order.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// All vectors in slot order.
    #[must_use]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Vector width, zero for an empty index.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Parameters the graph was built with.
    #[must_use]
    pub const fn params(&self) -> HnswParams {
        self.params
    }

    pub(crate) const fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of indexed chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
