//! Product consistency filtering.
//!
//! Documentation for several products often shares wording, so a reranked context can mix
//! pages from different products. The filter keeps only the product most represented among
//! the candidates.

use crate::types::SearchHit;

/// Most frequent non-empty product among `hits`; ties go to the product seen first.
#[must_use]
pub fn majority_product(hits: &[SearchHit]) -> Option<&str> {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for product in hits.iter().filter_map(|h| h.chunk.product()) {
        match tally.iter_mut().find(|(p, _)| *p == product) {
            Some((_, count)) => *count += 1,
            None => tally.push((product, 1)),
        }
    }
    tally
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (product, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((product, count)),
        })
        .map(|(product, _)| product)
}

/// Keeps the hits whose product is the majority product, preserving order.
///
/// Hits without a product are dropped whenever a majority exists. With no product labels at
/// all the input is returned unchanged.
#[must_use]
pub fn filter_by_majority_product(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let Some(majority) = majority_product(&hits).map(str::to_owned) else {
        return hits;
    };
    let before = hits.len();
    let kept: Vec<SearchHit> = hits
        .into_iter()
        .filter(|h| h.chunk.product() == Some(majority.as_str()))
        .collect();
    if kept.len() < before {
        tracing::debug!(product = %majority, dropped = before - kept.len(), "consistency filter");
    }
    kept
}
