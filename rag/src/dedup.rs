//! Content deduplication keys.

use xxhash_rust::xxh3::xxh3_64;

use crate::types::Chunk;

/// Computes a content hash for deduplication.
#[must_use]
pub fn content_hash(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}

/// Identity of a chunk's content.
///
/// The chunker's SHA-256 is preferred; chunks written without one fall back to an xxh3
/// hash of the trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    /// Hex digest supplied in the chunk metadata.
    Sha256(String),
    /// Hash computed locally.
    Xxh3(u64),
}

impl ContentKey {
    /// Key for `chunk`.
    #[must_use]
    pub fn of(chunk: &Chunk) -> Self {
        chunk.meta.sha256.as_ref().map_or_else(
            || Self::Xxh3(content_hash(chunk.text.trim())),
            |sha| Self::Sha256(sha.to_ascii_lowercase()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMeta;

    #[test]
    fn same_content_same_hash() {
        let text = "Hello, world!";
        assert_eq!(content_hash(text), content_hash(text));
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(content_hash("Hello, world!"), content_hash("Goodbye, world!"));
    }

    #[test]
    fn sha_wins_over_text() {
        let meta = ChunkMeta {
            sha256: Some("ABC".into()),
            ..ChunkMeta::default()
        };
        let a = Chunk::with_meta("a", "one", meta.clone());
        let b = Chunk::with_meta("b", "two", meta);
        assert_eq!(ContentKey::of(&a), ContentKey::of(&b));
        assert_eq!(ContentKey::of(&a), ContentKey::Sha256("abc".into()));
    }

    #[test]
    fn text_fallback_ignores_outer_whitespace() {
        let a = Chunk::new("a", "  same text ");
        let b = Chunk::new("b", "same text");
        assert_eq!(ContentKey::of(&a), ContentKey::of(&b));
    }
}
