//! Truncated hash-prefix indexing and matching for Safe-Browsing-style URL checks.
//!
//! URLs are decomposed into canonical check patterns, each pattern is hashed with
//! SHA-256, and the leading `b` bits of the digest (1 ≤ b ≤ 32) become the key of an
//! inverted index from prefix to the patterns sharing it. A client holding only a
//! prefix can test membership against the index without revealing the full URL.
//!
//! # Prefix format
//!
//! A prefix is the first `b` bits of the big-endian 32-bit word formed by the first four
//! digest bytes, rendered as a zero-padded bit string. For a digest starting with
//! `12 34 56 78` the 16-bit prefix is `0001001000110100`. Shrinking `b` only drops
//! trailing bits, so narrowing merges buckets and never splits them.
//!
//! External populations usually arrive as fixed-width hex prefixes (`12345678`). They
//! are normalized into the same bit-string form before any comparison; see
//! [`Prefix::parse`].
//!
//! # Limitations
//!
//! Membership is prefix-only. A match means a shared prefix; no full-hash confirmation
//! against the remaining digest bytes is performed.
//!
//! # Example
//!
//! ```
//! use prefix_index::{BitLength, PrefixIndex, PrefixEncoding, PrefixSet, Sha256Hasher};
//! use prefix_index::{UrlDecomposer, analyze, match_index_against_external, unique_patterns};
//!
//! let urls = ["http://a.b.c/1/2.html?param=1", "http://example.com/"];
//! let unique = unique_patterns(&UrlDecomposer, urls);
//! let bits = BitLength::new(16)?;
//! let index = PrefixIndex::build(unique.patterns, &Sha256Hasher, bits)?;
//!
//! let stats = analyze(&index)?;
//! assert_eq!(stats.associations, 9);
//!
//! let external = PrefixSet::parse(["deadbeef"], PrefixEncoding::Hex, bits)?;
//! let result = match_index_against_external(&index, &external)?;
//! assert!(result.len() <= 1);
//! # Ok::<(), prefix_index::Error>(())
//! ```

pub mod analyze;
pub mod codec;
pub mod error;
pub mod hash;
pub mod index;
pub mod json;
pub mod lines;
pub mod matching;
pub mod patterns;

#[cfg(feature = "tokio")]
pub mod nonblocking;
#[cfg(feature = "sqlite")]
pub mod store;

pub use analyze::{IndexStats, analyze, analyze_sweep};
pub use codec::{BitLength, DEFAULT_BIT_LENGTH, Prefix, PrefixEncoding, prefix};
pub use error::{Error, Result};
pub use hash::{PatternHasher, Sha256Hasher, generate_hashes};
pub use index::{PrefixIndex, PrefixIndexBuilder};
pub use matching::{
    Direction, Hit, MatchResult, Payload, PrefixSet, intersect, lookup_url, match_external_against_index,
    match_index_against_external, trace_hits,
};
pub use patterns::{
    PatternSource, UniquePatterns, UrlDecomposer, canonical_url, dedup_preserving_order, find_duplicates,
    unique_patterns,
};

/// Environment variable naming the directory batch outputs are written to.
pub const WORK_DIR_ENV: &str = "PREFIX_INDEX_WORK_DIR";

/// Returns the output directory from the PREFIX_INDEX_WORK_DIR environment variable,
/// or falls back to the current directory.
pub fn work_dir_from_env() -> std::path::PathBuf {
    std::env::var(WORK_DIR_ENV).map(std::path::PathBuf::from).unwrap_or_else(|_| ".".into())
}
