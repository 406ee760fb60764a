//! Digest computation for URL patterns.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::patterns::PatternSource;

/// Length of a SHA-256 digest in bytes.
pub const SHA256_LEN: usize = 32;

/// Maps a pattern to its digest.
///
/// Implementations must be deterministic: the same pattern always yields the same
/// bytes. A failure only excludes that one pattern from an index build.
pub trait PatternHasher {
    fn hash_pattern(&self, pattern: &str) -> Result<Vec<u8>>;
}

/// The full-length SHA-256 digest used by Safe Browsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    #[inline]
    pub fn digest(pattern: &str) -> [u8; SHA256_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(pattern.as_bytes());
        hasher.finalize().into()
    }
}

impl PatternHasher for Sha256Hasher {
    fn hash_pattern(&self, pattern: &str) -> Result<Vec<u8>> {
        Ok(Self::digest(pattern).to_vec())
    }
}

impl<H: PatternHasher + ?Sized> PatternHasher for &H {
    fn hash_pattern(&self, pattern: &str) -> Result<Vec<u8>> {
        (**self).hash_pattern(pattern)
    }
}

/// Hashes every pattern of one URL, keeping the pattern each digest came from.
///
/// Used where a hit has to be traced back to the decomposition that produced it.
pub fn generate_hashes<S, H>(source: &S, hasher: &H, url: &str) -> Result<HashMap<Vec<u8>, String>>
where
    S: PatternSource + ?Sized,
    H: PatternHasher + ?Sized,
{
    let mut hashes = HashMap::new();
    for pattern in source.generate_patterns(url)? {
        let digest = hasher.hash_pattern(&pattern)?;
        hashes.insert(digest, pattern);
    }
    Ok(hashes)
}
