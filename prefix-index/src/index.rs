//! Inverted index from truncated hash prefix to the patterns sharing it.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::codec::{self, BitLength, Prefix, PrefixEncoding};
use crate::error::{Error, Result};
use crate::hash::PatternHasher;

/// Read-only mapping from prefix to the patterns whose digests start with it.
///
/// Every key has at least one pattern and every key is exactly `bits` wide. Built
/// once by [`PrefixIndexBuilder`] or [`PrefixIndex::build`]; there is no incremental
/// update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixIndex {
    bits: BitLength,
    buckets: HashMap<Prefix, Vec<String>>,
}

impl PrefixIndex {
    /// Hashes each pattern and groups it under its `bits`-wide prefix.
    ///
    /// A pattern whose hashing fails is skipped. A digest too short to yield a prefix
    /// aborts the build.
    #[instrument(skip_all, fields(bits = %bits))]
    pub fn build<H, I, P>(patterns: I, hasher: &H, bits: BitLength) -> Result<Self>
    where
        H: PatternHasher + ?Sized,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut builder = PrefixIndexBuilder::new(bits);
        for pattern in patterns {
            builder.insert(hasher, pattern.into())?;
        }
        Ok(builder.finish())
    }

    /// Rebuilds an index from a persisted prefix to pattern-list map.
    ///
    /// Keys are normalized through the same guard as external populations, so a map
    /// keyed by hex hash prefixes loads as the equivalent bit-string keyed index.
    /// Keys that collapse onto one prefix have their lists appended.
    pub fn from_map<I>(map: I, encoding: PrefixEncoding, bits: BitLength) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut buckets: HashMap<Prefix, Vec<String>> = HashMap::new();
        for (key, patterns) in map {
            if patterns.is_empty() {
                continue;
            }
            let prefix = Prefix::parse(&key, encoding, bits)?;
            buckets.entry(prefix).or_default().extend(patterns);
        }
        Ok(Self { bits, buckets })
    }

    /// Infers the bit length of a bit-string keyed map from its keys.
    ///
    /// All keys must be bit strings of one width.
    pub fn from_bit_string_map<I>(map: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut bits = None;
        let mut buckets: HashMap<Prefix, Vec<String>> = HashMap::new();
        for (key, patterns) in map {
            let prefix = Prefix::from_bit_str(key.trim())?;
            match bits {
                None => bits = Some(prefix.bits()),
                Some(expected) if expected != prefix.bits() => {
                    return Err(Error::BitLengthMismatch { expected, found: prefix.bits() });
                }
                Some(_) => {}
            }
            if !patterns.is_empty() {
                buckets.entry(prefix).or_default().extend(patterns);
            }
        }
        Ok(Self { bits: bits.unwrap_or_default(), buckets })
    }

    #[inline]
    pub fn bits(&self) -> BitLength {
        self.bits
    }

    /// Number of populated prefixes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of (prefix, pattern) associations.
    pub fn associations(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    #[inline]
    pub fn get(&self, prefix: &Prefix) -> Option<&[String]> {
        self.buckets.get(prefix).map(Vec::as_slice)
    }

    #[inline]
    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.buckets.contains_key(prefix)
    }

    /// Buckets in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Prefix, &[String])> {
        self.buckets.iter().map(|(prefix, patterns)| (prefix, patterns.as_slice()))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &Prefix> {
        self.buckets.keys()
    }

    /// Looks up the bucket for an arbitrary digest.
    pub fn lookup_digest(&self, digest: &[u8]) -> Result<Option<&[String]>> {
        Ok(self.get(&codec::prefix(digest, self.bits)?))
    }

    /// Derives the narrower index for `bits` by merging buckets.
    ///
    /// Narrowing only merges buckets, so this equals a rebuild from the same
    /// patterns at `bits`, up to the order within each bucket.
    pub fn truncate(&self, bits: BitLength) -> Result<Self> {
        let mut buckets: HashMap<Prefix, Vec<String>> = HashMap::new();
        for (prefix, patterns) in &self.buckets {
            buckets.entry(prefix.truncate(bits)?).or_default().extend(patterns.iter().cloned());
        }
        Ok(Self { bits, buckets })
    }

    /// Ordered copy keyed by the canonical bit string, for persistence.
    pub fn to_sorted_map(&self) -> BTreeMap<String, Vec<String>> {
        self.buckets.iter().map(|(prefix, patterns)| (prefix.to_string(), patterns.clone())).collect()
    }
}

/// Accumulates patterns into buckets, then hands over a finished [`PrefixIndex`].
#[derive(Debug)]
pub struct PrefixIndexBuilder {
    bits: BitLength,
    buckets: HashMap<Prefix, Vec<String>>,
    seen: HashSet<String>,
    skipped: usize,
}

impl PrefixIndexBuilder {
    pub fn new(bits: BitLength) -> Self {
        Self { bits, buckets: HashMap::new(), seen: HashSet::new(), skipped: 0 }
    }

    /// Hashes and files one pattern. Returns whether it was added.
    ///
    /// Repeats of an already seen pattern are ignored, so a pattern sits in its
    /// bucket once per build and a failing pattern is hashed and counted once.
    pub fn insert<H: PatternHasher + ?Sized>(&mut self, hasher: &H, pattern: String) -> Result<bool> {
        if self.seen.contains(&pattern) {
            return Ok(false);
        }

        let digest = match hasher.hash_pattern(&pattern) {
            Ok(digest) => digest,
            Err(e) => {
                debug!(pattern = %pattern, error = %e, "skipping pattern");
                self.seen.insert(pattern);
                self.skipped += 1;
                return Ok(false);
            }
        };

        self.insert_digest(&digest, pattern)
    }

    /// Files a pattern under the prefix of an already computed digest.
    pub fn insert_digest(&mut self, digest: &[u8], pattern: String) -> Result<bool> {
        if self.seen.contains(&pattern) {
            return Ok(false);
        }
        let prefix = codec::prefix(digest, self.bits)?;
        self.seen.insert(pattern.clone());
        self.buckets.entry(prefix).or_default().push(pattern);
        Ok(true)
    }

    /// Distinct patterns skipped so far because hashing failed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> PrefixIndex {
        if self.skipped > 0 {
            warn!(skipped = self.skipped, "patterns left out of the index after hashing failures");
        }
        debug!(buckets = self.buckets.len(), patterns = self.seen.len() - self.skipped, "built prefix index");
        PrefixIndex { bits: self.bits, buckets: self.buckets }
    }
}
