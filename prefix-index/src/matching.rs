//! Set intersection between a prefix index and an external prefix population.
//!
//! Both directions run through [`intersect`]: one side drives the iteration and the
//! other is probed for membership. Patterns always come from the index, either the
//! first of each matched bucket or the whole bucket.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::codec::{self, BitLength, Prefix, PrefixEncoding};
use crate::error::{Error, Result};
use crate::hash::{PatternHasher, generate_hashes};
use crate::index::PrefixIndex;
use crate::patterns::PatternSource;

/// A deduplicated external prefix population at one bit length.
///
/// Iteration follows the order in which prefixes were first inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixSet {
    bits: BitLength,
    prefixes: HashSet<Prefix>,
    order: Vec<Prefix>,
    entries: usize,
    rejected: usize,
}

impl PrefixSet {
    pub fn new(bits: BitLength) -> Self {
        Self { bits, prefixes: HashSet::new(), order: Vec::new(), entries: 0, rejected: 0 }
    }

    /// Normalizes text prefixes into canonical prefixes of width `bits`.
    ///
    /// Blank entries are ignored and malformed entries are skipped and counted in
    /// [`rejected`](Self::rejected). Width errors fail the whole population, as does a
    /// population in which every entry is malformed, so a radix mix-up cannot pass as
    /// an empty match.
    pub fn parse<I, S>(entries: I, encoding: PrefixEncoding, bits: BitLength) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new(bits);
        let mut first_rejected = None;
        for entry in entries {
            let entry = entry.as_ref();
            if entry.trim().is_empty() {
                continue;
            }
            match Prefix::parse(entry, encoding, bits) {
                Ok(prefix) => {
                    set.insert(prefix)?;
                }
                Err(e @ Error::MalformedPrefix { .. }) => {
                    debug!(error = %e, "skipping external prefix");
                    set.rejected += 1;
                    first_rejected.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(e) = first_rejected {
            if set.is_empty() {
                return Err(e);
            }
            warn!(rejected = set.rejected, kept = set.entries, "malformed external prefixes skipped");
        }
        Ok(set)
    }

    /// Prefixes of every pattern of one URL.
    pub fn from_url<S, H>(source: &S, hasher: &H, url: &str, bits: BitLength) -> Result<Self>
    where
        S: PatternSource + ?Sized,
        H: PatternHasher + ?Sized,
    {
        let mut set = Self::new(bits);
        for digest in generate_hashes(source, hasher, url)?.keys() {
            set.insert(codec::prefix(digest, bits)?)?;
        }
        Ok(set)
    }

    /// Adds one prefix, which must be as wide as the set.
    pub fn insert(&mut self, prefix: Prefix) -> Result<bool> {
        if prefix.bits() != self.bits {
            return Err(Error::BitLengthMismatch { expected: self.bits, found: prefix.bits() });
        }
        self.entries += 1;
        let added = self.prefixes.insert(prefix);
        if added {
            self.order.push(prefix);
        }
        Ok(added)
    }

    #[inline]
    pub fn bits(&self) -> BitLength {
        self.bits
    }

    /// Number of distinct prefixes.
    #[inline]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Number of entries inserted, repeats included.
    #[inline]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Number of malformed entries skipped by [`parse`](Self::parse).
    #[inline]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    #[inline]
    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.prefixes.contains(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prefix> {
        self.order.iter()
    }

    /// Number of prefixes present in both sets.
    pub fn intersection_count(&self, other: &PrefixSet) -> Result<usize> {
        ensure_bits(self.bits, other.bits)?;
        Ok(self.prefixes.intersection(&other.prefixes).count())
    }
}

/// Which side drives the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Walk the external population, probe the index.
    ExternalIntoIndex,
    /// Walk the index keys, probe the external population.
    IndexIntoExternal,
}

/// How many index patterns accompany each matched prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// The first pattern of the bucket.
    Representative,
    /// The whole bucket.
    Full,
}

/// Prefixes found on both sides, each with its index patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub bits: BitLength,
    pub matches: BTreeMap<Prefix, Vec<String>>,
    /// Populated prefixes in the index.
    pub index_size: usize,
    /// Distinct prefixes in the external population.
    pub external_size: usize,
}

impl MatchResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &Prefix> {
        self.matches.keys()
    }

    /// Every attached pattern, in prefix order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.matches.values().flatten().map(String::as_str)
    }

    /// Bit-string keyed copy for JSON export.
    pub fn to_sorted_map(&self) -> BTreeMap<String, Vec<String>> {
        self.matches.iter().map(|(prefix, patterns)| (prefix.to_string(), patterns.clone())).collect()
    }
}

/// Intersects the index keys with an external population.
///
/// The two populations must share a bit length. Neither input is modified.
#[instrument(skip_all, fields(?direction, ?payload))]
pub fn intersect(
    index: &PrefixIndex,
    external: &PrefixSet,
    direction: Direction,
    payload: Payload,
) -> Result<MatchResult> {
    ensure_bits(index.bits(), external.bits())?;

    let attach = |prefix: &Prefix| -> Option<(Prefix, Vec<String>)> {
        let bucket = index.get(prefix)?;
        let patterns = match payload {
            Payload::Representative => bucket.iter().take(1).cloned().collect(),
            Payload::Full => bucket.to_vec(),
        };
        Some((*prefix, patterns))
    };

    let matches: BTreeMap<Prefix, Vec<String>> = match direction {
        Direction::ExternalIntoIndex => external.iter().filter_map(attach).collect(),
        Direction::IndexIntoExternal => {
            index.prefixes().filter(|prefix| external.contains(prefix)).filter_map(attach).collect()
        }
    };

    debug!(matched = matches.len(), index = index.len(), external = external.len(), "intersected");
    Ok(MatchResult {
        bits: index.bits(),
        matches,
        index_size: index.len(),
        external_size: external.len(),
    })
}

/// Walks the external population and keeps one representative pattern per match.
pub fn match_external_against_index(external: &PrefixSet, index: &PrefixIndex) -> Result<MatchResult> {
    intersect(index, external, Direction::ExternalIntoIndex, Payload::Representative)
}

/// Walks the index and keeps the full bucket of every match.
pub fn match_index_against_external(index: &PrefixIndex, external: &PrefixSet) -> Result<MatchResult> {
    intersect(index, external, Direction::IndexIntoExternal, Payload::Full)
}

/// Indexed patterns sharing a prefix with any pattern of `url`.
pub fn lookup_url<S, H>(index: &PrefixIndex, source: &S, hasher: &H, url: &str) -> Result<MatchResult>
where
    S: PatternSource + ?Sized,
    H: PatternHasher + ?Sized,
{
    let probes = PrefixSet::from_url(source, hasher, url, index.bits())?;
    intersect(index, &probes, Direction::ExternalIntoIndex, Payload::Full)
}

/// One pattern of a URL whose prefix occurs in an external population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub pattern: String,
    pub prefix: Prefix,
}

/// Traces which patterns of `url` hit `external`, sorted by pattern.
///
/// A URL hitting one prefix through two patterns yields two hits.
pub fn trace_hits<S, H>(source: &S, hasher: &H, url: &str, external: &PrefixSet) -> Result<Vec<Hit>>
where
    S: PatternSource + ?Sized,
    H: PatternHasher + ?Sized,
{
    let mut hits = Vec::new();
    for (digest, pattern) in generate_hashes(source, hasher, url)? {
        let prefix = codec::prefix(&digest, external.bits())?;
        if external.contains(&prefix) {
            hits.push(Hit { pattern, prefix });
        }
    }
    hits.sort_by(|a, b| a.pattern.cmp(&b.pattern));
    Ok(hits)
}

fn ensure_bits(expected: BitLength, found: BitLength) -> Result<()> {
    if expected != found {
        return Err(Error::BitLengthMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Hasher;
    use crate::index::tests::{FixedHasher, bits};
    use crate::patterns::UrlDecomposer;

    fn scenario_index() -> PrefixIndex {
        PrefixIndex::build(["a/b", "a/c", "x/y"], &FixedHasher::scenario(), bits(16)).unwrap()
    }

    #[test]
    fn test_external_bit_string_matches_bucket() {
        let index = scenario_index();
        let external = PrefixSet::parse(["0001001000110100"], PrefixEncoding::Binary, bits(16)).unwrap();

        let result = match_index_against_external(&index, &external).unwrap();
        assert_eq!(result.len(), 1);
        let patterns = &result.matches[&Prefix::from_bit_str("0001001000110100").unwrap()];
        assert_eq!(patterns, &["a/b", "a/c"]);
    }

    #[test]
    fn test_representative_payload() {
        let index = scenario_index();
        let external = PrefixSet::parse(["0001001000110100", "0000000000000001"], PrefixEncoding::Binary, bits(16))
            .unwrap();

        let result = match_external_against_index(&external, &index).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.patterns().collect::<Vec<_>>(), ["a/b"]);
        assert_eq!(result.external_size, 2);
        assert_eq!(result.index_size, 2);
    }

    #[test]
    fn test_hex_population_is_normalized() {
        let index = scenario_index();
        let external = PrefixSet::parse(["1234", "FFFF", "0bad"], PrefixEncoding::Hex, bits(16)).unwrap();
        let result = match_index_against_external(&index, &external).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.patterns().collect::<Vec<_>>(), ["a/b", "a/c", "x/y"]);
    }

    #[test]
    fn test_width_mismatch_is_an_error() {
        let index = scenario_index();
        let external = PrefixSet::parse(["12345678"], PrefixEncoding::Hex, bits(32)).unwrap();
        assert!(matches!(
            match_index_against_external(&index, &external),
            Err(Error::BitLengthMismatch { .. })
        ));

        // Raw hex against bit-string keys is refused rather than matching nothing.
        assert!(PrefixSet::parse(["1234"], PrefixEncoding::Binary, bits(16)).is_err());
    }

    #[test]
    fn test_directions_agree_on_keys() {
        let patterns: Vec<String> = (0..1500).map(|i| format!("h{}.example/{}", i % 53, i)).collect();
        let index = PrefixIndex::build(&patterns[..1000], &Sha256Hasher, bits(12)).unwrap();
        let other = PrefixIndex::build(&patterns[700..], &Sha256Hasher, bits(12)).unwrap();

        let mut external = PrefixSet::new(bits(12));
        for prefix in other.prefixes() {
            external.insert(*prefix).unwrap();
        }

        let forward = match_external_against_index(&external, &index).unwrap();
        let backward = match_index_against_external(&index, &external).unwrap();
        assert!(!forward.is_empty());
        assert_eq!(forward.prefixes().collect::<Vec<_>>(), backward.prefixes().collect::<Vec<_>>());
        for (prefix, full) in &backward.matches {
            assert_eq!(forward.matches[prefix], full[..1]);
        }
    }

    #[test]
    fn test_mixed_width_store_prefixes() {
        let digest = Sha256Hasher::digest("evil.example/");
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let index = PrefixIndex::build(["evil.example/"], &Sha256Hasher, bits(32)).unwrap();

        let external =
            PrefixSet::parse([&hex[..8], &hex[..20], "not-hex", "0badf00d"], PrefixEncoding::Hex, bits(32)).unwrap();
        assert_eq!(external.len(), 2);
        assert_eq!(external.entries(), 3);
        assert_eq!(external.rejected(), 1);

        let result = match_external_against_index(&external, &index).unwrap();
        assert_eq!(result.patterns().collect::<Vec<_>>(), ["evil.example/"]);
    }

    #[test]
    fn test_all_malformed_population_is_an_error() {
        assert!(matches!(
            PrefixSet::parse(["zz", "yy"], PrefixEncoding::Hex, bits(8)),
            Err(Error::MalformedPrefix { .. })
        ));
        // Narrow text is a width error and is never skipped.
        assert!(matches!(
            PrefixSet::parse(["12345678", "1234"], PrefixEncoding::Hex, bits(32)),
            Err(Error::PrefixTooNarrow { .. })
        ));
    }

    #[test]
    fn test_set_counts_repeats_once() {
        let set = PrefixSet::parse(["cd", "ab", "AB", "", "cd"], PrefixEncoding::Hex, bits(8)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.entries(), 4);
        let order: Vec<String> = set.iter().map(Prefix::to_string).collect();
        assert_eq!(order, ["11001101", "10101011"]);
    }

    #[test]
    fn test_lookup_url_reidentifies_patterns() {
        let urls = ["http://evil.example/login/index.php", "http://other.test/"];
        let unique = crate::patterns::unique_patterns(&UrlDecomposer, urls);
        let index = PrefixIndex::build(unique.patterns, &Sha256Hasher, bits(32)).unwrap();

        let result = lookup_url(&index, &UrlDecomposer, &Sha256Hasher, "https://evil.example/login/").unwrap();
        let found: Vec<&str> = result.patterns().collect();
        assert!(found.contains(&"evil.example/"));
        assert!(found.contains(&"evil.example/login/"));
        assert!(!found.contains(&"other.test/"));
    }

    #[test]
    fn test_trace_hits_names_patterns() {
        let digest = Sha256Hasher::digest("evil.example/login/");
        let hex: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        let external = PrefixSet::parse([hex.as_str(), "00000000"], PrefixEncoding::Hex, bits(32)).unwrap();

        let hits = trace_hits(&UrlDecomposer, &Sha256Hasher, "http://evil.example/login/index.php", &external).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern, "evil.example/login/");
        assert_eq!(hits[0].prefix, codec::prefix(&digest, bits(32)).unwrap());

        assert!(trace_hits(&UrlDecomposer, &Sha256Hasher, "http://other.test/", &external).unwrap().is_empty());
    }

    #[test]
    fn test_intersection_count() {
        let a = PrefixSet::parse(["01", "02", "03"], PrefixEncoding::Hex, bits(8)).unwrap();
        let b = PrefixSet::parse(["03", "04", "01"], PrefixEncoding::Hex, bits(8)).unwrap();
        assert_eq!(a.intersection_count(&b).unwrap(), 2);
        let c = PrefixSet::parse(["0"], PrefixEncoding::Hex, bits(4)).unwrap();
        assert!(a.intersection_count(&c).is_err());
    }
}
