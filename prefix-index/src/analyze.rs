//! Bucket-size distribution and expected collision size of a prefix index.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::codec::BitLength;
use crate::error::{Error, Result};
use crate::index::PrefixIndex;

/// Collision statistics over the populated buckets of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub bits: BitLength,
    /// Bucket size to number of prefixes with that many patterns.
    pub histogram: BTreeMap<usize, usize>,
    /// Sum of `size * count` over the histogram.
    pub associations: usize,
    /// Sum of `count` over the histogram, the number of populated prefixes.
    pub buckets: usize,
}

impl IndexStats {
    /// Mean number of patterns per populated prefix.
    ///
    /// This is the number of patterns an observer of one prefix cannot tell apart
    /// from the true match, on average. Only occurring prefixes are counted.
    pub fn expectation(&self) -> f64 {
        self.associations as f64 / self.buckets as f64
    }

    /// The expectation as an exact `(numerator, denominator)` pair.
    pub fn expectation_ratio(&self) -> (usize, usize) {
        (self.associations, self.buckets)
    }

    /// Size of the largest bucket.
    pub fn max_bucket(&self) -> usize {
        self.histogram.keys().next_back().copied().unwrap_or(0)
    }

    /// Prefixes shared by two or more patterns.
    pub fn colliding_buckets(&self) -> usize {
        self.histogram.range(2..).map(|(_, count)| count).sum()
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bit length: {}", self.bits)?;
        writeln!(f, "populated prefixes: {}, patterns: {}", self.buckets, self.associations)?;
        writeln!(f, "bucket size -> prefixes:")?;
        for (size, count) in &self.histogram {
            writeln!(f, "    {size:>6} -> {count}")?;
        }
        write!(f, "expectation: {:.6} ({}/{})", self.expectation(), self.associations, self.buckets)
    }
}

/// Tallies bucket sizes and the expected bucket size of a built index.
///
/// Read-only; an empty index is rejected.
pub fn analyze(index: &PrefixIndex) -> Result<IndexStats> {
    if index.is_empty() {
        return Err(Error::EmptyIndex);
    }

    let mut histogram = BTreeMap::new();
    for (_, patterns) in index.iter() {
        *histogram.entry(patterns.len()).or_insert(0usize) += 1;
    }

    let associations = histogram.iter().map(|(size, count)| size * count).sum();
    let buckets = histogram.values().sum();

    Ok(IndexStats { bits: index.bits(), histogram, associations, buckets })
}

/// Analyzes `index` narrowed to each bit length in turn.
///
/// Bit lengths wider than the index are rejected.
pub fn analyze_sweep<I>(index: &PrefixIndex, bit_lengths: I) -> Result<Vec<IndexStats>>
where
    I: IntoIterator<Item = BitLength>,
{
    bit_lengths
        .into_iter()
        .map(|bits| {
            if bits == index.bits() {
                analyze(index)
            } else {
                analyze(&index.truncate(bits)?)
            }
        })
        .collect()
}
