use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use prefix_index::json::{read_history_urls, read_index, read_index_as, write_index, write_string_map};
use prefix_index::lines::{read_lines, write_lines};
use prefix_index::{
    BitLength, IndexStats, PrefixEncoding, PrefixIndex, PrefixSet, Sha256Hasher, UrlDecomposer, analyze_sweep,
    canonical_url, dedup_preserving_order, find_duplicates, lookup_url, match_external_against_index,
    match_index_against_external, trace_hits, unique_patterns, work_dir_from_env,
};
use tracing::{debug, info, instrument, warn};

use crate::cli::{
    AnalyzeArgs, Cli, Encoding, InputArgs, LookupArgs, MatchExternalArgs, MatchIndexArgs, NormalizeArgs, ScanArgs,
};
use crate::error::Error;

pub const CANONICALIZED_FILE: &str = "canonicalized.txt";
pub const DEDUPED_FILE: &str = "canondeduped.txt";
pub const DECOMPOSED_FILE: &str = "decomposed.txt";

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    /// Relative output paths are resolved against this directory.
    pub work_dir: PathBuf,
    pub progress: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            work_dir: cli.work_dir.clone().unwrap_or_else(work_dir_from_env),
            progress: !cli.no_progress,
        }
    }

    /// Creates the work directory if needed.
    pub fn prepare(&self) -> Result<(), Error> {
        std::fs::create_dir_all(&self.work_dir)
            .map_err(|source| prefix_index::Error::Io { path: self.work_dir.clone(), source })?;
        Ok(())
    }

    pub fn output(&self, name: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(name)
    }

    fn progress_bar(&self, len: usize, msg: &'static str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );
        pb.set_message(msg);
        pb
    }
}

fn load_external(path: &Path, encoding: Encoding, bits: BitLength) -> Result<PrefixSet, Error> {
    let lines = read_lines(path, None)?;
    let set = PrefixSet::parse(&lines, PrefixEncoding::from(encoding), bits)?;
    info!(
        path = %path.display(),
        distinct = set.len(),
        entries = set.entries(),
        rejected = set.rejected(),
        "loaded external prefixes"
    );
    Ok(set)
}

/// URL lines, or the URLs of a browser-history export with `--history-json`.
fn read_input(input: &InputArgs) -> Result<Vec<String>, Error> {
    if input.history_json {
        Ok(read_history_urls(&input.path, input.limit)?)
    } else {
        Ok(read_lines(&input.path, input.limit)?)
    }
}

fn decompose(ctx: &Context, urls: &[String]) -> Vec<String> {
    let pb = ctx.progress_bar(urls.len(), "decomposing");
    let decomposed = unique_patterns(&UrlDecomposer, urls.iter().progress_with(pb.clone()));
    pb.finish_and_clear();
    if decomposed.skipped > 0 {
        warn!(skipped = decomposed.skipped, "URLs without valid patterns");
    }
    decomposed.patterns
}

fn select_column(lines: Vec<String>, column: Option<usize>) -> Result<Vec<String>, Error> {
    let Some(column) = column else {
        return Ok(lines);
    };
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            line.split(',').nth(column).map(|field| field.trim().to_string()).ok_or_else(|| {
                Error::MissingColumn { line: i + 1, column, text: line.clone() }
            })
        })
        .collect()
}

/// Canonicalizes each URL; a URL that fails keeps its raw text.
fn canonicalize_all(ctx: &Context, urls: Vec<String>) -> Vec<String> {
    let pb = ctx.progress_bar(urls.len(), "canonicalizing");
    let canonical = urls
        .into_iter()
        .progress_with(pb.clone())
        .map(|url| match canonical_url(&url) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!(error = %e, "keeping raw URL");
                url
            }
        })
        .collect();
    pb.finish_and_clear();
    canonical
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub urls: usize,
    pub unique_urls: usize,
    pub duplicates: Vec<String>,
    pub patterns: usize,
    pub skipped: usize,
    pub buckets: usize,
    pub index_path: PathBuf,
}

impl fmt::Display for NormalizeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} URLs are loaded, {} unique URLs are obtained", self.urls, self.unique_urls)?;
        writeln!(f, "{} unique URL patterns are obtained ({} URLs skipped)", self.patterns, self.skipped)?;
        write!(f, "{} prefixes written to {}", self.buckets, self.index_path.display())
    }
}

/// Canonicalize, dedup, decompose, index; each stage is written to the work directory.
#[instrument(skip_all, fields(path = %args.input.path.display()))]
pub fn normalize(ctx: &Context, args: &NormalizeArgs) -> Result<NormalizeSummary, Error> {
    let lines = read_input(&args.input)?;
    let urls = select_column(lines, args.csv_column)?;
    let total = urls.len();

    let canonical = canonicalize_all(ctx, urls);
    write_lines(&canonical, &ctx.output(CANONICALIZED_FILE))?;

    let duplicates = if args.report_duplicates { find_duplicates(&canonical) } else { Vec::new() };
    for url in &duplicates {
        info!(url = %url, "duplicate URL");
    }

    let unique = dedup_preserving_order(canonical);
    write_lines(&unique, &ctx.output(DEDUPED_FILE))?;

    let pb = ctx.progress_bar(unique.len(), "decomposing");
    let decomposed = unique_patterns(&UrlDecomposer, unique.iter().progress_with(pb.clone()));
    pb.finish_and_clear();
    if decomposed.skipped > 0 {
        warn!(skipped = decomposed.skipped, "URLs without valid patterns");
    }
    write_lines(&decomposed.patterns, &ctx.output(DECOMPOSED_FILE))?;

    let index = PrefixIndex::build(&decomposed.patterns, &Sha256Hasher, args.bits)?;
    let index_path = ctx.output(&args.index_name);
    write_index(&index, &index_path)?;

    Ok(NormalizeSummary {
        urls: total,
        unique_urls: unique.len(),
        duplicates,
        patterns: decomposed.patterns.len(),
        skipped: decomposed.skipped,
        buckets: index.len(),
        index_path,
    })
}

/// Stats for `--bits`, or for each width of the sweep in increasing order.
#[instrument(skip_all, fields(path = %args.input.path.display()))]
pub fn analyze(ctx: &Context, args: &AnalyzeArgs) -> Result<Vec<IndexStats>, Error> {
    let patterns = if args.input.history_json {
        decompose(ctx, &dedup_preserving_order(read_input(&args.input)?))
    } else {
        read_lines(&args.input.path, args.input.limit)?
    };
    let index = PrefixIndex::build(patterns, &Sha256Hasher, args.bits)?;

    let Some(from) = args.sweep_from else {
        return Ok(vec![prefix_index::analyze(&index)?]);
    };
    if from > args.bits {
        return Err(Error::InvalidSweep { from: from.get(), to: args.bits.get() });
    }

    let widths = (from.get()..=args.bits.get())
        .step_by(args.step as usize)
        .map(BitLength::new)
        .collect::<prefix_index::Result<Vec<_>>>()?;
    Ok(analyze_sweep(&index, widths)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub matched: usize,
    pub index_size: usize,
    pub external_size: usize,
    pub external_entries: usize,
    /// Malformed external lines that were skipped.
    pub external_rejected: usize,
    pub out: PathBuf,
}

impl fmt::Display for MatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} of {} external prefixes ({} entries) match the index ({} prefixes)",
            self.matched, self.external_size, self.external_entries, self.index_size
        )?;
        if self.external_rejected > 0 {
            writeln!(f, "{} malformed external prefixes skipped", self.external_rejected)?;
        }
        write!(f, "matches written to {}", self.out.display())
    }
}

/// External list against a persisted index, exporting one pattern per match in list order.
#[instrument(skip_all, fields(external = %args.external.display(), index = %args.index.display()))]
pub fn match_external(ctx: &Context, args: &MatchExternalArgs) -> Result<MatchSummary, Error> {
    let external = load_external(&args.external, args.encoding, args.bits)?;
    let index = read_index_as(&args.index, args.index_encoding.into(), args.bits)?;

    let result = match_external_against_index(&external, &index)?;

    let out = ctx.output(&args.out);
    let lines = external
        .iter()
        .filter_map(|prefix| result.matches.get(prefix))
        .flatten()
        .map(|pattern| format!("{}{}", args.line_prefix, pattern));
    write_lines(lines, &out)?;

    Ok(MatchSummary {
        matched: result.len(),
        index_size: result.index_size,
        external_size: result.external_size,
        external_entries: external.entries(),
        external_rejected: external.rejected(),
        out,
    })
}

/// Index built from the input against an external list, exporting full buckets.
#[instrument(skip_all, fields(path = %args.input.path.display(), external = %args.external.display()))]
pub fn match_index(ctx: &Context, args: &MatchIndexArgs) -> Result<MatchSummary, Error> {
    let lines = read_input(&args.input)?;
    let patterns = if args.decomposed { dedup_preserving_order(lines) } else { decompose(ctx, &lines) };

    let index = PrefixIndex::build(patterns, &Sha256Hasher, args.bits)?;
    let external = load_external(&args.external, args.encoding, args.bits)?;

    let result = match_index_against_external(&index, &external)?;

    let out = ctx.output(&args.out);
    write_string_map(&result.to_sorted_map(), &out)?;

    Ok(MatchSummary {
        matched: result.len(),
        index_size: result.index_size,
        external_size: result.external_size,
        external_entries: external.entries(),
        external_rejected: external.rejected(),
        out,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub url: String,
    pub reidentified: Vec<String>,
    pub error: Option<String>,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.url)?;
        if let Some(error) = &self.error {
            return write!(f, "    skipped: {error}");
        }
        if self.reidentified.is_empty() {
            return write!(f, "    No collision found!");
        }
        writeln!(f, "Re-identified URLs:")?;
        for (i, pattern) in self.reidentified.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "    {pattern}")?;
        }
        Ok(())
    }
}

/// Indexed patterns colliding with each URL. URLs that cannot be decomposed are reported, not fatal.
pub fn lookup(_ctx: &Context, args: &LookupArgs) -> Result<Vec<Lookup>, Error> {
    let index = read_index(&args.index)?;

    Ok(args
        .urls
        .iter()
        .map(|url| match lookup_url(&index, &UrlDecomposer, &Sha256Hasher, url) {
            Ok(result) => Lookup {
                url: url.clone(),
                reidentified: result.patterns().map(str::to_string).collect(),
                error: None,
            },
            Err(e) => Lookup { url: url.clone(), reidentified: Vec::new(), error: Some(e.to_string()) },
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub skipped: usize,
    pub flagged: usize,
    pub verified: Option<usize>,
    /// Pattern hits written with `--trace-out`.
    pub traced: Option<usize>,
    pub out: PathBuf,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} URLs in hit range ({} skipped), written to {}",
            self.flagged,
            self.scanned,
            self.skipped,
            self.out.display()
        )?;
        if let Some(verified) = self.verified {
            write!(f, "\n{verified} URLs in hit range against the verification index")?;
        }
        if let Some(traced) = self.traced {
            write!(f, "\n{traced} pattern hits traced")?;
        }
        Ok(())
    }
}

/// Per-URL prefix hit counts against an external list and, optionally, an index.
///
/// With `--trace-out` every hit is also written as `url, pattern, prefix`.
#[instrument(skip_all, fields(path = %args.input.path.display(), external = %args.external.display()))]
pub fn scan(ctx: &Context, args: &ScanArgs) -> Result<ScanSummary, Error> {
    if let Some(max) = args.max_hits {
        if args.min_hits > max {
            return Err(Error::InvalidHitRange { min: args.min_hits, max });
        }
    }
    let in_range = |hits: usize| hits >= args.min_hits && args.max_hits.is_none_or(|max| hits <= max);

    let lines = read_input(&args.input)?;
    let urls = dedup_preserving_order(canonicalize_all(ctx, lines));
    let external = load_external(&args.external, args.encoding, args.bits)?;
    let verify_index = args.verify_index.as_deref().map(read_index).transpose()?;

    let mut flagged = Vec::new();
    let mut verified = Vec::new();
    let mut traces = Vec::new();
    let mut skipped = 0usize;

    let pb = ctx.progress_bar(urls.len(), "scanning");
    for url in urls.iter().progress_with(pb.clone()) {
        let hits = match trace_hits(&UrlDecomposer, &Sha256Hasher, url, &external) {
            Ok(hits) => hits,
            Err(e) => {
                debug!(url = %url, error = %e, "skipping URL");
                skipped += 1;
                continue;
            }
        };

        let distinct: HashSet<_> = hits.iter().map(|hit| hit.prefix).collect();
        if in_range(distinct.len()) {
            flagged.push(url.as_str());
        }
        if args.trace_out.is_some() {
            traces.extend(hits.iter().map(|hit| format!("{url}, {}, {}", hit.pattern, hit.prefix)));
        }
        if let Some(index) = &verify_index {
            if in_range(lookup_url(index, &UrlDecomposer, &Sha256Hasher, url)?.len()) {
                verified.push(url.as_str());
            }
        }
    }
    pb.finish_and_clear();

    let out = ctx.output(&args.out);
    write_lines(&flagged, &out)?;
    if verify_index.is_some() {
        write_lines(&verified, &ctx.output(&args.verify_out))?;
    }
    if let Some(trace_out) = &args.trace_out {
        write_lines(&traces, &ctx.output(trace_out))?;
    }

    Ok(ScanSummary {
        scanned: urls.len(),
        skipped,
        flagged: flagged.len(),
        verified: verify_index.as_ref().map(|_| verified.len()),
        traced: args.trace_out.as_ref().map(|_| traces.len()),
        out,
    })
}

#[cfg(feature = "sqlite")]
pub fn export_store(ctx: &Context, args: &crate::cli::ExportStoreArgs) -> Result<(usize, PathBuf), Error> {
    let prefixes = prefix_index::store::read_store_prefixes(&args.db, &args.platform)?;
    let out = ctx.output(&args.out);
    write_lines(&prefixes, &out)?;
    Ok((prefixes.len(), out))
}
