use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use prefix_index::{BitLength, DEFAULT_BIT_LENGTH, PrefixEncoding};

#[derive(Parser, Debug)]
#[command(name = "prefix-index")]
#[command(about = "Build, analyze and match truncated hash-prefix indexes of URL patterns")]
pub struct Cli {
    /// Directory for batch outputs (default: $PREFIX_INDEX_WORK_DIR or the current directory)
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Canonicalize and dedup URLs, decompose them into patterns and build the index
    Normalize(NormalizeArgs),

    /// Report bucket sizes and expected collisions of an index built from patterns (or history URLs)
    Analyze(AnalyzeArgs),

    /// Match an external prefix list against a persisted index (one pattern per match, in list order)
    MatchExternal(MatchExternalArgs),

    /// Match an index built from URLs against an external prefix list (full buckets)
    MatchIndex(MatchIndexArgs),

    /// Print indexed patterns that share a prefix with the given URLs
    Lookup(LookupArgs),

    /// Count, per URL, how many of its pattern prefixes occur in an external list
    Scan(ScanArgs),

    /// Dump hex prefixes from a SQLite prefix store into a line file
    #[cfg(feature = "sqlite")]
    ExportStore(ExportStoreArgs),
}

/// Line-oriented input feeding pattern generation.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Input file path
    #[arg(short = 'p', long = "path")]
    pub path: PathBuf,

    /// Maximum number of non-empty lines to read (default: all)
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Read URLs from a browser-history JSON export instead of a line file
    #[arg(long)]
    pub history_json: bool,
}

/// Text form of an external prefix population.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Bit strings such as 0001001000110100
    Binary,
    /// Fixed-width hex prefixes such as 12345678
    Hex,
}

impl From<Encoding> for PrefixEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Binary => PrefixEncoding::Binary,
            Encoding::Hex => PrefixEncoding::Hex,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Prefix bit length (1-32)
    #[arg(short, long, default_value_t = DEFAULT_BIT_LENGTH)]
    pub bits: BitLength,

    /// Take the URL from this zero-based column of a comma-separated line
    #[arg(long)]
    pub csv_column: Option<usize>,

    /// Log canonical URLs that occur more than once
    #[arg(long)]
    pub report_duplicates: bool,

    /// File name of the JSON index written to the work directory
    #[arg(long, default_value = "hashprefix.json")]
    pub index_name: String,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Prefix bit length (1-32)
    #[arg(short, long, default_value_t = DEFAULT_BIT_LENGTH)]
    pub bits: BitLength,

    /// Also analyze every bit length from this one up to --bits
    #[arg(long)]
    pub sweep_from: Option<BitLength>,

    /// Bit length increment for --sweep-from
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub step: u8,
}

#[derive(Args, Debug, Clone)]
pub struct MatchExternalArgs {
    /// External prefix list, one prefix per line
    #[arg(short, long)]
    pub external: PathBuf,

    /// Encoding of the external prefix list
    #[arg(long, value_enum, default_value_t = Encoding::Hex)]
    pub encoding: Encoding,

    /// Persisted JSON index
    #[arg(short, long, default_value = "hashprefix.json")]
    pub index: PathBuf,

    /// Encoding of the JSON index keys
    #[arg(long, value_enum, default_value_t = Encoding::Binary)]
    pub index_encoding: Encoding,

    /// Prefix bit length (1-32)
    #[arg(short, long, default_value_t = DEFAULT_BIT_LENGTH)]
    pub bits: BitLength,

    /// Text prepended to each exported pattern, e.g. microsoft-edge:http://
    #[arg(long, default_value = "")]
    pub line_prefix: String,

    /// Output file for one representative pattern per matched prefix, in external list order
    #[arg(short, long, default_value = "smartscreentest.txt")]
    pub out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct MatchIndexArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Input lines are already decomposed patterns
    #[arg(long)]
    pub decomposed: bool,

    /// External prefix list, one prefix per line
    #[arg(short, long)]
    pub external: PathBuf,

    /// Encoding of the external prefix list
    #[arg(long, value_enum, default_value_t = Encoding::Hex)]
    pub encoding: Encoding,

    /// Prefix bit length (1-32)
    #[arg(short, long, default_value_t = DEFAULT_BIT_LENGTH)]
    pub bits: BitLength,

    /// JSON file receiving every matched bucket
    #[arg(short, long, default_value = "ecrimematchegsb.json")]
    pub out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct LookupArgs {
    /// Persisted JSON index
    #[arg(short, long, default_value = "hashprefix.json")]
    pub index: PathBuf,

    /// URLs to look up
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// External prefix list, one prefix per line
    #[arg(short, long)]
    pub external: PathBuf,

    /// Encoding of the external prefix list
    #[arg(long, value_enum, default_value_t = Encoding::Hex)]
    pub encoding: Encoding,

    /// Prefix bit length (1-32)
    #[arg(short, long, default_value_t = DEFAULT_BIT_LENGTH)]
    pub bits: BitLength,

    /// Keep URLs with at least this many prefix hits
    #[arg(long, default_value_t = 1)]
    pub min_hits: usize,

    /// Keep URLs with at most this many prefix hits
    #[arg(long)]
    pub max_hits: Option<usize>,

    /// Also count hits against this JSON index
    #[arg(long)]
    pub verify_index: Option<PathBuf>,

    /// Output file for URLs whose hit count is in range
    #[arg(short, long, default_value = "suspicious.txt")]
    pub out: PathBuf,

    /// Output file for URLs whose index hit count is in range
    #[arg(long, default_value = "verify.txt")]
    pub verify_out: PathBuf,

    /// Also write one "url, pattern, prefix" line per external hit
    #[arg(long)]
    pub trace_out: Option<PathBuf>,
}

#[cfg(feature = "sqlite")]
#[derive(Args, Debug, Clone)]
pub struct ExportStoreArgs {
    /// SQLite prefix store
    #[arg(long, default_value = "gsb_v4.db")]
    pub db: PathBuf,

    /// Platform tag to select
    #[arg(long, default_value = prefix_index::store::ANY_PLATFORM)]
    pub platform: String,

    /// Output line file of lowercase hex prefixes
    #[arg(short, long, default_value = "GSBhashprefixes.txt")]
    pub out: PathBuf,
}
