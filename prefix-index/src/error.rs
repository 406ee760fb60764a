use std::path::PathBuf;

use crate::codec::{BitLength, PrefixEncoding};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bit length must be in 1..=32, got {0}")]
    InvalidBitLength(String),

    #[error("digest has {len} bytes, at least 4 are required to derive a prefix")]
    DigestTooShort { len: usize },

    #[error("cannot analyze an empty prefix index")]
    EmptyIndex,

    #[error("malformed {encoding} prefix '{text}'")]
    MalformedPrefix { text: String, encoding: PrefixEncoding },

    #[error("{encoding} prefix '{text}' carries {width} bits, {bits} were requested")]
    PrefixTooNarrow { text: String, encoding: PrefixEncoding, width: u32, bits: BitLength },

    #[error("prefix populations disagree on bit length: expected {expected}, found {found}")]
    BitLengthMismatch { expected: BitLength, found: BitLength },

    #[error("cannot widen a {from}-bit prefix to {to} bits")]
    WidenPrefix { from: BitLength, to: BitLength },

    #[error("could not canonicalize URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("hashing failed for pattern '{pattern}': {reason}")]
    Hash { pattern: String, reason: String },

    #[cfg(feature = "sqlite")]
    #[error("prefix store query failed on '{path}': {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[cfg(feature = "tokio")]
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
