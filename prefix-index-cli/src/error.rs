#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Index(#[from] prefix_index::Error),

    #[error("--sweep-from {from} is wider than --bits {to}")]
    InvalidSweep { from: u8, to: u8 },

    #[error("--min-hits {min} exceeds --max-hits {max}")]
    InvalidHitRange { min: usize, max: usize },

    #[error("line {line} has no column {column}: '{text}'")]
    MissingColumn { line: usize, column: usize, text: String },
}
