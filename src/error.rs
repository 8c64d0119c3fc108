use std::path::PathBuf;

use thiserror::Error;

use crate::huffman::Symbol;

#[derive(Error, Debug)]
pub enum GrinError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a grin file: bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("not a grin file: too short to hold a magic number")]
    MissingMagic,

    #[error("tree header ended before the tree was complete")]
    TruncatedHeader,

    #[error("tree header nests deeper than {0} levels")]
    TreeTooDeep(usize),

    #[error("tree header holds out-of-range symbol {0}")]
    InvalidSymbol(u16),

    #[error("payload ended before the end-of-stream code")]
    TruncatedPayload,

    #[error("tree has no end-of-stream symbol")]
    MissingEof,

    #[error("no code for symbol {0}")]
    MissingCode(Symbol),

    #[error("input changed while encoding: counted {counted} bytes, encoded {encoded}")]
    InputChanged { counted: u64, encoded: u64 },

    #[error("input and output are the same file: {}", .0.display())]
    SameFile(PathBuf),
}

impl GrinError {
    /// True for malformed input, false for I/O failures and contract violations.
    pub fn is_format_error(&self) -> bool {
        !matches!(
            self,
            GrinError::Io(_)
                | GrinError::MissingCode(_)
                | GrinError::InputChanged { .. }
                | GrinError::SameFile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GrinError>;
