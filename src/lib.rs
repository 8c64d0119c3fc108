//! Huffman-coding file compressor writing the `.grin` format.
//!
//! ```no_run
//! use std::path::Path;
//!
//! grin::encode_file(Path::new("notes.txt"), Path::new("notes.grin"))?;
//! grin::decode_file(Path::new("notes.grin"), Path::new("notes.out"))?;
//! # Ok::<(), grin::GrinError>(())
//! ```

pub mod bit_stream;
pub mod error;
pub mod grin;
pub mod huffman;

pub use error::{GrinError, Result};
pub use grin::{MAGIC_NUM, Summary, decode_bytes, decode_file, encode_bytes, encode_file};
pub use huffman::HuffmanTree;
