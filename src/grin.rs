//! The `.grin` container: a 32-bit magic number, the serialized Huffman tree,
//! then the Huffman-coded payload terminated by the EOF code.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};

use crate::bit_stream::{BitReader, BitWriter};
use crate::error::{GrinError, Result};
use crate::huffman::{FreqTable, HuffmanTree, entropy_from_freq};

pub const MAGIC_NUM: u32 = 0x736;
const MAGIC_BITS: u32 = 32;

/// Sizes and statistics of one finished encode or decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub distinct_symbols: usize,
    /// Entropy of the uncompressed byte distribution, in bits/symbol.
    pub entropy: f64,
}

impl Summary {
    /// Percentage saved by the compressed side relative to the uncompressed side.
    pub fn ratio(&self, encoded: bool) -> f64 {
        let (plain, packed) = if encoded {
            (self.input_bytes, self.output_bytes)
        } else {
            (self.output_bytes, self.input_bytes)
        };
        if plain == 0 {
            return 0.0;
        }
        100.0 * (1.0 - packed as f64 / plain as f64)
    }
}

/// Counts every byte of `input`, reading it 8 bits at a time.
pub fn frequency_table<R: Read>(input: &mut BitReader<R>) -> Result<FreqTable> {
    let mut freq = FreqTable::new();
    while let Some(value) = input.read_bits(8)? {
        *freq.entry(value as u8).or_insert(0) += 1;
    }
    debug!(
        "Counted {} bytes, {} distinct values.",
        input.bits_read() / 8,
        freq.len()
    );
    Ok(freq)
}

/// Writes magic, tree header, and payload for `input` into `output`.
/// `input` must yield the same bytes `freq` was counted from, otherwise
/// [`GrinError::InputChanged`] is returned.
pub fn compress<R: Read, W: Write>(freq: &FreqTable, input: R, output: W) -> Result<Summary> {
    let tree = HuffmanTree::from_frequencies(freq);

    let mut output = BitWriter::new(output);
    output.write_bits(MAGIC_NUM, MAGIC_BITS)?;
    tree.serialize(&mut output)?;

    let mut input = BitReader::new(input);
    let input_bytes = tree.encode(&mut input, &mut output)?;
    let counted: u64 = freq.values().sum();
    if input_bytes != counted {
        return Err(GrinError::InputChanged {
            counted,
            encoded: input_bytes,
        });
    }
    let output_bytes = output.bits_written().div_ceil(8);
    output.finish()?;

    Ok(Summary {
        input_bytes,
        output_bytes,
        distinct_symbols: tree.leaf_count(),
        entropy: entropy_from_freq(freq),
    })
}

/// Checks the magic number and rebuilds the tree, leaving `input` at the payload.
pub fn read_header<R: Read>(input: &mut BitReader<R>) -> Result<HuffmanTree> {
    match input.read_bits(MAGIC_BITS)? {
        Some(MAGIC_NUM) => {}
        Some(found) => return Err(GrinError::BadMagic(found)),
        None => return Err(GrinError::MissingMagic),
    }
    HuffmanTree::from_bits(input)
}

/// Decodes the payload that follows a header already consumed by [`read_header`].
pub fn decompress<R: Read, W: Write>(
    tree: &HuffmanTree,
    input: &mut BitReader<R>,
    output: W,
) -> Result<Summary> {
    let mut sink = BitWriter::new(Counting::new(output));
    tree.decode(input, &mut sink)?;
    let counting = sink.finish()?;

    let input_bytes = input.bits_read().div_ceil(8);
    Ok(Summary {
        input_bytes,
        output_bytes: counting.written,
        distinct_symbols: tree.leaf_count(),
        entropy: entropy_from_freq(&counting.freq),
    })
}

pub fn encode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let freq = frequency_table(&mut BitReader::new(data))?;
    let mut out = Vec::new();
    compress(&freq, data, &mut out)?;
    Ok(out)
}

pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut input = BitReader::new(Cursor::new(data));
    let tree = read_header(&mut input)?;
    let mut out = Vec::new();
    decompress(&tree, &mut input, &mut out)?;
    Ok(out)
}

/// Compresses `infile` into `outfile`. If encoding fails after `outfile` was
/// created, it is removed.
pub fn encode_file(infile: &Path, outfile: &Path) -> Result<Summary> {
    info!("Encoding {} -> {}", infile.display(), outfile.display());
    let start = Instant::now();

    let freq = frequency_table(&mut BitReader::open(infile)?)?;
    refuse_same_file(infile, outfile)?;

    let input = BufReader::new(File::open(infile)?);
    let output = BufWriter::new(File::create(outfile)?);
    let result = compress(&freq, input, output);

    finish_or_discard(result, outfile, start)
}

/// Decompresses `infile` into `outfile`. The output file is only created once
/// the header has been read successfully, and is removed if decoding fails.
pub fn decode_file(infile: &Path, outfile: &Path) -> Result<Summary> {
    info!("Decoding {} -> {}", infile.display(), outfile.display());
    let start = Instant::now();

    let mut input = BitReader::open(infile)?;
    let tree = read_header(&mut input)?;
    refuse_same_file(infile, outfile)?;
    debug!("Header read: {} bits.", input.bits_read());

    let output = BufWriter::new(File::create(outfile)?);
    let result = decompress(&tree, &mut input, output);

    finish_or_discard(result, outfile, start)
}

/// Creating the output would truncate the input it is about to read.
fn refuse_same_file(infile: &Path, outfile: &Path) -> Result<()> {
    let input = fs::canonicalize(infile)?;
    match fs::canonicalize(outfile) {
        Ok(output) if output == input => Err(GrinError::SameFile(input)),
        _ => Ok(()),
    }
}

fn finish_or_discard(result: Result<Summary>, outfile: &Path, start: Instant) -> Result<Summary> {
    match result {
        Ok(summary) => {
            info!(
                "Finished in {:.2?}: {} bytes in, {} bytes out.",
                start.elapsed(),
                summary.input_bytes,
                summary.output_bytes
            );
            Ok(summary)
        }
        Err(e) => {
            if outfile.exists() {
                if let Err(rm) = fs::remove_file(outfile) {
                    warn!("Could not remove partial output {}: {}", outfile.display(), rm);
                }
            }
            Err(e)
        }
    }
}

/// Tallies bytes as they pass through, so decode can report the entropy of
/// what it produced without a second pass.
struct Counting<W> {
    inner: W,
    written: u64,
    freq: FreqTable,
}

impl<W: Write> Counting<W> {
    fn new(inner: W) -> Self {
        Counting {
            inner,
            written: 0,
            freq: FreqTable::new(),
        }
    }
}

impl<W: Write> Write for Counting<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        for &b in &buf[..n] {
            *self.freq.entry(b).or_insert(0) += 1;
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
