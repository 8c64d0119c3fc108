//! MSB-first bit streams over byte-oriented readers and writers.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Reads single bits or fixed-width fields, most significant bit first.
///
/// End of the underlying stream is reported as `Ok(None)`, never as a value.
pub struct BitReader<R> {
    inner: R,
    current: u8,
    remaining: u8,
    bits_read: u64,
}

impl BitReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(BitReader::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        BitReader {
            inner,
            current: 0,
            remaining: 0,
            bits_read: 0,
        }
    }

    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }

    pub fn read_bit(&mut self) -> io::Result<Option<bool>> {
        if self.remaining == 0 {
            let mut buf = [0u8; 1];
            loop {
                match self.inner.read(&mut buf) {
                    Ok(0) => return Ok(None),
                    Ok(_) => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            self.current = buf[0];
            self.remaining = 8;
        }

        self.remaining -= 1;
        self.bits_read += 1;
        Ok(Some((self.current >> self.remaining) & 1 == 1))
    }

    /// Reads `n` bits (at most 32) as an unsigned value. Returns `None` if the
    /// stream runs out first; the bits consumed up to that point are lost.
    pub fn read_bits(&mut self, n: u32) -> io::Result<Option<u32>> {
        assert!(n <= 32, "cannot read {} bits into a u32", n);
        let mut value = 0u32;
        for _ in 0..n {
            match self.read_bit()? {
                Some(bit) => value = (value << 1) | u32::from(bit),
                None => return Ok(None),
            }
        }
        Ok(Some(value))
    }
}

/// Packs bits into bytes, most significant bit first.
///
/// Call [`BitWriter::finish`] to write the trailing partial byte; dropping the
/// writer releases the handle but discards any unfinished byte.
pub struct BitWriter<W: Write> {
    inner: W,
    current: u8,
    filled: u8,
    bits_written: u64,
}

impl BitWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(BitWriter::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        BitWriter {
            inner,
            current: 0,
            filled: 0,
            bits_written: 0,
        }
    }

    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    pub fn write_bit(&mut self, bit: bool) -> io::Result<()> {
        if bit {
            self.current |= 1 << (7 - self.filled);
        }
        self.filled += 1;
        self.bits_written += 1;
        if self.filled == 8 {
            self.flush_byte()?;
        }
        Ok(())
    }

    /// Writes the low `n` bits of `value` (at most 32), most significant first.
    pub fn write_bits(&mut self, value: u32, n: u32) -> io::Result<()> {
        assert!(n <= 32, "cannot write {} bits from a u32", n);
        for shift in (0..n).rev() {
            self.write_bit((value >> shift) & 1 == 1)?;
        }
        Ok(())
    }

    fn flush_byte(&mut self) -> io::Result<()> {
        self.inner.write_all(&[self.current])?;
        self.current = 0;
        self.filled = 0;
        Ok(())
    }

    /// Zero-pads the last byte, flushes, and hands back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.filled > 0 {
            self.flush_byte()?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}
