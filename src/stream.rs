//! Stream abstraction: byte cursors plus the bit-restreamed view.
//!
//! Parsing reads from any `Read + Seek`, building writes to any
//! `Write + Seek`. A bit region (see [`bitwise`](crate::adapters::bitwise))
//! is presented through [`RestreamedReader`]/[`RestreamedWriter`], which
//! translate between the byte substrate and a one-byte-per-bit view so the
//! same stream API serves both granularities.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::Error;

pub trait ReadStream: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadStream for T {}

pub trait WriteStream: Write + Seek {}
impl<T: Write + Seek + ?Sized> WriteStream for T {}

/// Read exactly `n` bytes; a short read is a `stream` error.
pub fn read_exact(r: &mut dyn ReadStream, n: usize, path: &str) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)
        .map_err(|e| Error::stream(path, format!("reading {n} bytes: {e}")))?;
    Ok(buf)
}

/// Read until end of stream.
pub fn read_all(r: &mut dyn ReadStream, path: &str) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)
        .map_err(|e| Error::stream(path, format!("reading to end: {e}")))?;
    Ok(buf)
}

pub fn write_bytes(w: &mut dyn WriteStream, data: &[u8], path: &str) -> Result<(), Error> {
    w.write_all(data)
        .map_err(|e| Error::stream(path, format!("writing {} bytes: {e}", data.len())))
}

pub fn tell_read(r: &mut dyn ReadStream, path: &str) -> Result<u64, Error> {
    r.stream_position()
        .map_err(|e| Error::stream(path, format!("tell: {e}")))
}

pub fn tell_write(w: &mut dyn WriteStream, path: &str) -> Result<u64, Error> {
    w.stream_position()
        .map_err(|e| Error::stream(path, format!("tell: {e}")))
}

pub fn seek_read(r: &mut dyn ReadStream, to: SeekFrom, path: &str) -> Result<u64, Error> {
    r.seek(to)
        .map_err(|e| Error::stream(path, format!("seek: {e}")))
}

pub fn seek_write(w: &mut dyn WriteStream, to: SeekFrom, path: &str) -> Result<u64, Error> {
    w.seek(to)
        .map_err(|e| Error::stream(path, format!("seek: {e}")))
}

/// Expand bytes into one byte per bit, MSB first: `0xbe` becomes
/// `[1,0,1,1,1,1,1,0]`.
pub fn bytes_to_bits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 8);
    for &b in data {
        for shift in (0..8).rev() {
            out.push((b >> shift) & 1);
        }
    }
    out
}

/// Pack a one-byte-per-bit buffer back into bytes, MSB first. Length must
/// be a multiple of 8.
pub fn bits_to_bytes(bits: &[u8], path: &str) -> Result<Vec<u8>, Error> {
    if bits.len() % 8 != 0 {
        return Err(Error::alignment(
            path,
            format!("bit region of {} bits is not byte aligned", bits.len()),
        ));
    }
    Ok(pack_bits(bits))
}

fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u8, |acc, &bit| (acc << 1) | (bit != 0) as u8)
        })
        .collect()
}

/// Reverse the bit order inside each byte.
pub fn swap_bits_per_byte(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.reverse_bits()).collect()
}

/// Per-chunk translation applied by the restreamed adapters. Input is always
/// exactly the configured unit length.
pub type ChunkFn = fn(&[u8]) -> Vec<u8>;

pub(crate) fn expand_chunk(chunk: &[u8]) -> Vec<u8> {
    bytes_to_bits(chunk)
}

pub(crate) fn pack_chunk(chunk: &[u8]) -> Vec<u8> {
    pack_bits(chunk)
}

pub(crate) fn swap_chunk(chunk: &[u8]) -> Vec<u8> {
    swap_bits_per_byte(chunk)
}

/// Read-side chunked translation: pulls `unit` bytes at a time from the
/// substrate and serves the decoded expansion.
///
/// Seeking is not supported beyond position queries; backtracking combinators
/// cannot rewind a restreamed region.
pub struct RestreamedReader<'a> {
    inner: &'a mut dyn ReadStream,
    decode: ChunkFn,
    unit: usize,
    buf: Vec<u8>,
    consumed: usize,
    offset: u64,
}

impl<'a> RestreamedReader<'a> {
    pub fn new(inner: &'a mut dyn ReadStream, decode: ChunkFn, unit: usize) -> Self {
        debug_assert!(unit > 0);
        RestreamedReader { inner, decode, unit, buf: Vec::new(), consumed: 0, offset: 0 }
    }
}

impl Read for RestreamedReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.buf.len() - self.consumed < out.len() {
            let mut chunk = vec![0u8; self.unit];
            match self.inner.read_exact(&mut chunk) {
                Ok(()) => self.buf.extend((self.decode)(&chunk)),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
        let available = self.buf.len() - self.consumed;
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.buf[self.consumed..self.consumed + n]);
        self.consumed += n;
        self.offset += n as u64;
        if self.consumed == self.buf.len() {
            self.buf.clear();
            self.consumed = 0;
        }
        Ok(n)
    }
}

impl Seek for RestreamedReader<'_> {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        match to {
            SeekFrom::Current(0) => Ok(self.offset),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "restreamed region cannot seek",
            )),
        }
    }
}

/// Write-side chunked translation: buffers decoded-view bytes and flushes
/// every complete `unit` through the encoder to the substrate.
pub struct RestreamedWriter<'a> {
    inner: &'a mut dyn WriteStream,
    encode: ChunkFn,
    unit: usize,
    pending: Vec<u8>,
    offset: u64,
}

impl<'a> RestreamedWriter<'a> {
    pub fn new(inner: &'a mut dyn WriteStream, encode: ChunkFn, unit: usize) -> Self {
        debug_assert!(unit > 0);
        RestreamedWriter { inner, encode, unit, pending: Vec::new(), offset: 0 }
    }

    /// Close the region. Residual bytes that do not fill a whole unit mean
    /// the wrapped construct was not aligned to the substrate granularity.
    pub fn finish(self, path: &str) -> Result<(), Error> {
        if !self.pending.is_empty() {
            return Err(Error::alignment(
                path,
                format!(
                    "bit region left {} trailing bits, not a multiple of {}",
                    self.pending.len(),
                    self.unit
                ),
            ));
        }
        Ok(())
    }
}

impl Write for RestreamedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(data);
        self.offset += data.len() as u64;
        while self.pending.len() >= self.unit {
            let encoded = (self.encode)(&self.pending[..self.unit]);
            self.inner.write_all(&encoded)?;
            self.pending.drain(..self.unit);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for RestreamedWriter<'_> {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        match to {
            SeekFrom::Current(0) => Ok(self.offset),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "restreamed region cannot seek",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bits_round_trip() {
        let data = [0xbe, 0xef];
        let bits = bytes_to_bits(&data);
        assert_eq!(bits.len(), 16);
        assert_eq!(&bits[..8], &[1, 0, 1, 1, 1, 1, 1, 0]);
        assert_eq!(bits_to_bytes(&bits, "(test)").unwrap(), data);
    }

    #[test]
    fn unaligned_bits_rejected() {
        let err = bits_to_bytes(&[1, 0, 1], "(test)").unwrap_err();
        assert!(matches!(err, Error::Alignment { .. }));
    }

    #[test]
    fn restreamed_reader_expands_on_demand() {
        let mut inner = Cursor::new(vec![0b1010_0000u8]);
        let mut r = RestreamedReader::new(&mut inner, expand_chunk, 1);
        let mut bits = [0u8; 4];
        r.read_exact(&mut bits).unwrap();
        assert_eq!(bits, [1, 0, 1, 0]);
    }

    #[test]
    fn restreamed_writer_packs_and_reports_residual() {
        let mut out = Cursor::new(Vec::new());
        {
            let mut w = RestreamedWriter::new(&mut out, pack_chunk, 8);
            w.write_all(&[1, 0, 1, 1, 1, 1, 1, 0]).unwrap();
            w.finish("(test)").unwrap();
        }
        assert_eq!(out.into_inner(), vec![0xbe]);

        let mut out = Cursor::new(Vec::new());
        let mut w = RestreamedWriter::new(&mut out, pack_chunk, 8);
        w.write_all(&[1, 0, 1]).unwrap();
        assert!(matches!(w.finish("(test)").unwrap_err(), Error::Alignment { .. }));
    }

    #[test]
    fn bit_swap_per_byte() {
        assert_eq!(swap_bits_per_byte(&[0b1000_0000]), vec![0b0000_0001]);
    }
}
