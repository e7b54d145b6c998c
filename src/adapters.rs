//! Adapter and wrapper constructs: value mappings, length prefixes,
//! terminators, padding, and stream transformations (bit regions, swaps).

use std::collections::HashMap;
use std::io::{Cursor, SeekFrom};

use crate::composite::array;
use crate::context::Context;
use crate::core::{Con, Construct};
use crate::error::Error;
use crate::expr::Expr;
use crate::stream::{
    expand_chunk, pack_chunk, read_exact, seek_read, swap_chunk, tell_read, tell_write,
    write_bytes, ChunkFn, ReadStream, RestreamedReader, RestreamedWriter, WriteStream,
};
use crate::value::{Record, Value};

/// Integer-to-symbol mapping. Unknown integers pass through on parse;
/// unknown names on build are mapping errors.
#[derive(Debug)]
struct SymbolMap {
    subcon: Con,
    by_name: HashMap<String, i64>,
    by_value: HashMap<i64, String>,
}

impl Construct for SymbolMap {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let raw = self.subcon.decode(stream, ctx, path)?;
        let n = raw
            .as_i64()
            .ok_or_else(|| Error::format(path, format!("symbol map over non-integer {}", raw.kind())))?;
        Ok(match self.by_value.get(&n) {
            Some(name) => Value::Symbol { name: name.clone(), value: n },
            None => raw,
        })
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = match value {
            Value::Str(name) => *self
                .by_name
                .get(name)
                .ok_or_else(|| Error::mapping(path, format!("unknown symbol {name:?}")))?,
            Value::Symbol { value, .. } => *value,
            other => other
                .as_i64()
                .ok_or_else(|| Error::mapping(path, format!("cannot map {} to an integer", other.kind())))?,
        };
        self.subcon.encode(&Value::Int(n), stream, ctx, path)?;
        Ok(value.clone())
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

/// Map parsed integers to named symbols: `symbol_map(byte(), [("g", 8), ("h", 11)])`.
pub fn symbol_map<S: Into<String>>(
    subcon: Con,
    mapping: impl IntoIterator<Item = (S, i64)>,
) -> Con {
    let mut by_name = HashMap::new();
    let mut by_value = HashMap::new();
    for (name, value) in mapping {
        let name = name.into();
        by_value.entry(value).or_insert_with(|| name.clone());
        by_name.insert(name, value);
    }
    Con::new(SymbolMap { subcon, by_name, by_value })
}

/// Bitfield decomposition: the parsed integer becomes a record of booleans,
/// one per declared flag. Undeclared bits are dropped when building from a
/// record.
#[derive(Debug)]
struct FlagsMap {
    subcon: Con,
    flags: Vec<(String, u64)>,
}

impl Construct for FlagsMap {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let raw = self.subcon.decode(stream, ctx, path)?;
        let n = raw
            .as_u64()
            .ok_or_else(|| Error::format(path, format!("flags over non-integer {}", raw.kind())))?;
        let mut out = Record::new();
        for (name, mask) in &self.flags {
            out.insert(name.clone(), Value::Bool(n & mask != 0));
        }
        out.insert("_flags", Value::Bool(true));
        Ok(Value::Record(out))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = match value {
            Value::Record(r) => {
                let mut acc = 0u64;
                for (name, v) in r.iter() {
                    if name.starts_with('_') {
                        continue;
                    }
                    let mask = self
                        .flags
                        .iter()
                        .find(|(f, _)| f == name)
                        .map(|(_, m)| *m)
                        .ok_or_else(|| Error::mapping(path, format!("unknown flag {name:?}")))?;
                    if v.truthy() {
                        acc |= mask;
                    }
                }
                acc
            }
            other => other
                .as_u64()
                .ok_or_else(|| Error::mapping(path, format!("cannot build flags from {}", other.kind())))?,
        };
        self.subcon.encode(&Value::Uint(n), stream, ctx, path)?;
        Ok(value.clone())
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

/// Decompose an integer field into named bit flags:
/// `flags_map(byte(), [("fin", 0x01), ("ack", 0x10)])`.
pub fn flags_map<S: Into<String>>(
    subcon: Con,
    flags: impl IntoIterator<Item = (S, u64)>,
) -> Con {
    Con::new(FlagsMap {
        subcon,
        flags: flags.into_iter().map(|(n, m)| (n.into(), m)).collect(),
    })
}

/// Length-prefixed field: build renders the payload first, then writes its
/// byte count with `length_con`; parse bounds the payload to the announced
/// window.
#[derive(Debug)]
struct Prefixed {
    length_con: Con,
    subcon: Con,
    include_length: bool,
}

impl Construct for Prefixed {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let announced = self
            .length_con
            .decode(stream, ctx, path)?
            .as_u64()
            .ok_or_else(|| Error::format(path, "length prefix is not an unsigned integer"))?;
        let announced = if self.include_length {
            let own = self.length_con.extent(ctx, path)?;
            announced
                .checked_sub(own)
                .ok_or_else(|| Error::format(path, "length prefix smaller than its own size"))?
        } else {
            announced
        };
        let n = usize::try_from(announced)
            .map_err(|_| Error::format(path, format!("length prefix {announced} exceeds usize")))?;
        let window = read_exact(stream, n, path)?;
        let mut sub = Cursor::new(window);
        self.subcon.decode(&mut sub, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut scratch = Cursor::new(Vec::new());
        let echoed = self.subcon.encode(value, &mut scratch, ctx, path)?;
        let data = scratch.into_inner();
        let mut n = data.len() as u64;
        if self.include_length {
            n += self.length_con.extent(ctx, path)?;
        }
        self.length_con.encode(&Value::Uint(n), stream, ctx, path)?;
        write_bytes(stream, &data, path)?;
        Ok(echoed)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let prefix = self.length_con.extent(ctx, path)?;
        let payload = self.subcon.extent(ctx, path)?;
        Ok(prefix + payload)
    }
}

pub fn prefixed(length_con: Con, subcon: Con) -> Con {
    Con::new(Prefixed { length_con, subcon, include_length: false })
}

/// Variant where the announced length covers the length field itself.
pub fn prefixed_inclusive(length_con: Con, subcon: Con) -> Con {
    Con::new(Prefixed { length_con, subcon, include_length: true })
}

/// Count-prefixed homogeneous list.
#[derive(Debug)]
struct PrefixedArray {
    count_con: Con,
    subcon: Con,
}

impl Construct for PrefixedArray {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self
            .count_con
            .decode(stream, ctx, path)?
            .as_u64()
            .ok_or_else(|| Error::format(path, "count prefix is not an unsigned integer"))?;
        array(Value::Uint(n), self.subcon.clone()).decode(stream, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let items = value
            .as_list()
            .ok_or_else(|| Error::format(path, format!("expected a list, got {}", value.kind())))?;
        self.count_con
            .encode(&Value::Uint(items.len() as u64), stream, ctx, path)?;
        array(Value::Uint(items.len() as u64), self.subcon.clone()).encode(value, stream, ctx, path)
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "item count is read from the stream"))
    }
}

pub fn prefixed_array(count_con: Con, subcon: Con) -> Con {
    Con::new(PrefixedArray { count_con, subcon })
}

/// Terminator-delimited field. The subconstruct parses the bytes before the
/// terminator (including it when `include`); the terminator unit is consumed
/// unless `consume` is false.
#[derive(Debug)]
struct NullTerminated {
    subcon: Con,
    term: Vec<u8>,
    include: bool,
    consume: bool,
    require: bool,
}

impl Construct for NullTerminated {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let unit = self.term.len();
        let mut data = Vec::new();
        let mut found = false;
        loop {
            let mut chunk = vec![0u8; unit];
            match stream.read_exact(&mut chunk) {
                Ok(()) => {
                    if chunk == self.term {
                        found = true;
                        break;
                    }
                    data.extend_from_slice(&chunk);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if self.require {
                        return Err(Error::terminator(
                            path,
                            format!("terminator {:02x?} not found before end of stream", self.term),
                        ));
                    }
                    break;
                }
                Err(e) => return Err(Error::stream(path, format!("scanning for terminator: {e}"))),
            }
        }
        if found && !self.consume {
            seek_read(stream, SeekFrom::Current(-(unit as i64)), path)?;
        }
        if found && self.include {
            data.extend_from_slice(&self.term);
        }
        let mut sub = Cursor::new(data);
        self.subcon.decode(&mut sub, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let echoed = self.subcon.encode(value, stream, ctx, path)?;
        write_bytes(stream, &self.term, path)?;
        Ok(echoed)
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "terminated field has no fixed size"))
    }
}

pub fn null_terminated(subcon: Con) -> Con {
    null_terminated_opts(subcon, b"\x00".to_vec(), false, true, true)
}

pub fn null_terminated_opts(
    subcon: Con,
    term: Vec<u8>,
    include: bool,
    consume: bool,
    require: bool,
) -> Con {
    assert!(!term.is_empty(), "terminator must be at least one byte");
    Con::new(NullTerminated { subcon, term, include, consume, require })
}

/// Pad the subconstruct out to an alignment boundary. Parse verifies the
/// pad bytes against the pattern.
#[derive(Debug)]
struct Aligned {
    modulus: Expr,
    subcon: Con,
    pattern: u8,
}

impl Aligned {
    fn pad_for(&self, consumed: u64, modulus: u64, path: &str) -> Result<u64, Error> {
        if modulus < 2 {
            return Err(Error::format(path, "alignment modulus must be at least 2"));
        }
        Ok((modulus - consumed % modulus) % modulus)
    }
}

impl Construct for Aligned {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let modulus = self.modulus.eval_u64(ctx, path)?;
        let start = tell_read(stream, path)?;
        let v = self.subcon.decode(stream, ctx, path)?;
        let consumed = tell_read(stream, path)? - start;
        let pad = self.pad_for(consumed, modulus, path)?;
        let got = read_exact(stream, pad as usize, path)?;
        if got.iter().any(|&b| b != self.pattern) {
            return Err(Error::padding(
                path,
                format!("alignment bytes do not match pattern {:#04x}", self.pattern),
            ));
        }
        Ok(v)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let modulus = self.modulus.eval_u64(ctx, path)?;
        let start = tell_write(stream, path)?;
        let echoed = self.subcon.encode(value, stream, ctx, path)?;
        let written = tell_write(stream, path)? - start;
        let pad = self.pad_for(written, modulus, path)?;
        write_bytes(stream, &vec![self.pattern; pad as usize], path)?;
        Ok(echoed)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let modulus = self.modulus.eval_u64(ctx, path).map_err(Error::for_sizing)?;
        let inner = self.subcon.extent(ctx, path)?;
        let pad = self.pad_for(inner, modulus, path)?;
        Ok(inner + pad)
    }

    fn is_fixed_size(&self) -> bool {
        self.modulus.is_const() && self.subcon.is_fixed_size()
    }
}

pub fn aligned(modulus: impl Into<Expr>, subcon: Con) -> Con {
    Con::new(Aligned { modulus: modulus.into(), subcon, pattern: 0 })
}

pub fn aligned_pattern(modulus: impl Into<Expr>, subcon: Con, pattern: u8) -> Con {
    Con::new(Aligned { modulus: modulus.into(), subcon, pattern })
}

/// Pad the subconstruct out to a fixed total length.
#[derive(Debug)]
struct Padded {
    length: Expr,
    subcon: Con,
    pattern: u8,
}

impl Construct for Padded {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let total = self.length.eval_u64(ctx, path)?;
        let start = tell_read(stream, path)?;
        let v = self.subcon.decode(stream, ctx, path)?;
        let consumed = tell_read(stream, path)? - start;
        if consumed > total {
            return Err(Error::padding(
                path,
                format!("content of {consumed} bytes exceeds padded length {total}"),
            ));
        }
        let got = read_exact(stream, (total - consumed) as usize, path)?;
        if got.iter().any(|&b| b != self.pattern) {
            return Err(Error::padding(
                path,
                format!("pad bytes do not match pattern {:#04x}", self.pattern),
            ));
        }
        Ok(v)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let total = self.length.eval_u64(ctx, path)?;
        let start = tell_write(stream, path)?;
        let echoed = self.subcon.encode(value, stream, ctx, path)?;
        let written = tell_write(stream, path)? - start;
        if written > total {
            return Err(Error::padding(
                path,
                format!("content of {written} bytes exceeds padded length {total}"),
            ));
        }
        write_bytes(stream, &vec![self.pattern; (total - written) as usize], path)?;
        Ok(echoed)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.length.eval_u64(ctx, path).map_err(Error::for_sizing)
    }

    fn is_fixed_size(&self) -> bool {
        self.length.is_const()
    }
}

pub fn padded(length: impl Into<Expr>, subcon: Con) -> Con {
    Con::new(Padded { length: length.into(), subcon, pattern: 0 })
}

pub fn padded_pattern(length: impl Into<Expr>, subcon: Con, pattern: u8) -> Con {
    Con::new(Padded { length: length.into(), subcon, pattern })
}

/// Fixed-size whole-region transformation: prefetch, translate, and hand the
/// subconstruct an in-memory window. Fully seekable within the region.
#[derive(Debug)]
struct Transformed {
    subcon: Con,
    decode: ChunkFn,
    parse_size: u64,
    encode: ChunkFn,
    build_size: u64,
}

impl Construct for Transformed {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let raw = read_exact(stream, self.parse_size as usize, path)?;
        let mut sub = Cursor::new((self.decode)(&raw));
        self.subcon.decode(&mut sub, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut scratch = Cursor::new(Vec::new());
        let echoed = self.subcon.encode(value, &mut scratch, ctx, path)?;
        let data = scratch.into_inner();
        if data.len() as u64 != self.build_size {
            return Err(Error::format(
                path,
                format!("transformed region built {} bytes, expected {}", data.len(), self.build_size),
            ));
        }
        write_bytes(stream, &(self.encode)(&data), path)?;
        Ok(echoed)
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(self.parse_size)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

/// Apply a byte-level translation over a fixed-size region before/after the
/// subconstruct.
pub fn transformed(
    subcon: Con,
    decode: ChunkFn,
    parse_size: u64,
    encode: ChunkFn,
    build_size: u64,
) -> Con {
    Con::new(Transformed { subcon, decode, parse_size, encode, build_size })
}

/// Outer-size computation for a restreamed region, from the subconstruct's
/// inner size.
type SizeMap = fn(u64, &str) -> Result<u64, Error>;

/// Variable-size chunked stream translation; see
/// [`RestreamedReader`]/[`RestreamedWriter`] for the mechanics and their
/// seeking limits.
#[derive(Debug)]
struct RestreamedCon {
    subcon: Con,
    decode: ChunkFn,
    decode_unit: usize,
    encode: ChunkFn,
    encode_unit: usize,
    size_map: SizeMap,
}

impl Construct for RestreamedCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut reader = RestreamedReader::new(stream, self.decode, self.decode_unit);
        self.subcon.decode(&mut reader, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut writer = RestreamedWriter::new(stream, self.encode, self.encode_unit);
        let echoed = self.subcon.encode(value, &mut writer, ctx, path)?;
        writer.finish(path)?;
        Ok(echoed)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let inner = self.subcon.extent(ctx, path)?;
        (self.size_map)(inner, path)
    }
}

/// General chunked restreaming; building flushes whole units eagerly and
/// errors on residual at close.
pub fn restreamed(
    subcon: Con,
    decode: ChunkFn,
    decode_unit: usize,
    encode: ChunkFn,
    encode_unit: usize,
    size_map: SizeMap,
) -> Con {
    Con::new(RestreamedCon { subcon, decode, decode_unit, encode, encode_unit, size_map })
}

fn bits_to_outer_bytes(bits: u64, path: &str) -> Result<u64, Error> {
    if bits % 8 != 0 {
        return Err(Error::alignment(
            path,
            format!("bit region of {bits} bits is not a whole number of bytes"),
        ));
    }
    Ok(bits / 8)
}

fn bytes_to_outer_bits(bytes: u64, _path: &str) -> Result<u64, Error> {
    Ok(bytes * 8)
}

fn identity_size(n: u64, _path: &str) -> Result<u64, Error> {
    Ok(n)
}

/// Present the wrapped construct with a bit-level view (MSB first) of the
/// byte stream. The region must total a whole number of bytes.
///
/// Fixed-size regions are prefetched, so seeking constructs (peek, pointer)
/// work inside them; variable-size regions are restreamed and cannot seek.
pub fn bitwise(subcon: Con) -> Con {
    if subcon.is_fixed_size() {
        if let Ok(bits) = subcon.size_of() {
            assert!(bits % 8 == 0, "bit region of {bits} bits is not a whole number of bytes");
            return transformed(subcon, expand_chunk, bits / 8, pack_chunk, bits);
        }
    }
    restreamed(subcon, expand_chunk, 1, pack_chunk, 8, bits_to_outer_bytes)
}

/// Inside a bit region, present the wrapped construct with plain bytes
/// again. Inverse of [`bitwise`].
pub fn bytewise(subcon: Con) -> Con {
    if subcon.is_fixed_size() {
        if let Ok(bytes) = subcon.size_of() {
            return transformed(subcon, pack_chunk, bytes * 8, expand_chunk, bytes);
        }
    }
    restreamed(subcon, pack_chunk, 8, expand_chunk, 1, bytes_to_outer_bits)
}

fn reverse_chunk(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// Reverse the byte order of the subconstruct's region. Only defined for
/// fixed-size subconstructs; swapping an unbounded region has no coherent
/// semantics.
pub fn byte_swapped(subcon: Con) -> Con {
    assert!(subcon.is_fixed_size(), "byte_swapped requires a fixed-size subconstruct");
    let n = subcon
        .size_of()
        .expect("fixed-size subconstruct reports its size");
    transformed(subcon, reverse_chunk, n, reverse_chunk, n)
}

/// Reverse the bit order within every byte of the subconstruct's region.
pub fn bits_swapped(subcon: Con) -> Con {
    if subcon.is_fixed_size() {
        if let Ok(n) = subcon.size_of() {
            return transformed(subcon, swap_chunk, n, swap_chunk, n);
        }
    }
    restreamed(subcon, swap_chunk, 1, swap_chunk, 1, identity_size)
}

/// Decode the wrapped record inside a bit region: shorthand for
/// `bitwise(record(...))`.
pub fn bit_record(members: impl IntoIterator<Item = Con>) -> Con {
    bitwise(crate::composite::record(members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::greedy_bytes;
    use crate::numbers::{bits_int, byte, int16ub};
    use crate::value::Value;

    #[test]
    fn transformed_reverses_region() {
        let c = byte_swapped(int16ub());
        let v = c.parse(&[0x34, 0x12]).unwrap();
        assert_eq!(v, Value::Uint(0x1234));
        assert_eq!(c.build(&Value::Uint(0x1234)).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn bitwise_variable_region_aligned_build() {
        // greedy bytes inside a bit region: every 8 written bits flush a byte
        let c = bitwise(greedy_bytes());
        let built = c.build(&Value::Bytes(vec![1, 0, 1, 1, 1, 1, 1, 0])).unwrap();
        assert_eq!(built, vec![0xbe]);
    }

    #[test]
    fn bitwise_residual_bits_rejected_on_build() {
        let c = bitwise(greedy_bytes());
        let err = c.build(&Value::Bytes(vec![1, 0, 1])).unwrap_err();
        assert!(matches!(err, Error::Alignment { .. }));
    }

    #[test]
    fn bytewise_round_trip_inside_bit_region() {
        let c = bitwise(crate::composite::sequence([
            bits_int(8),
            bytewise(byte()),
        ]));
        let v = c.parse(&[0x12, 0x34]).unwrap();
        assert_eq!(v, Value::List(vec![Value::Uint(0x12), Value::Uint(0x34)]));
    }
}
