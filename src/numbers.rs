//! Numeric fields: the fixed-width integer grid, IEEE floats, length-prefix
//! friendly variable-length integers, and bit-granular integers.

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

use crate::context::Context;
use crate::core::{Con, Construct};
use crate::error::Error;
use crate::stream::{read_exact, write_bytes, ReadStream, WriteStream};
use crate::value::Value;

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
    Native,
}

fn decode_uint(buf: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Big => BigEndian::read_uint(buf, buf.len()),
        Endian::Little => LittleEndian::read_uint(buf, buf.len()),
        Endian::Native => NativeEndian::read_uint(buf, buf.len()),
    }
}

fn decode_int(buf: &[u8], endian: Endian) -> i64 {
    match endian {
        Endian::Big => BigEndian::read_int(buf, buf.len()),
        Endian::Little => LittleEndian::read_int(buf, buf.len()),
        Endian::Native => NativeEndian::read_int(buf, buf.len()),
    }
}

fn encode_uint(v: u64, width: usize, endian: Endian) -> Vec<u8> {
    let mut buf = vec![0u8; width];
    match endian {
        Endian::Big => BigEndian::write_uint(&mut buf, v, width),
        Endian::Little => LittleEndian::write_uint(&mut buf, v, width),
        Endian::Native => NativeEndian::write_uint(&mut buf, v, width),
    }
    buf
}

fn encode_int(v: i64, width: usize, endian: Endian) -> Vec<u8> {
    let mut buf = vec![0u8; width];
    match endian {
        Endian::Big => BigEndian::write_int(&mut buf, v, width),
        Endian::Little => LittleEndian::write_int(&mut buf, v, width),
        Endian::Native => NativeEndian::write_int(&mut buf, v, width),
    }
    buf
}

fn uint_fits(v: u64, width: usize) -> bool {
    width >= 8 || v < (1u64 << (width * 8))
}

fn int_fits(v: i64, width: usize) -> bool {
    if width >= 8 {
        return true;
    }
    let half = 1i64 << (width * 8 - 1);
    v >= -half && v < half
}

/// Fixed-width integer field.
#[derive(Debug)]
struct FixedInt {
    width: usize,
    signed: bool,
    endian: Endian,
}

impl Construct for FixedInt {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let buf = read_exact(stream, self.width, path)?;
        Ok(if self.signed {
            Value::Int(decode_int(&buf, self.endian))
        } else {
            Value::Uint(decode_uint(&buf, self.endian))
        })
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let buf = if self.signed {
            let v = value
                .as_i64()
                .ok_or_else(|| Error::format(path, format!("expected integer, got {}", value.kind())))?;
            if !int_fits(v, self.width) {
                return Err(Error::format(
                    path,
                    format!("{v} does not fit a signed {}-byte field", self.width),
                ));
            }
            encode_int(v, self.width, self.endian)
        } else {
            let v = value
                .as_u64()
                .ok_or_else(|| Error::format(path, format!("expected unsigned integer, got {}", value.kind())))?;
            if !uint_fits(v, self.width) {
                return Err(Error::format(
                    path,
                    format!("{v} does not fit an unsigned {}-byte field", self.width),
                ));
            }
            encode_uint(v, self.width, self.endian)
        };
        write_bytes(stream, &buf, path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(self.width as u64)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

/// Integer field of `width` bytes (1..=8).
pub fn fixed_int(width: usize, signed: bool, endian: Endian) -> Con {
    assert!((1..=8).contains(&width), "integer width {width} not in 1..=8 bytes");
    Con::new(FixedInt { width, signed, endian })
}

macro_rules! int_aliases {
    ($($fn_name:ident => $width:expr, $signed:expr, $endian:expr;)*) => {
        $(pub fn $fn_name() -> Con {
            fixed_int($width, $signed, $endian)
        })*
    };
}

int_aliases! {
    int8ub => 1, false, Endian::Big;
    int8ul => 1, false, Endian::Little;
    int8un => 1, false, Endian::Native;
    int8sb => 1, true, Endian::Big;
    int8sl => 1, true, Endian::Little;
    int8sn => 1, true, Endian::Native;
    int16ub => 2, false, Endian::Big;
    int16ul => 2, false, Endian::Little;
    int16un => 2, false, Endian::Native;
    int16sb => 2, true, Endian::Big;
    int16sl => 2, true, Endian::Little;
    int16sn => 2, true, Endian::Native;
    int24ub => 3, false, Endian::Big;
    int24ul => 3, false, Endian::Little;
    int24un => 3, false, Endian::Native;
    int24sb => 3, true, Endian::Big;
    int24sl => 3, true, Endian::Little;
    int24sn => 3, true, Endian::Native;
    int32ub => 4, false, Endian::Big;
    int32ul => 4, false, Endian::Little;
    int32un => 4, false, Endian::Native;
    int32sb => 4, true, Endian::Big;
    int32sl => 4, true, Endian::Little;
    int32sn => 4, true, Endian::Native;
    int64ub => 8, false, Endian::Big;
    int64ul => 8, false, Endian::Little;
    int64un => 8, false, Endian::Native;
    int64sb => 8, true, Endian::Big;
    int64sl => 8, true, Endian::Little;
    int64sn => 8, true, Endian::Native;
}

/// Single unsigned byte, the workhorse alias.
pub fn byte() -> Con {
    int8ub()
}

/// IEEE-754 binary float field (2, 4, or 8 bytes).
#[derive(Debug)]
struct FloatField {
    width: usize,
    endian: Endian,
}

impl Construct for FloatField {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let buf = read_exact(stream, self.width, path)?;
        let v = match self.width {
            2 => f16_bits_to_f32(match self.endian {
                Endian::Little => LittleEndian::read_u16(&buf),
                _ => BigEndian::read_u16(&buf),
            }) as f64,
            4 => match self.endian {
                Endian::Little => LittleEndian::read_f32(&buf) as f64,
                _ => BigEndian::read_f32(&buf) as f64,
            },
            _ => match self.endian {
                Endian::Little => LittleEndian::read_f64(&buf),
                _ => BigEndian::read_f64(&buf),
            },
        };
        Ok(Value::Float(v))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let v = value
            .as_f64()
            .ok_or_else(|| Error::format(path, format!("expected float, got {}", value.kind())))?;
        let mut buf = vec![0u8; self.width];
        match self.width {
            2 => {
                let bits = f32_to_f16_bits(v as f32);
                match self.endian {
                    Endian::Little => LittleEndian::write_u16(&mut buf, bits),
                    _ => BigEndian::write_u16(&mut buf, bits),
                }
            }
            4 => match self.endian {
                Endian::Little => LittleEndian::write_f32(&mut buf, v as f32),
                _ => BigEndian::write_f32(&mut buf, v as f32),
            },
            _ => match self.endian {
                Endian::Little => LittleEndian::write_f64(&mut buf, v),
                _ => BigEndian::write_f64(&mut buf, v),
            },
        }
        write_bytes(stream, &buf, path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(self.width as u64)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

macro_rules! float_aliases {
    ($($fn_name:ident => $width:expr, $endian:expr;)*) => {
        $(pub fn $fn_name() -> Con {
            Con::new(FloatField { width: $width, endian: $endian })
        })*
    };
}

float_aliases! {
    float16b => 2, Endian::Big;
    float16l => 2, Endian::Little;
    float32b => 4, Endian::Big;
    float32l => 4, Endian::Little;
    float64b => 8, Endian::Big;
    float64l => 8, Endian::Little;
}

// byteorder stops at binary32/64; half precision is converted by hand.
fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0f32 } else { 1.0 };
    let exp = (bits >> 10) & 0x1f;
    let frac = (bits & 0x3ff) as f32;
    match (exp, frac as u16) {
        (0, 0) => sign * 0.0,
        (0, _) => sign * frac * (-24f32).exp2(),
        (0x1f, 0) => sign * f32::INFINITY,
        (0x1f, _) => f32::NAN,
        _ => sign * (1.0 + frac / 1024.0) * ((exp as i32 - 15) as f32).exp2(),
    }
}

fn f32_to_f16_bits(value: f32) -> u16 {
    let x = value.to_bits();
    let sign = ((x >> 16) & 0x8000) as u16;
    let exp = ((x >> 23) & 0xff) as i32;
    let frac = x & 0x7f_ffff;
    if exp == 0xff {
        // infinity keeps zero fraction, NaN keeps a quiet bit
        return sign | 0x7c00 | if frac != 0 { 0x200 } else { 0 };
    }
    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign | 0x7c00;
    }
    if unbiased < -14 {
        if unbiased < -25 {
            return sign;
        }
        // subnormal half
        let frac = frac | 0x80_0000;
        let shift = (-14 - unbiased + 13) as u32;
        let half = (frac >> shift) as u16;
        let round = (frac >> (shift - 1)) & 1;
        return sign | (half + round as u16);
    }
    let half = sign | (((unbiased + 15) as u16) << 10) | ((frac >> 13) as u16);
    if frac & 0x1000 != 0 {
        half + 1
    } else {
        half
    }
}

/// Unsigned base-128 variable-length integer: 7 bits per byte, continuation
/// in the MSB, least significant group first.
#[derive(Debug)]
struct VarInt;

impl Construct for VarInt {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut acc: u128 = 0;
        for i in 0.. {
            if i >= 10 {
                return Err(Error::format(path, "varint longer than 10 bytes"));
            }
            let b = read_exact(stream, 1, path)?[0];
            acc |= ((b & 0x7f) as u128) << (7 * i);
            if b & 0x80 == 0 {
                break;
            }
        }
        u64::try_from(acc)
            .map(Value::Uint)
            .map_err(|_| Error::format(path, "varint exceeds 64 bits"))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut v = value
            .as_u64()
            .ok_or_else(|| Error::format(path, format!("expected unsigned integer, got {}", value.kind())))?;
        let mut out = Vec::with_capacity(10);
        loop {
            let group = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(group);
                break;
            }
            out.push(group | 0x80);
        }
        write_bytes(stream, &out, path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "varint length depends on the value"))
    }
}

pub fn varint() -> Con {
    Con::new(VarInt)
}

/// Signed zig-zag variable-length integer over [`varint`].
#[derive(Debug)]
struct ZigZag;

impl Construct for ZigZag {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = VarInt.decode(stream, ctx, path)?;
        let n = n.as_u64().ok_or_else(|| Error::format(path, "varint decode"))?;
        Ok(Value::Int(((n >> 1) as i64) ^ -((n & 1) as i64)))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let v = value
            .as_i64()
            .ok_or_else(|| Error::format(path, format!("expected integer, got {}", value.kind())))?;
        let encoded = ((v << 1) ^ (v >> 63)) as u64;
        VarInt.encode(&Value::Uint(encoded), stream, ctx, path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "zigzag length depends on the value"))
    }
}

pub fn zigzag() -> Con {
    Con::new(ZigZag)
}

/// Big-endian (or byte-swapped) integer of an arbitrary byte width.
#[derive(Debug)]
struct BytesInt {
    width: usize,
    signed: bool,
    swapped: bool,
}

impl Construct for BytesInt {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut buf = read_exact(stream, self.width, path)?;
        if self.swapped {
            buf.reverse();
        }
        Ok(if self.signed {
            Value::Int(decode_int(&buf, Endian::Big))
        } else {
            Value::Uint(decode_uint(&buf, Endian::Big))
        })
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut buf = if self.signed {
            let v = value
                .as_i64()
                .ok_or_else(|| Error::format(path, format!("expected integer, got {}", value.kind())))?;
            if !int_fits(v, self.width) {
                return Err(Error::format(path, format!("{v} does not fit {} bytes", self.width)));
            }
            encode_int(v, self.width, Endian::Big)
        } else {
            let v = value
                .as_u64()
                .ok_or_else(|| Error::format(path, format!("expected unsigned integer, got {}", value.kind())))?;
            if !uint_fits(v, self.width) {
                return Err(Error::format(path, format!("{v} does not fit {} bytes", self.width)));
            }
            encode_uint(v, self.width, Endian::Big)
        };
        if self.swapped {
            buf.reverse();
        }
        write_bytes(stream, &buf, path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(self.width as u64)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

/// Integer stored as `width` raw bytes, big-endian unless `swapped`.
pub fn bytes_int(width: usize, signed: bool, swapped: bool) -> Con {
    assert!((1..=8).contains(&width), "bytes_int width {width} not in 1..=8");
    Con::new(BytesInt { width, signed, swapped })
}

/// Integer of `bits` bits; usable only inside a bit region (see
/// [`bitwise`](crate::adapters::bitwise)).
#[derive(Debug)]
struct BitsInt {
    bits: usize,
    signed: bool,
    swapped: bool,
}

impl Construct for BitsInt {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut raw = read_exact(stream, self.bits, path)?;
        if self.swapped {
            if self.bits % 8 != 0 {
                return Err(Error::alignment(path, "swapped bit field must be a whole number of bytes"));
            }
            raw = raw.chunks(8).rev().flatten().copied().collect();
        }
        let acc = raw.iter().fold(0u64, |acc, &bit| (acc << 1) | (bit != 0) as u64);
        Ok(if self.signed && self.bits < 64 && acc >> (self.bits - 1) & 1 == 1 {
            Value::Int((acc | !((1u64 << self.bits) - 1)) as i64)
        } else if self.signed {
            Value::Int(acc as i64)
        } else {
            Value::Uint(acc)
        })
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let acc = if self.signed {
            let v = value
                .as_i64()
                .ok_or_else(|| Error::format(path, format!("expected integer, got {}", value.kind())))?;
            let half = 1i64 << (self.bits - 1);
            if self.bits < 64 && (v < -half || v >= half) {
                return Err(Error::format(path, format!("{v} does not fit {} bits", self.bits)));
            }
            v as u64
        } else {
            let v = value
                .as_u64()
                .ok_or_else(|| Error::format(path, format!("expected unsigned integer, got {}", value.kind())))?;
            if self.bits < 64 && v >= (1u64 << self.bits) {
                return Err(Error::format(path, format!("{v} does not fit {} bits", self.bits)));
            }
            v
        };
        let mut raw: Vec<u8> = (0..self.bits)
            .rev()
            .map(|i| ((acc >> i) & 1) as u8)
            .collect();
        if self.swapped {
            if self.bits % 8 != 0 {
                return Err(Error::alignment(path, "swapped bit field must be a whole number of bytes"));
            }
            raw = raw.chunks(8).rev().flatten().copied().collect();
        }
        write_bytes(stream, &raw, path)?;
        Ok(value.clone())
    }

    // Inside a bit region sizes are measured in bits.
    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(self.bits as u64)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

/// Unsigned integer of `bits` bits, MSB first.
pub fn bits_int(bits: usize) -> Con {
    bits_integer(bits, false, false)
}

pub fn bits_integer(bits: usize, signed: bool, swapped: bool) -> Con {
    assert!((1..=64).contains(&bits), "bit field width {bits} not in 1..=64");
    Con::new(BitsInt { bits, signed, swapped })
}

/// One bit.
pub fn bit() -> Con {
    bits_int(1)
}

/// Four bits.
pub fn nibble() -> Con {
    bits_int(4)
}

/// Eight bits.
pub fn octet() -> Con {
    bits_int(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_round_trips_simple_values() {
        for v in [0.0f32, 1.0, -1.0, 1.5, 0.5, 2.0, -0.25, 65504.0] {
            let bits = f32_to_f16_bits(v);
            assert_eq!(f16_bits_to_f32(bits), v, "value {v}");
        }
    }

    #[test]
    fn f16_overflow_becomes_infinity() {
        let bits = f32_to_f16_bits(1.0e6);
        assert!(f16_bits_to_f32(bits).is_infinite());
    }
}
