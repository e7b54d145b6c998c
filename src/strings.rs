//! Text fields over a fixed allow-list of encodings.
//!
//! Only encodings whose NUL unit is unambiguous are supported, so padding
//! and termination can respect the codepoint unit size.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::adapters::{null_terminated_opts, prefixed};
use crate::bytes::greedy_bytes;
use crate::context::Context;
use crate::core::{Con, Construct};
use crate::error::Error;
use crate::expr::Expr;
use crate::stream::{read_exact, write_bytes, ReadStream, WriteStream};
use crate::value::Value;

/// Supported text encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Utf8,
    Utf16Be,
    Utf16Le,
    Utf32Be,
    Utf32Le,
    Latin1,
}

impl Encoding {
    /// Bytes per code unit; padding and terminators work in these units.
    pub fn unit_size(self) -> usize {
        match self {
            Encoding::Ascii | Encoding::Utf8 | Encoding::Latin1 => 1,
            Encoding::Utf16Be | Encoding::Utf16Le => 2,
            Encoding::Utf32Be | Encoding::Utf32Le => 4,
        }
    }

    pub fn encode(self, s: &str, path: &str) -> Result<Vec<u8>, Error> {
        match self {
            Encoding::Utf8 => Ok(s.as_bytes().to_vec()),
            Encoding::Ascii => {
                if let Some(c) = s.chars().find(|c| !c.is_ascii()) {
                    return Err(Error::string(path, format!("{c:?} is not ascii")));
                }
                Ok(s.as_bytes().to_vec())
            }
            Encoding::Latin1 => s
                .chars()
                .map(|c| {
                    u8::try_from(c as u32)
                        .map_err(|_| Error::string(path, format!("{c:?} is not latin-1")))
                })
                .collect(),
            Encoding::Utf16Be | Encoding::Utf16Le => {
                let mut out = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    let mut b = [0u8; 2];
                    if self == Encoding::Utf16Be {
                        BigEndian::write_u16(&mut b, unit);
                    } else {
                        LittleEndian::write_u16(&mut b, unit);
                    }
                    out.extend_from_slice(&b);
                }
                Ok(out)
            }
            Encoding::Utf32Be | Encoding::Utf32Le => {
                let mut out = Vec::with_capacity(s.len() * 4);
                for c in s.chars() {
                    let mut b = [0u8; 4];
                    if self == Encoding::Utf32Be {
                        BigEndian::write_u32(&mut b, c as u32);
                    } else {
                        LittleEndian::write_u32(&mut b, c as u32);
                    }
                    out.extend_from_slice(&b);
                }
                Ok(out)
            }
        }
    }

    pub fn decode(self, data: &[u8], path: &str) -> Result<String, Error> {
        match self {
            Encoding::Utf8 => String::from_utf8(data.to_vec())
                .map_err(|e| Error::string(path, format!("invalid utf-8: {e}"))),
            Encoding::Ascii => {
                if let Some(b) = data.iter().find(|b| !b.is_ascii()) {
                    return Err(Error::string(path, format!("byte {b:#04x} is not ascii")));
                }
                Ok(data.iter().map(|&b| b as char).collect())
            }
            Encoding::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
            Encoding::Utf16Be | Encoding::Utf16Le => {
                if data.len() % 2 != 0 {
                    return Err(Error::string(path, "odd byte count for utf-16"));
                }
                let units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|c| {
                        if self == Encoding::Utf16Be {
                            BigEndian::read_u16(c)
                        } else {
                            LittleEndian::read_u16(c)
                        }
                    })
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| Error::string(path, format!("invalid utf-16: {e}")))
            }
            Encoding::Utf32Be | Encoding::Utf32Le => {
                if data.len() % 4 != 0 {
                    return Err(Error::string(path, "byte count not a multiple of 4 for utf-32"));
                }
                data.chunks_exact(4)
                    .map(|c| {
                        let u = if self == Encoding::Utf32Be {
                            BigEndian::read_u32(c)
                        } else {
                            LittleEndian::read_u32(c)
                        };
                        char::from_u32(u)
                            .ok_or_else(|| Error::string(path, format!("invalid scalar {u:#x}")))
                    })
                    .collect()
        }
        }
    }

    fn nul_unit(self) -> Vec<u8> {
        vec![0u8; self.unit_size()]
    }
}

/// Decodes the bytes produced by the wrapped construct into text, and
/// encodes text back into bytes for it.
#[derive(Debug)]
struct StringEncoded {
    subcon: Con,
    encoding: Encoding,
}

impl Construct for StringEncoded {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let v = self.subcon.decode(stream, ctx, path)?;
        let data = v
            .as_bytes()
            .ok_or_else(|| Error::string(path, format!("expected bytes to decode, got {}", v.kind())))?;
        Ok(Value::Str(self.encoding.decode(data, path)?))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let s = value
            .as_str()
            .ok_or_else(|| Error::string(path, format!("expected string, got {}", value.kind())))?;
        let data = self.encoding.encode(s, path)?;
        self.subcon.encode(&Value::Bytes(data), stream, ctx, path)?;
        Ok(value.clone())
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

/// Text until end of stream.
pub fn greedy_string(encoding: Encoding) -> Con {
    Con::new(StringEncoded { subcon: greedy_bytes(), encoding })
}

/// Text terminated by a NUL unit of the encoding's width.
pub fn cstring(encoding: Encoding) -> Con {
    Con::new(StringEncoded {
        subcon: null_terminated_opts(greedy_bytes(), encoding.nul_unit(), false, true, true),
        encoding,
    })
}

/// Text prefixed with its byte count: `pascal_string(byte(), Encoding::Utf8)`.
pub fn pascal_string(length_con: Con, encoding: Encoding) -> Con {
    Con::new(StringEncoded { subcon: prefixed(length_con, greedy_bytes()), encoding })
}

/// Fixed-width text field, NUL-padded. Build truncates to the field width;
/// parse strips trailing NUL units. Deliberately not symmetric for values
/// longer than the field.
#[derive(Debug)]
struct PaddedString {
    length: Expr,
    encoding: Encoding,
}

impl Construct for PaddedString {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.length.eval_usize(ctx, path)?;
        let data = read_exact(stream, n, path)?;
        let unit = self.encoding.unit_size();
        let mut end = data.len() - data.len() % unit;
        while end >= unit && data[end - unit..end].iter().all(|&b| b == 0) {
            end -= unit;
        }
        Ok(Value::Str(self.encoding.decode(&data[..end], path)?))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.length.eval_usize(ctx, path)?;
        let s = value
            .as_str()
            .ok_or_else(|| Error::string(path, format!("expected string, got {}", value.kind())))?;
        let mut data = self.encoding.encode(s, path)?;
        data.resize(n, 0);
        write_bytes(stream, &data, path)?;
        Ok(value.clone())
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.length.eval_u64(ctx, path).map_err(Error::for_sizing)
    }

    fn is_fixed_size(&self) -> bool {
        self.length.is_const()
    }
}

pub fn padded_string(length: impl Into<Expr>, encoding: Encoding) -> Con {
    Con::new(PaddedString { length: length.into(), encoding })
}
