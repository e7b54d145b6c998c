//! Raw byte fields and the no-op/sentinel constructs.

use crate::context::Context;
use crate::core::{Con, Construct};
use crate::error::Error;
use crate::expr::Expr;
use crate::stream::{read_all, read_exact, write_bytes, ReadStream, WriteStream};
use crate::value::Value;

/// Fixed-length raw byte field; the length may be an expression.
#[derive(Debug)]
struct BytesCon {
    length: Expr,
}

impl Construct for BytesCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.length.eval_usize(ctx, path)?;
        Ok(Value::Bytes(read_exact(stream, n, path)?))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.length.eval_usize(ctx, path)?;
        let data = value
            .as_bytes()
            .ok_or_else(|| Error::format(path, format!("expected bytes, got {}", value.kind())))?;
        if data.len() != n {
            return Err(Error::format(
                path,
                format!("expected exactly {n} bytes, got {}", data.len()),
            ));
        }
        write_bytes(stream, data, path)?;
        Ok(value.clone())
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.length.eval_u64(ctx, path).map_err(Error::for_sizing)
    }

    fn is_fixed_size(&self) -> bool {
        self.length.is_const()
    }
}

/// Raw byte field of `length` bytes (constant or context expression).
pub fn bytes_fixed(length: impl Into<Expr>) -> Con {
    Con::new(BytesCon { length: length.into() })
}

/// All bytes up to end of stream.
#[derive(Debug)]
struct GreedyBytes;

impl Construct for GreedyBytes {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        Ok(Value::Bytes(read_all(stream, path)?))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let data = value
            .as_bytes()
            .ok_or_else(|| Error::format(path, format!("expected bytes, got {}", value.kind())))?;
        write_bytes(stream, data, path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "greedy field has no fixed size"))
    }
}

pub fn greedy_bytes() -> Con {
    Con::new(GreedyBytes)
}

/// One-byte boolean: non-zero parses as true, builds as `\x01`/`\x00`.
#[derive(Debug)]
struct Flag;

impl Construct for Flag {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let b = read_exact(stream, 1, path)?[0];
        Ok(Value::Bool(b != 0))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let b = value
            .as_bool()
            .ok_or_else(|| Error::format(path, format!("expected bool, got {}", value.kind())))?;
        write_bytes(stream, &[b as u8], path)?;
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(1)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn flag() -> Con {
    Con::new(Flag)
}

/// Skipped bytes: parse discards, build writes zeros.
#[derive(Debug)]
struct PaddingCon {
    length: Expr,
}

impl Construct for PaddingCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.length.eval_usize(ctx, path)?;
        read_exact(stream, n, path)?;
        Ok(Value::Unit)
    }

    fn encode(
        &self,
        _value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.length.eval_usize(ctx, path)?;
        write_bytes(stream, &vec![0u8; n], path)?;
        Ok(Value::Unit)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.length.eval_u64(ctx, path).map_err(Error::for_sizing)
    }

    fn is_fixed_size(&self) -> bool {
        self.length.is_const()
    }
}

pub fn padding(length: impl Into<Expr>) -> Con {
    Con::new(PaddingCon { length: length.into() })
}

/// Does nothing in either direction; parses to `Unit`.
#[derive(Debug)]
struct Pass;

impl Construct for Pass {
    fn decode(
        &self,
        _stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        _path: &str,
    ) -> Result<Value, Error> {
        Ok(Value::Unit)
    }

    fn encode(
        &self,
        _value: &Value,
        _stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        _path: &str,
    ) -> Result<Value, Error> {
        Ok(Value::Unit)
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn pass_() -> Con {
    Con::new(Pass)
}

/// Asserts end of stream on parse.
#[derive(Debug)]
struct Terminated;

impl Construct for Terminated {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut probe = [0u8; 1];
        match stream.read(&mut probe) {
            Ok(0) => Ok(Value::Unit),
            Ok(_) => Err(Error::terminator(path, "expected end of stream, found more bytes")),
            Err(e) => Err(Error::stream(path, format!("probing for end of stream: {e}"))),
        }
    }

    fn encode(
        &self,
        _value: &Value,
        _stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        _path: &str,
    ) -> Result<Value, Error> {
        Ok(Value::Unit)
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn terminated() -> Con {
    Con::new(Terminated)
}

/// A field with one legal value. Parse verifies, build may be given `Unit`
/// and still writes the constant.
#[derive(Debug)]
struct ConstCon {
    subcon: Con,
    expected: Value,
}

impl Construct for ConstCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let got = self.subcon.decode(stream, ctx, path)?;
        if got != self.expected {
            return Err(Error::validation(
                path,
                format!("expected constant {:?}, parsed {:?}", self.expected, got),
            ));
        }
        Ok(got)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        if !value.is_unit() && *value != self.expected {
            return Err(Error::validation(
                path,
                format!("constant field given {value:?}, requires {:?}", self.expected),
            ));
        }
        self.subcon.encode(&self.expected, stream, ctx, path)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

/// A literal byte-string constant.
pub fn constant(data: impl Into<Vec<u8>>) -> Con {
    let data = data.into();
    let expected = Value::Bytes(data.clone());
    Con::new(ConstCon { subcon: bytes_fixed(data.len()), expected })
}

/// A constant expressed through an arbitrary subconstruct, e.g.
/// `const_of(int16ub(), 0xCAFE_u16)`.
pub fn const_of(subcon: Con, value: impl Into<Value>) -> Con {
    Con::new(ConstCon { subcon, expected: value.into() })
}
