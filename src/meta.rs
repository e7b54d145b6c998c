//! Meta constructs: computed fields, stream navigation, raw capture, and
//! conditional dispatch.

use std::io::{Cursor, SeekFrom};

use crate::bytes::pass_;
use crate::context::Context;
use crate::core::{Con, Construct};
use crate::error::Error;
use crate::expr::Expr;
use crate::stream::{
    read_exact, seek_read, seek_write, tell_read, tell_write, write_bytes, ReadStream, WriteStream,
};
use crate::value::{Record, Value};

/// Field with no stream footprint: both parse and build evaluate the
/// expression and yield its value.
#[derive(Debug)]
struct Computed {
    expr: Expr,
}

impl Construct for Computed {
    fn decode(
        &self,
        _stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.expr.eval(ctx, path)
    }

    fn encode(
        &self,
        _value: &Value,
        _stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.expr.eval(ctx, path)
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn computed(expr: impl Into<Expr>) -> Con {
    Con::new(Computed { expr: expr.into() })
}

/// Field whose build value is always recomputed from the context, typically
/// a length or count derived from a sibling. Parse just delegates.
#[derive(Debug)]
struct Rebuild {
    subcon: Con,
    expr: Expr,
}

impl Construct for Rebuild {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.subcon.decode(stream, ctx, path)
    }

    fn encode(
        &self,
        _value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let v = self.expr.eval(ctx, path)?;
        self.subcon.encode(&v, stream, ctx, path)?;
        Ok(v)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

/// `rebuild(int16ub(), this("data").length())` keeps a length field honest
/// without the caller supplying it.
pub fn rebuild(subcon: Con, expr: impl Into<Expr>) -> Con {
    Con::new(Rebuild { subcon, expr: expr.into() })
}

/// Uses the fallback when the caller supplies no value on build.
#[derive(Debug)]
struct DefaultOf {
    subcon: Con,
    fallback: Expr,
}

impl Construct for DefaultOf {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.subcon.decode(stream, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        if value.is_unit() {
            let v = self.fallback.eval(ctx, path)?;
            self.subcon.encode(&v, stream, ctx, path)?;
            Ok(v)
        } else {
            self.subcon.encode(value, stream, ctx, path)
        }
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

pub fn default_of(subcon: Con, fallback: impl Into<Expr>) -> Con {
    Con::new(DefaultOf { subcon, fallback: fallback.into() })
}

/// Asserts a context predicate during both parse and build; no stream
/// footprint.
#[derive(Debug)]
struct Check {
    pred: Expr,
}

impl Construct for Check {
    fn decode(
        &self,
        _stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        if !self.pred.eval_bool(ctx, path)? {
            return Err(Error::validation(path, "check predicate failed"));
        }
        Ok(Value::Unit)
    }

    fn encode(
        &self,
        _value: &Value,
        _stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        if !self.pred.eval_bool(ctx, path)? {
            return Err(Error::validation(path, "check predicate failed"));
        }
        Ok(Value::Unit)
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn check(pred: impl Into<Expr>) -> Con {
    Con::new(Check { pred: pred.into() })
}

/// Branches on a context condition.
#[derive(Debug)]
struct IfThenElse {
    cond: Expr,
    then_con: Con,
    else_con: Con,
}

impl IfThenElse {
    fn pick(&self, ctx: &Context, path: &str) -> Result<&Con, Error> {
        Ok(if self.cond.eval_bool(ctx, path)? {
            &self.then_con
        } else {
            &self.else_con
        })
    }
}

impl Construct for IfThenElse {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.pick(ctx, path)?.decode(stream, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.pick(ctx, path)?.encode(value, stream, ctx, path)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        match self.pick(ctx, path) {
            Ok(branch) => branch.extent(ctx, path),
            Err(e) => {
                let a = self.then_con.extent(ctx, path)?;
                let b = self.else_con.extent(ctx, path)?;
                if a == b {
                    Ok(a)
                } else {
                    Err(e.for_sizing())
                }
            }
        }
    }

    fn is_fixed_size(&self) -> bool {
        // without the condition both branches must agree
        self.cond.is_const() && self.then_con.is_fixed_size() && self.else_con.is_fixed_size()
    }
}

pub fn if_then_else(cond: impl Into<Expr>, then_con: Con, else_con: Con) -> Con {
    Con::new(IfThenElse { cond: cond.into(), then_con, else_con })
}

/// Parses/builds the subconstruct only when the condition holds; otherwise a
/// no-op yielding `Unit`.
pub fn if_then(cond: impl Into<Expr>, then_con: Con) -> Con {
    if_then_else(cond, then_con, pass_())
}

/// Dispatches on a context key; the discriminant usually comes from an
/// earlier field.
#[derive(Debug)]
struct Switch {
    key: Expr,
    cases: Vec<(Value, Con)>,
    default: Option<Con>,
}

impl Switch {
    fn pick(&self, ctx: &Context, path: &str) -> Result<&Con, Error> {
        let k = self.key.eval(ctx, path)?;
        self.cases
            .iter()
            .find(|(v, _)| *v == k)
            .map(|(_, c)| c)
            .or(self.default.as_ref())
            .ok_or_else(|| Error::mapping(path, format!("no case matches {k:?}")))
    }
}

impl Construct for Switch {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.pick(ctx, path)?.decode(stream, ctx, path)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.pick(ctx, path)?.encode(value, stream, ctx, path)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        match self.pick(ctx, path) {
            Ok(case) => case.extent(ctx, path),
            Err(e) => {
                let mut sizes = Vec::new();
                for (_, c) in &self.cases {
                    sizes.push(c.extent(ctx, path)?);
                }
                if let Some(d) = &self.default {
                    sizes.push(d.extent(ctx, path)?);
                }
                match sizes.as_slice() {
                    [first, rest @ ..] if rest.iter().all(|s| s == first) => Ok(*first),
                    _ => Err(e.for_sizing()),
                }
            }
        }
    }
}

pub fn switch(
    key: impl Into<Expr>,
    cases: impl IntoIterator<Item = (Value, Con)>,
    default: Option<Con>,
) -> Con {
    Con::new(Switch { key: key.into(), cases: cases.into_iter().collect(), default })
}

/// Emits the cancel signal when the condition holds; an enclosing greedy
/// range stops there, anywhere else the signal propagates as an error.
#[derive(Debug)]
struct StopIf {
    cond: Expr,
}

impl Construct for StopIf {
    fn decode(
        &self,
        _stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        if self.cond.eval_bool(ctx, path)? {
            return Err(Error::cancel(path));
        }
        Ok(Value::Unit)
    }

    fn encode(
        &self,
        _value: &Value,
        _stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        if self.cond.eval_bool(ctx, path)? {
            return Err(Error::cancel(path));
        }
        Ok(Value::Unit)
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }
}

pub fn stop_if(cond: impl Into<Expr>) -> Con {
    Con::new(StopIf { cond: cond.into() })
}

/// Jumps to an absolute offset (negative offsets count from the end),
/// delegates, and restores the position afterwards, also on failure.
#[derive(Debug)]
struct Pointer {
    offset: Expr,
    subcon: Con,
}

impl Pointer {
    fn target(&self, ctx: &Context, path: &str) -> Result<SeekFrom, Error> {
        let off = self.offset.eval_i64(ctx, path)?;
        Ok(if off < 0 {
            SeekFrom::End(off)
        } else {
            SeekFrom::Start(off as u64)
        })
    }
}

impl Construct for Pointer {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let saved = tell_read(stream, path)?;
        let target = self.target(ctx, path)?;
        seek_read(stream, target, path)?;
        let result = self.subcon.decode(stream, ctx, path);
        let restored = seek_read(stream, SeekFrom::Start(saved), path);
        let v = result?;
        restored?;
        Ok(v)
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let saved = tell_write(stream, path)?;
        let target = self.target(ctx, path)?;
        seek_write(stream, target, path)?;
        let result = self.subcon.encode(value, stream, ctx, path);
        let restored = seek_write(stream, SeekFrom::Start(saved), path);
        let v = result?;
        restored?;
        Ok(v)
    }

    // no footprint on the outer stream
    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn pointer(offset: impl Into<Expr>, subcon: Con) -> Con {
    Con::new(Pointer { offset: offset.into(), subcon })
}

/// Parses ahead without consuming: the position is restored afterwards.
/// Build is a no-op.
#[derive(Debug)]
struct Peek {
    subcon: Con,
}

impl Construct for Peek {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let saved = tell_read(stream, path)?;
        let result = self.subcon.decode(stream, ctx, path);
        let restored = seek_read(stream, SeekFrom::Start(saved), path);
        let v = result?;
        restored?;
        Ok(v)
    }

    fn encode(
        &self,
        value: &Value,
        _stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        _path: &str,
    ) -> Result<Value, Error> {
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn peek(subcon: Con) -> Con {
    Con::new(Peek { subcon })
}

/// Yields the current stream offset in both directions.
#[derive(Debug)]
struct Tell;

impl Construct for Tell {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        Ok(Value::Uint(tell_read(stream, path)?))
    }

    fn encode(
        &self,
        _value: &Value,
        stream: &mut dyn WriteStream,
        _ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        Ok(Value::Uint(tell_write(stream, path)?))
    }

    fn extent(&self, _ctx: &Context, _path: &str) -> Result<u64, Error> {
        Ok(0)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }
}

pub fn tell() -> Con {
    Con::new(Tell)
}

/// Anchor for an absolute reposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Repositions the stream; yields the new offset. Has no defined size.
#[derive(Debug)]
struct SeekTo {
    at: Expr,
    whence: Whence,
}

impl SeekTo {
    fn seek_from(&self, ctx: &Context, path: &str) -> Result<SeekFrom, Error> {
        let at = self.at.eval_i64(ctx, path)?;
        Ok(match self.whence {
            Whence::Start => SeekFrom::Start(u64::try_from(at).map_err(|_| {
                Error::format(path, format!("negative absolute offset {at}"))
            })?),
            Whence::Current => SeekFrom::Current(at),
            Whence::End => SeekFrom::End(at),
        })
    }
}

impl Construct for SeekTo {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let to = self.seek_from(ctx, path)?;
        Ok(Value::Uint(seek_read(stream, to, path)?))
    }

    fn encode(
        &self,
        _value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let to = self.seek_from(ctx, path)?;
        Ok(Value::Uint(seek_write(stream, to, path)?))
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "seek only repositions the stream"))
    }
}

pub fn seek_to(at: impl Into<Expr>) -> Con {
    Con::new(SeekTo { at: at.into(), whence: Whence::Start })
}

pub fn seek_to_whence(at: impl Into<Expr>, whence: Whence) -> Con {
    Con::new(SeekTo { at: at.into(), whence })
}

/// Captures both the parsed value and the exact bytes it came from:
/// `{data, value, offset1, offset2, length}`. On build, `data` wins over
/// `value` when both are present.
#[derive(Debug)]
struct RawCopy {
    subcon: Con,
}

impl Construct for RawCopy {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let offset1 = tell_read(stream, path)?;
        let value = self.subcon.decode(stream, ctx, path)?;
        let offset2 = tell_read(stream, path)?;
        seek_read(stream, SeekFrom::Start(offset1), path)?;
        let data = read_exact(stream, (offset2 - offset1) as usize, path)?;
        let mut out = Record::new();
        out.insert("data", Value::Bytes(data));
        out.insert("value", value);
        out.insert("offset1", Value::Uint(offset1));
        out.insert("offset2", Value::Uint(offset2));
        out.insert("length", Value::Uint(offset2 - offset1));
        Ok(Value::Record(out))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let given = value
            .as_record()
            .ok_or_else(|| Error::format(path, format!("raw copy expects a record, got {}", value.kind())))?;
        let offset1 = tell_write(stream, path)?;
        let (data, echoed) = if let Some(Value::Bytes(data)) = given.get("data") {
            write_bytes(stream, data, path)?;
            (data.clone(), given.get("value").cloned().unwrap_or(Value::Unit))
        } else if let Some(v) = given.get("value") {
            let mut scratch = Cursor::new(Vec::new());
            let echoed = self.subcon.encode(v, &mut scratch, ctx, path)?;
            let data = scratch.into_inner();
            write_bytes(stream, &data, path)?;
            (data, echoed)
        } else {
            return Err(Error::format(path, "raw copy needs either 'data' or 'value'"));
        };
        let offset2 = tell_write(stream, path)?;
        let mut out = Record::new();
        out.insert("data", Value::Bytes(data));
        out.insert("value", echoed);
        out.insert("offset1", Value::Uint(offset1));
        out.insert("offset2", Value::Uint(offset2));
        out.insert("length", Value::Uint(offset2 - offset1));
        Ok(Value::Record(out))
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.subcon.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.subcon.is_fixed_size()
    }
}

pub fn raw_copy(subcon: Con) -> Con {
    Con::new(RawCopy { subcon })
}
