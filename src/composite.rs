//! Composite constructs: ordered records, tuples, repeaters, and
//! alternations.

use std::fmt;
use std::io::{Cursor, SeekFrom};
use std::sync::Arc;

use crate::context::Context;
use crate::core::{child_path, Con, Construct};
use crate::error::Error;
use crate::expr::Expr;
use crate::stream::{seek_read, tell_read, write_bytes, ReadStream, WriteStream};
use crate::value::{Record, Value};

/// Ordered heterogeneous record. Named members land in the result and in the
/// context frame; unnamed members (constants, padding) execute but their
/// results are discarded.
#[derive(Debug)]
pub(crate) struct StructCon {
    members: Vec<Con>,
}

impl StructCon {
    pub(crate) fn from_members(members: Vec<Con>) -> Self {
        let mut seen: Vec<&str> = Vec::new();
        for m in &members {
            if let Some(n) = m.name() {
                assert!(!seen.contains(&n), "duplicate field name {n:?} in struct");
                seen.push(n);
            }
        }
        StructCon { members }
    }
}

impl Construct for StructCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        ctx.push_frame();
        let result: Result<Value, Error> = (|| {
            let mut out = Record::new();
            for m in &self.members {
                let cpath = child_path(path, m.name());
                let v = m.decode(stream, ctx, &cpath)?;
                if let Some(name) = m.name() {
                    ctx.set(name, v.clone());
                    out.insert(name, v);
                }
            }
            Ok(Value::Record(out))
        })();
        ctx.pop_frame();
        result
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let given = match value {
            Value::Record(r) => r.clone(),
            Value::Unit => Record::new(),
            other => {
                return Err(Error::format(
                    path,
                    format!("struct build expects a record, got {}", other.kind()),
                ))
            }
        };
        ctx.push_frame();
        let result: Result<Value, Error> = (|| {
            for (k, v) in given.iter() {
                ctx.set(k, v.clone());
            }
            let mut out = Record::new();
            for m in &self.members {
                let cpath = child_path(path, m.name());
                let input = m
                    .name()
                    .and_then(|n| given.get(n))
                    .cloned()
                    .unwrap_or(Value::Unit);
                let echoed = m.encode(&input, stream, ctx, &cpath)?;
                if let Some(name) = m.name() {
                    ctx.set(name, echoed.clone());
                    out.insert(name, echoed);
                }
            }
            Ok(Value::Record(out))
        })();
        ctx.pop_frame();
        result
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let mut total = 0u64;
        for m in &self.members {
            let cpath = child_path(path, m.name());
            total = total
                .checked_add(m.extent(ctx, &cpath).map_err(Error::for_sizing)?)
                .ok_or_else(|| Error::format(path, "size overflow"))?;
        }
        Ok(total)
    }

    fn is_fixed_size(&self) -> bool {
        self.members.iter().all(|m| m.is_fixed_size())
    }

    fn struct_members(&self) -> Option<&[Con]> {
        Some(&self.members)
    }
}

/// Ordered record of named (or anonymous) members.
pub fn record(members: impl IntoIterator<Item = Con>) -> Con {
    Con::new(StructCon::from_members(members.into_iter().collect()))
}

/// Ordered heterogeneous tuple. Results accumulate into a list; names (if
/// any) still populate the context frame for later members.
#[derive(Debug)]
pub(crate) struct SequenceCon {
    members: Vec<Con>,
}

impl SequenceCon {
    pub(crate) fn from_members(members: Vec<Con>) -> Self {
        SequenceCon { members }
    }
}

impl Construct for SequenceCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        ctx.push_frame();
        let result: Result<Value, Error> = (|| {
            let mut out = Vec::with_capacity(self.members.len());
            for m in &self.members {
                let cpath = child_path(path, m.name());
                let v = m.decode(stream, ctx, &cpath)?;
                if let Some(name) = m.name() {
                    ctx.set(name, v.clone());
                }
                out.push(v);
            }
            Ok(Value::List(out))
        })();
        ctx.pop_frame();
        result
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
            .ok_or_else(|| Error::format(path, format!("sequence build expects a list, got {}", value.kind())))?;
        if items.len() != self.members.len() {
            return Err(Error::range(
                path,
                format!("sequence of {} members given {} items", self.members.len(), items.len()),
            ));
        }
        ctx.push_frame();
        let result: Result<Value, Error> = (|| {
            let mut out = Vec::with_capacity(items.len());
            for (m, item) in self.members.iter().zip(items) {
                let cpath = child_path(path, m.name());
                let echoed = m.encode(item, stream, ctx, &cpath)?;
                if let Some(name) = m.name() {
                    ctx.set(name, echoed.clone());
                }
                out.push(echoed);
            }
            Ok(Value::List(out))
        })();
        ctx.pop_frame();
        result
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let mut total = 0u64;
        for m in &self.members {
            let cpath = child_path(path, m.name());
            total = total
                .checked_add(m.extent(ctx, &cpath).map_err(Error::for_sizing)?)
                .ok_or_else(|| Error::format(path, "size overflow"))?;
        }
        Ok(total)
    }

    fn is_fixed_size(&self) -> bool {
        self.members.iter().all(|m| m.is_fixed_size())
    }

    fn sequence_members(&self) -> Option<&[Con]> {
        Some(&self.members)
    }
}

pub fn sequence(members: impl IntoIterator<Item = Con>) -> Con {
    Con::new(SequenceCon::from_members(members.into_iter().collect()))
}

/// Homogeneous fixed-count repeater. The count may be an expression over
/// earlier fields; each iteration exposes `_index`.
#[derive(Debug)]
struct ArrayCon {
    count: Expr,
    subcon: Con,
}

impl Construct for ArrayCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.count.eval_usize(ctx, path)?;
        let mut out = Vec::with_capacity(n.min(4096));
        for i in 0..n {
            ctx.set_index(i as u64);
            out.push(self.subcon.decode(stream, ctx, path)?);
        }
        Ok(Value::List(out))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let n = self.count.eval_usize(ctx, path)?;
        let items = value
            .as_list()
            .ok_or_else(|| Error::format(path, format!("array build expects a list, got {}", value.kind())))?;
        if items.len() != n {
            return Err(Error::range(
                path,
                format!("array of {n} elements given {} items", items.len()),
            ));
        }
        for (i, item) in items.iter().enumerate() {
            ctx.set_index(i as u64);
            self.subcon.encode(item, stream, ctx, path)?;
        }
        Ok(value.clone())
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let n = self.count.eval_u64(ctx, path).map_err(Error::for_sizing)?;
        let each = self.subcon.extent(ctx, path).map_err(Error::for_sizing)?;
        n.checked_mul(each)
            .ok_or_else(|| Error::format(path, "size overflow"))
    }

    fn is_fixed_size(&self) -> bool {
        self.count.is_const() && self.subcon.is_fixed_size()
    }
}

pub fn array(count: impl Into<Expr>, subcon: Con) -> Con {
    Con::new(ArrayCon { count: count.into(), subcon })
}

/// Greedy repeater: parses until the subconstruct fails, rewinding to the
/// end of the last successful item.
#[derive(Debug)]
struct GreedyRangeCon {
    subcon: Con,
    discard: bool,
}

impl Construct for GreedyRangeCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut out = Vec::new();
        for i in 0.. {
            ctx.set_index(i);
            let fallback = tell_read(stream, path)?;
            match self.subcon.decode(stream, ctx, path) {
                Ok(v) => {
                    if !self.discard {
                        out.push(v);
                    }
                }
                Err(Error::Cancel { .. }) => break,
                Err(_) => {
                    seek_read(stream, SeekFrom::Start(fallback), path)?;
                    break;
                }
            }
        }
        Ok(Value::List(out))
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
            .ok_or_else(|| Error::format(path, format!("range build expects a list, got {}", value.kind())))?;
        for (i, item) in items.iter().enumerate() {
            ctx.set_index(i as u64);
            self.subcon.encode(item, stream, ctx, path)?;
        }
        Ok(value.clone())
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "greedy range has no fixed size"))
    }
}

pub fn greedy_range(subcon: Con) -> Con {
    Con::new(GreedyRangeCon { subcon, discard: false })
}

/// Greedy repeater that throws parsed items away (skipping data whose
/// content is irrelevant).
pub fn greedy_range_discard(subcon: Con) -> Con {
    Con::new(GreedyRangeCon { subcon, discard: true })
}

/// Predicate called after each repeated item with (item, accumulated items,
/// context).
pub type RepeatPredicate = Arc<dyn Fn(&Value, &[Value], &Context) -> Result<bool, Error> + Send + Sync>;

/// Repeater terminated by a predicate; the terminal item is included.
struct RepeatUntilCon {
    pred: RepeatPredicate,
    subcon: Con,
    discard: bool,
}

impl fmt::Debug for RepeatUntilCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatUntilCon")
            .field("subcon", &self.subcon)
            .field("discard", &self.discard)
            .finish_non_exhaustive()
    }
}

impl Construct for RepeatUntilCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let mut items = Vec::new();
        for i in 0.. {
            ctx.set_index(i);
            let v = self.subcon.decode(stream, ctx, path)?;
            items.push(v);
            if (self.pred)(&items[items.len() - 1], &items, ctx)? {
                break;
            }
        }
        Ok(if self.discard { Value::List(Vec::new()) } else { Value::List(items) })
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
            .ok_or_else(|| Error::format(path, format!("repeat build expects a list, got {}", value.kind())))?;
        let mut written: Vec<Value> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            ctx.set_index(i as u64);
            let echoed = self.subcon.encode(item, stream, ctx, path)?;
            written.push(echoed);
            if (self.pred)(item, &written, ctx)? {
                return Ok(Value::List(written));
            }
        }
        Err(Error::range(path, "predicate not satisfied by any item"))
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "repeat-until has no fixed size"))
    }
}

pub fn repeat_until<F>(pred: F, subcon: Con) -> Con
where
    F: Fn(&Value, &[Value], &Context) -> Result<bool, Error> + Send + Sync + 'static,
{
    Con::new(RepeatUntilCon { pred: Arc::new(pred), subcon, discard: false })
}

pub fn repeat_until_discard<F>(pred: F, subcon: Con) -> Con
where
    F: Fn(&Value, &[Value], &Context) -> Result<bool, Error> + Send + Sync + 'static,
{
    Con::new(RepeatUntilCon { pred: Arc::new(pred), subcon, discard: true })
}

/// Which member decides the stream position after a union parse.
#[derive(Debug, Clone)]
pub enum UnionFrom {
    Name(&'static str),
    Index(usize),
}

/// Union of alternatives sharing one stream window: every member parses from
/// the same starting offset. Build writes exactly the designated member;
/// without a designation, the first member present in the given record.
///
/// With `parsefrom = None` the stream is left at the starting offset, which
/// makes a union inside a greedy range loop forever; designate a member
/// there.
#[derive(Debug)]
struct UnionCon {
    members: Vec<Con>,
    parsefrom: Option<UnionFrom>,
}

impl UnionCon {
    fn is_designated(&self, index: usize, member: &Con) -> bool {
        match &self.parsefrom {
            Some(UnionFrom::Index(i)) => *i == index,
            Some(UnionFrom::Name(n)) => member.name() == Some(*n),
            None => false,
        }
    }
}

impl Construct for UnionCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let start = tell_read(stream, path)?;
        ctx.push_frame();
        let result: Result<Value, Error> = (|| {
            let mut out = Record::new();
            let mut resume = start;
            for (i, m) in self.members.iter().enumerate() {
                seek_read(stream, SeekFrom::Start(start), path)?;
                let cpath = child_path(path, m.name());
                let v = m.decode(stream, ctx, &cpath)?;
                if let Some(name) = m.name() {
                    ctx.set(name, v.clone());
                    out.insert(name, v);
                }
                if self.is_designated(i, m) {
                    resume = tell_read(stream, path)?;
                }
            }
            seek_read(stream, SeekFrom::Start(resume), path)?;
            Ok(Value::Record(out))
        })();
        ctx.pop_frame();
        result
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
            .ok_or_else(|| Error::format(path, format!("union build expects a record, got {}", value.kind())))?;
        let designated = match &self.parsefrom {
            Some(UnionFrom::Index(i)) => Some(self.members.get(*i).ok_or_else(|| {
                Error::select(path, format!("union has no member at index {i}"))
            })?),
            Some(UnionFrom::Name(n)) => Some(
                self.members
                    .iter()
                    .find(|m| m.name() == Some(*n))
                    .ok_or_else(|| Error::select(path, format!("union has no member named {n:?}")))?,
            ),
            None => None,
        };
        if let Some(m) = designated {
            let name = m
                .name()
                .ok_or_else(|| Error::select(path, "designated union member has no name"))?;
            let v = given.get(name).ok_or_else(|| {
                Error::select(path, format!("union value is missing designated member {name:?}"))
            })?;
            let cpath = child_path(path, Some(name));
            ctx.push_frame();
            let result = m.encode(v, stream, ctx, &cpath);
            ctx.pop_frame();
            return result;
        }
        // no designation: the first member present in the record wins
        for m in &self.members {
            let Some(name) = m.name() else { continue };
            let Some(v) = given.get(name) else { continue };
            let cpath = child_path(path, Some(name));
            ctx.push_frame();
            let result = m.encode(v, stream, ctx, &cpath);
            ctx.pop_frame();
            return result;
        }
        Err(Error::select(path, "no union member present in the given record"))
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let mut sizes = Vec::with_capacity(self.members.len());
        for m in &self.members {
            sizes.push(m.extent(ctx, path).map_err(Error::for_sizing)?);
        }
        match sizes.as_slice() {
            [] => Err(Error::size_unknown(path, "empty union")),
            [first, rest @ ..] if rest.iter().all(|s| s == first) => Ok(*first),
            _ => Err(Error::size_unknown(path, "union members differ in size")),
        }
    }
}

pub fn union(members: impl IntoIterator<Item = Con>, parsefrom: Option<UnionFrom>) -> Con {
    Con::new(UnionCon { members: members.into_iter().collect(), parsefrom })
}

/// First-success alternation: alternatives are tried in order with the
/// stream rewound between attempts.
#[derive(Debug)]
struct SelectCon {
    alternatives: Vec<Con>,
}

impl Construct for SelectCon {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let fallback = tell_read(stream, path)?;
        for alt in &self.alternatives {
            seek_read(stream, SeekFrom::Start(fallback), path)?;
            let cpath = child_path(path, alt.name());
            match alt.decode(stream, ctx, &cpath) {
                Ok(v) => return Ok(v),
                Err(e @ Error::Cancel { .. }) => return Err(e),
                Err(_) => continue,
            }
        }
        Err(Error::select(path, "all alternatives failed"))
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        for alt in &self.alternatives {
            let cpath = child_path(path, alt.name());
            let mut scratch = Cursor::new(Vec::new());
            match alt.encode(value, &mut scratch, ctx, &cpath) {
                Ok(echoed) => {
                    write_bytes(stream, &scratch.into_inner(), path)?;
                    return Ok(echoed);
                }
                Err(e @ Error::Cancel { .. }) => return Err(e),
                Err(_) => continue,
            }
        }
        Err(Error::select(path, "no alternative accepted the value"))
    }

    fn extent(&self, _ctx: &Context, path: &str) -> Result<u64, Error> {
        Err(Error::size_unknown(path, "alternation size depends on the chosen branch"))
    }
}

pub fn select(alternatives: impl IntoIterator<Item = Con>) -> Con {
    Con::new(SelectCon { alternatives: alternatives.into_iter().collect() })
}

/// Parses the subconstruct if possible, otherwise yields `Unit` without
/// consuming anything.
pub fn optional(subcon: Con) -> Con {
    select([subcon, crate::bytes::pass_()])
}
