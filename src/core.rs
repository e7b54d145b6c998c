//! The construct protocol: the node trait, the shared handle, and the
//! top-level parse/build/size-of entry points.

use std::fmt;
use std::fs::File;
use std::io::Cursor;
use std::ops::Deref;
use std::path::Path as FsPath;
use std::sync::Arc;

use crate::composite::{StructCon, SequenceCon};
use crate::context::{Context, Mode};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::value::{Record, Value};

/// The uniform contract every node implements.
///
/// `decode`/`encode`/`extent` are the internal surface taking an explicit
/// stream, context, and breadcrumb path; the public `parse`/`build`/
/// `size_of` entry points on [`Con`] are thin wrappers that set up the root
/// context. `encode` returns the value actually written, which may differ
/// from the input for computed fields.
pub trait Construct: fmt::Debug + Send + Sync {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error>;

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error>;

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error>;

    /// True when `size_of` never depends on the context.
    fn is_fixed_size(&self) -> bool {
        false
    }

    /// Name assigned by an enclosing composite via `/` or [`Con::named`].
    fn name(&self) -> Option<&str> {
        None
    }

    fn docs(&self) -> Option<&str> {
        None
    }

    /// Members when this node is a struct composite; lets `+` flatten.
    fn struct_members(&self) -> Option<&[Con]> {
        None
    }

    /// Members when this node is a sequence composite; lets `>>` flatten.
    fn sequence_members(&self) -> Option<&[Con]> {
        None
    }
}

/// Post-parse processing hook attached with [`Con::on_parse`]. Returning
/// [`Error::Cancel`] inside a greedy range stops the range without failing.
pub type ParseHook = Arc<dyn Fn(Value, &mut Context) -> Result<Value, Error> + Send + Sync>;

/// Cheap-clone handle to an immutable construct node. One definition serves
/// any number of parse/build invocations, also concurrently, as long as each
/// call gets its own stream.
#[derive(Clone)]
pub struct Con(Arc<dyn Construct>);

impl Con {
    pub fn new(node: impl Construct + 'static) -> Self {
        Con(Arc::new(node))
    }

    /// Parse from a byte slice.
    pub fn parse(&self, data: &[u8]) -> Result<Value, Error> {
        self.parse_with(data, Record::new())
    }

    /// Parse from a byte slice with external parameters (visible to
    /// expressions as `param(..)`).
    pub fn parse_with(&self, data: &[u8], params: Record) -> Result<Value, Error> {
        let mut cursor = Cursor::new(data);
        self.parse_stream_with(&mut cursor, params)
    }

    pub fn parse_stream(&self, stream: &mut dyn ReadStream) -> Result<Value, Error> {
        self.parse_stream_with(stream, Record::new())
    }

    pub fn parse_stream_with(
        &self,
        stream: &mut dyn ReadStream,
        params: Record,
    ) -> Result<Value, Error> {
        let mut ctx = Context::new(Mode::Parsing, params);
        self.0.decode(stream, &mut ctx, Mode::Parsing.marker())
    }

    pub fn parse_file(&self, path: impl AsRef<FsPath>) -> Result<Value, Error> {
        self.parse_file_with(path, Record::new())
    }

    pub fn parse_file_with(
        &self,
        path: impl AsRef<FsPath>,
        params: Record,
    ) -> Result<Value, Error> {
        let marker = Mode::Parsing.marker();
        let mut f = File::open(path.as_ref())
            .map_err(|e| Error::stream(marker, format!("opening {:?}: {e}", path.as_ref())))?;
        self.parse_stream_with(&mut f, params)
    }

    /// Build a value into bytes.
    pub fn build(&self, value: &Value) -> Result<Vec<u8>, Error> {
        self.build_with(value, Record::new())
    }

    pub fn build_with(&self, value: &Value, params: Record) -> Result<Vec<u8>, Error> {
        let mut cursor = Cursor::new(Vec::new());
        self.build_stream_with(value, &mut cursor, params)?;
        Ok(cursor.into_inner())
    }

    pub fn build_stream(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
    ) -> Result<(), Error> {
        self.build_stream_with(value, stream, Record::new())
    }

    pub fn build_stream_with(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        params: Record,
    ) -> Result<(), Error> {
        let mut ctx = Context::new(Mode::Building, params);
        self.0.encode(value, stream, &mut ctx, Mode::Building.marker())?;
        Ok(())
    }

    pub fn build_file(&self, value: &Value, path: impl AsRef<FsPath>) -> Result<(), Error> {
        let marker = Mode::Building.marker();
        let mut f = File::create(path.as_ref())
            .map_err(|e| Error::stream(marker, format!("creating {:?}: {e}", path.as_ref())))?;
        self.build_stream(value, &mut f)
    }

    /// Static byte length, when one exists without context.
    pub fn size_of(&self) -> Result<u64, Error> {
        self.size_of_with(Record::new())
    }

    pub fn size_of_with(&self, params: Record) -> Result<u64, Error> {
        let ctx = Context::new(Mode::Sizing, params);
        self.0.extent(&ctx, Mode::Sizing.marker())
    }

    /// Assign a name, as the `/` operator does. Names starting with `_` are
    /// reserved for the engine and rejected here rather than at parse time.
    pub fn named(self, name: impl Into<String>) -> Con {
        let name = name.into();
        assert!(
            !name.is_empty() && !name.starts_with('_'),
            "field name {name:?} is reserved; names must be non-empty and not start with '_'"
        );
        Con::new(Renamed { inner: self, name: Some(name), docs: None, hook: None })
    }

    /// Attach documentation, as `* "docstring"` does.
    pub fn with_docs(self, docs: impl Into<String>) -> Con {
        Con::new(Renamed {
            inner: self,
            name: None,
            docs: Some(docs.into()),
            hook: None,
        })
    }

    /// Attach a post-parse processing hook, the method form of
    /// `subcon * hook(f)`. The hook receives the parsed value and may
    /// replace it; returning [`Error::Cancel`] stops an enclosing greedy
    /// range early.
    pub fn on_parse<F>(self, f: F) -> Con
    where
        F: Fn(Value, &mut Context) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self * hook(f)
    }
}

/// A post-parse processing hook ready for `*` attachment; see [`hook`].
pub struct Hook(ParseHook);

/// Wrap a closure for hook attachment: `byte() * hook(|v, _ctx| ...)`.
/// `Fn` is a foreign trait, so a blanket `Mul<F>` cannot coexist with
/// `Mul<&str>`; hooks go through this wrapper instead.
pub fn hook<F>(f: F) -> Hook
where
    F: Fn(Value, &mut Context) -> Result<Value, Error> + Send + Sync + 'static,
{
    Hook(Arc::new(f))
}

impl Deref for Con {
    type Target = dyn Construct;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for Con {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Wrapper carrying a name, docs, and an optional parse hook; everything
/// else delegates to the wrapped node.
struct Renamed {
    inner: Con,
    name: Option<String>,
    docs: Option<String>,
    hook: Option<ParseHook>,
}

impl fmt::Debug for Renamed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renamed")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Construct for Renamed {
    fn decode(
        &self,
        stream: &mut dyn ReadStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        let value = self.inner.decode(stream, ctx, path)?;
        match &self.hook {
            Some(hook) => hook(value, ctx),
            None => Ok(value),
        }
    }

    fn encode(
        &self,
        value: &Value,
        stream: &mut dyn WriteStream,
        ctx: &mut Context,
        path: &str,
    ) -> Result<Value, Error> {
        self.inner.encode(value, stream, ctx, path)
    }

    fn extent(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        self.inner.extent(ctx, path)
    }

    fn is_fixed_size(&self) -> bool {
        self.inner.is_fixed_size()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref().or_else(|| self.inner.name())
    }

    fn docs(&self) -> Option<&str> {
        self.docs.as_deref().or_else(|| self.inner.docs())
    }

    fn struct_members(&self) -> Option<&[Con]> {
        // a named struct is a single member, not a merge source
        if self.name.is_some() {
            None
        } else {
            self.inner.struct_members()
        }
    }

    fn sequence_members(&self) -> Option<&[Con]> {
        if self.name.is_some() {
            None
        } else {
            self.inner.sequence_members()
        }
    }
}

/// `"name" / subcon` assigns a field name.
impl std::ops::Div<Con> for &str {
    type Output = Con;
    fn div(self, rhs: Con) -> Con {
        rhs.named(self)
    }
}

/// `a + b` concatenates into a struct, flattening unnamed structs on either
/// side.
impl std::ops::Add for Con {
    type Output = Con;
    fn add(self, rhs: Con) -> Con {
        let mut members: Vec<Con> = match self.struct_members() {
            Some(ms) => ms.to_vec(),
            None => vec![self.clone()],
        };
        match rhs.struct_members() {
            Some(ms) => members.extend(ms.iter().cloned()),
            None => members.push(rhs),
        }
        Con::new(StructCon::from_members(members))
    }
}

/// `a >> b` concatenates into a sequence, flattening unnamed sequences.
impl std::ops::Shr for Con {
    type Output = Con;
    fn shr(self, rhs: Con) -> Con {
        let mut members: Vec<Con> = match self.sequence_members() {
            Some(ms) => ms.to_vec(),
            None => vec![self.clone()],
        };
        match rhs.sequence_members() {
            Some(ms) => members.extend(ms.iter().cloned()),
            None => members.push(rhs),
        }
        Con::new(SequenceCon::from_members(members))
    }
}

/// `subcon * "docs"` attaches documentation.
impl std::ops::Mul<&str> for Con {
    type Output = Con;
    fn mul(self, docs: &str) -> Con {
        self.with_docs(docs)
    }
}

/// `subcon * hook(f)` attaches a post-parse processing hook.
impl std::ops::Mul<Hook> for Con {
    type Output = Con;
    fn mul(self, h: Hook) -> Con {
        Con::new(Renamed { inner: self, name: None, docs: None, hook: Some(h.0) })
    }
}

/// Extend a breadcrumb path with a child segment.
pub(crate) fn child_path(path: &str, name: Option<&str>) -> String {
    match name {
        Some(n) => format!("{path} -> {n}"),
        None => path.to_string(),
    }
}
