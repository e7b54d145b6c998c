//! Deferred expressions evaluated against the context at parse/build time.
//!
//! Wherever a construct needs a count, size, offset, or predicate, it accepts
//! anything `Into<Expr>`: a plain constant, a context lookup built from
//! [`this`]/[`parent`]/[`param`], an operator combination of those, or a
//! closure via [`by`] as the escape hatch.
//!
//! ```
//! use binform::expr::this;
//! let pixels_len = this("width") * this("height");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::value::{Record, Value};

type ExprFn = dyn Fn(&Context) -> Result<Value, Error> + Send + Sync;

/// Where a context path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Current frame, `up` levels of `_` applied first.
    This { up: usize },
    /// The outermost frame (`_root`).
    Root,
    /// External invocation parameters (`_params`).
    Params,
}

/// A deferred expression over the context.
#[derive(Clone)]
pub enum Expr {
    Lit(Value),
    Path { anchor: Anchor, keys: Vec<String> },
    /// `_index` of the nearest enclosing repeater.
    Index,
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Func(Arc<ExprFn>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    /// Length of a list, byte string, or text string.
    Len,
}

/// Field of the current context frame.
pub fn this(key: impl Into<String>) -> Expr {
    Expr::Path { anchor: Anchor::This { up: 0 }, keys: vec![key.into()] }
}

/// Field of the parent frame (`this._.key`).
pub fn parent(key: impl Into<String>) -> Expr {
    Expr::Path { anchor: Anchor::This { up: 1 }, keys: vec![key.into()] }
}

/// Field of the outermost frame (`this._root.key`).
pub fn root_field(key: impl Into<String>) -> Expr {
    Expr::Path { anchor: Anchor::Root, keys: vec![key.into()] }
}

/// External parameter passed to the top-level call (`this._params.key`).
pub fn param(key: impl Into<String>) -> Expr {
    Expr::Path { anchor: Anchor::Params, keys: vec![key.into()] }
}

/// Iteration index of the nearest enclosing array/range (`this._index`).
pub fn index() -> Expr {
    Expr::Index
}

/// Constant expression.
pub fn lit(v: impl Into<Value>) -> Expr {
    Expr::Lit(v.into())
}

/// Closure escape hatch; must be pure.
pub fn by<F>(f: F) -> Expr
where
    F: Fn(&Context) -> Result<Value, Error> + Send + Sync + 'static,
{
    Expr::Func(Arc::new(f))
}

impl Expr {
    /// Append a key to a path expression, for reaching into nested records:
    /// `this("header").field("count")`.
    pub fn field(self, key: impl Into<String>) -> Expr {
        match self {
            Expr::Path { anchor, mut keys } => {
                keys.push(key.into());
                Expr::Path { anchor, keys }
            }
            other => panic!("field() applies to context paths, not {other:?}"),
        }
    }

    /// One more `_` hop before the path lookup.
    pub fn up(self) -> Expr {
        match self {
            Expr::Path { anchor: Anchor::This { up }, keys } => {
                Expr::Path { anchor: Anchor::This { up: up + 1 }, keys }
            }
            other => panic!("up() applies to current-frame paths, not {other:?}"),
        }
    }

    pub fn eq_to(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Eq, Box::new(self), Box::new(rhs.into()))
    }
    pub fn ne_to(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Ne, Box::new(self), Box::new(rhs.into()))
    }
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Lt, Box::new(self), Box::new(rhs.into()))
    }
    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Le, Box::new(self), Box::new(rhs.into()))
    }
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Gt, Box::new(self), Box::new(rhs.into()))
    }
    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Ge, Box::new(self), Box::new(rhs.into()))
    }
    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::And, Box::new(self), Box::new(rhs.into()))
    }
    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Or, Box::new(self), Box::new(rhs.into()))
    }
    pub fn not(self) -> Expr {
        Expr::Unary(UnOp::Not, Box::new(self))
    }
    pub fn length(self) -> Expr {
        Expr::Unary(UnOp::Len, Box::new(self))
    }

    /// Evaluate against the context. Missing keys are `context` errors;
    /// arithmetic on non-numbers and overflow are `format` errors.
    pub fn eval(&self, ctx: &Context, path: &str) -> Result<Value, Error> {
        match self {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Path { anchor, keys } => {
                let base: &Record = match anchor {
                    Anchor::This { up } => ctx.frame_up(*up).ok_or_else(|| {
                        Error::context(path, format!("no frame {up} levels up"))
                    })?,
                    Anchor::Root => ctx.root(),
                    Anchor::Params => ctx.params(),
                };
                let mut cur = base.get(&keys[0]).ok_or_else(|| {
                    Error::context(path, format!("key '{}' not found in context", keys[0]))
                })?;
                for key in &keys[1..] {
                    cur = cur
                        .as_record()
                        .and_then(|r| r.get(key))
                        .ok_or_else(|| {
                            Error::context(path, format!("key '{key}' not found in context"))
                        })?;
                }
                Ok(cur.clone())
            }
            Expr::Index => ctx
                .index()
                .map(Value::Uint)
                .ok_or_else(|| Error::context(path, "_index outside of a repeater")),
            Expr::Binary(op, a, b) => {
                let a = a.eval(ctx, path)?;
                let b = b.eval(ctx, path)?;
                eval_binary(*op, a, b, path)
            }
            Expr::Unary(op, e) => {
                let v = e.eval(ctx, path)?;
                eval_unary(*op, v, path)
            }
            Expr::Func(f) => f(ctx),
        }
    }

    pub fn eval_u64(&self, ctx: &Context, path: &str) -> Result<u64, Error> {
        let v = self.eval(ctx, path)?;
        v.as_u64()
            .ok_or_else(|| Error::format(path, format!("expected unsigned integer, got {}", v.kind())))
    }

    pub fn eval_usize(&self, ctx: &Context, path: &str) -> Result<usize, Error> {
        let n = self.eval_u64(ctx, path)?;
        usize::try_from(n).map_err(|_| Error::format(path, format!("count {n} exceeds usize")))
    }

    pub fn eval_i64(&self, ctx: &Context, path: &str) -> Result<i64, Error> {
        let v = self.eval(ctx, path)?;
        v.as_i64()
            .ok_or_else(|| Error::format(path, format!("expected integer, got {}", v.kind())))
    }

    pub fn eval_bool(&self, ctx: &Context, path: &str) -> Result<bool, Error> {
        Ok(self.eval(ctx, path)?.truthy())
    }

    /// Whether the expression is a constant, i.e. usable by `size_of`
    /// without any context.
    pub fn is_const(&self) -> bool {
        match self {
            Expr::Lit(_) => true,
            Expr::Binary(_, a, b) => a.is_const() && b.is_const(),
            Expr::Unary(_, e) => e.is_const(),
            _ => false,
        }
    }
}

fn eval_binary(op: BinOp, a: Value, b: Value, path: &str) -> Result<Value, Error> {
    use BinOp::*;
    match op {
        Eq => return Ok(Value::Bool(a == b)),
        Ne => return Ok(Value::Bool(a != b)),
        And => return Ok(Value::Bool(a.truthy() && b.truthy())),
        Or => return Ok(Value::Bool(a.truthy() || b.truthy())),
        _ => {}
    }
    // Numeric domain: unsigned when both sides fit, signed when either is
    // negative, float when either is float.
    if matches!(a, Value::Float(_)) || matches!(b, Value::Float(_)) {
        let (x, y) = (
            a.as_f64().ok_or_else(|| non_numeric(&a, path))?,
            b.as_f64().ok_or_else(|| non_numeric(&b, path))?,
        );
        return match op {
            Add => Ok(Value::Float(x + y)),
            Sub => Ok(Value::Float(x - y)),
            Mul => Ok(Value::Float(x * y)),
            Div => Ok(Value::Float(x / y)),
            Lt => Ok(Value::Bool(x < y)),
            Le => Ok(Value::Bool(x <= y)),
            Gt => Ok(Value::Bool(x > y)),
            Ge => Ok(Value::Bool(x >= y)),
            _ => Err(Error::format(path, "operator not defined for floats")),
        };
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return match op {
            Add => checked(x.checked_add(y), path),
            Sub if x >= y => checked(Some(x - y), path),
            Sub => checked_i(i64::try_from(x as i128 - y as i128).ok(), path),
            Mul => checked(x.checked_mul(y), path),
            Div => checked(x.checked_div(y), path),
            Rem => checked(x.checked_rem(y), path),
            BitAnd => Ok(Value::Uint(x & y)),
            BitOr => Ok(Value::Uint(x | y)),
            BitXor => Ok(Value::Uint(x ^ y)),
            Shl => checked(x.checked_shl(y.try_into().unwrap_or(u32::MAX)), path),
            Shr => checked(x.checked_shr(y.try_into().unwrap_or(u32::MAX)), path),
            Lt => Ok(Value::Bool(x < y)),
            Le => Ok(Value::Bool(x <= y)),
            Gt => Ok(Value::Bool(x > y)),
            Ge => Ok(Value::Bool(x >= y)),
            _ => unreachable!(),
        };
    }
    let (x, y) = (
        a.as_i64().ok_or_else(|| non_numeric(&a, path))?,
        b.as_i64().ok_or_else(|| non_numeric(&b, path))?,
    );
    match op {
        Add => checked_i(x.checked_add(y), path),
        Sub => checked_i(x.checked_sub(y), path),
        Mul => checked_i(x.checked_mul(y), path),
        Div => checked_i(x.checked_div(y), path),
        Rem => checked_i(x.checked_rem(y), path),
        BitAnd => Ok(Value::Int(x & y)),
        BitOr => Ok(Value::Int(x | y)),
        BitXor => Ok(Value::Int(x ^ y)),
        Shl => checked_i(x.checked_shl(y.try_into().unwrap_or(u32::MAX)), path),
        Shr => checked_i(x.checked_shr(y.try_into().unwrap_or(u32::MAX)), path),
        Lt => Ok(Value::Bool(x < y)),
        Le => Ok(Value::Bool(x <= y)),
        Gt => Ok(Value::Bool(x > y)),
        Ge => Ok(Value::Bool(x >= y)),
        _ => unreachable!(),
    }
}

fn eval_unary(op: UnOp, v: Value, path: &str) -> Result<Value, Error> {
    match op {
        UnOp::Neg => {
            let x = v.as_i64().ok_or_else(|| non_numeric(&v, path))?;
            checked_i(x.checked_neg(), path)
        }
        UnOp::Not => Ok(Value::Bool(!v.truthy())),
        UnOp::Len => match &v {
            Value::List(items) => Ok(Value::Uint(items.len() as u64)),
            Value::Bytes(b) => Ok(Value::Uint(b.len() as u64)),
            Value::Str(s) => Ok(Value::Uint(s.chars().count() as u64)),
            other => Err(Error::format(path, format!("len of {}", other.kind()))),
        },
    }
}

fn checked(r: Option<u64>, path: &str) -> Result<Value, Error> {
    r.map(Value::Uint)
        .ok_or_else(|| Error::format(path, "integer overflow in expression"))
}

fn checked_i(r: Option<i64>, path: &str) -> Result<Value, Error> {
    r.map(Value::Int)
        .ok_or_else(|| Error::format(path, "integer overflow in expression"))
}

fn non_numeric(v: &Value, path: &str) -> Error {
    Error::format(path, format!("expected number, got {}", v.kind()))
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(v) => write!(f, "{v:?}"),
            Expr::Path { anchor, keys } => write!(f, "{anchor:?}.{}", keys.join(".")),
            Expr::Index => write!(f, "_index"),
            Expr::Binary(op, a, b) => write!(f, "({a:?} {op:?} {b:?})"),
            Expr::Unary(op, e) => write!(f, "{op:?}({e:?})"),
            Expr::Func(_) => write!(f, "<fn>"),
        }
    }
}

macro_rules! expr_from {
    ($($t:ty),* $(,)?) => {
        $(impl From<$t> for Expr {
            fn from(x: $t) -> Self {
                Expr::Lit(x.into())
            }
        })*
    };
}

expr_from!(u8, u16, u32, u64, usize, i8, i16, i32, i64, f32, f64, bool, &str, String);

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Lit(v)
    }
}

macro_rules! expr_binop {
    ($trait:ident, $method:ident, $op:ident) => {
        impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::Binary(BinOp::$op, Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

expr_binop!(Add, add, Add);
expr_binop!(Sub, sub, Sub);
expr_binop!(Mul, mul, Mul);
expr_binop!(Div, div, Div);
expr_binop!(Rem, rem, Rem);
expr_binop!(BitAnd, bitand, BitAnd);
expr_binop!(BitOr, bitor, BitOr);
expr_binop!(BitXor, bitxor, BitXor);
expr_binop!(Shl, shl, Shl);
expr_binop!(Shr, shr, Shr);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnOp::Neg, Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Mode;
    use crate::rec;

    fn ctx_with(entries: Record) -> Context {
        let mut ctx = Context::new(Mode::Parsing, Record::new());
        for (k, v) in entries.iter() {
            ctx.set(k, v.clone());
        }
        ctx
    }

    #[test]
    fn arithmetic_over_context() {
        let ctx = ctx_with(rec! { "width" => 3u8, "height" => 2u8 });
        let e = this("width") * this("height");
        assert_eq!(e.eval(&ctx, "(test)").unwrap(), Value::Uint(6));
    }

    #[test]
    fn missing_key_is_context_error() {
        let ctx = ctx_with(Record::new());
        let err = this("nope").eval(&ctx, "(test)").unwrap_err();
        assert!(matches!(err, Error::Context { .. }));
    }

    #[test]
    fn parent_navigation() {
        let mut ctx = Context::new(Mode::Parsing, Record::new());
        ctx.set("n", Value::Uint(9));
        ctx.push_frame();
        assert_eq!(parent("n").eval(&ctx, "(test)").unwrap(), Value::Uint(9));
        assert!(this("n").eval(&ctx, "(test)").is_err());
    }

    #[test]
    fn params_and_comparisons() {
        let ctx = Context::new(Mode::Parsing, rec! { "limit" => 10u8 });
        let e = param("limit").gt(3u8);
        assert_eq!(e.eval(&ctx, "(test)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn overflow_is_format_error() {
        let ctx = ctx_with(Record::new());
        let e = lit(u64::MAX) + 1u8;
        assert!(matches!(e.eval(&ctx, "(test)").unwrap_err(), Error::Format { .. }));
    }

    #[test]
    fn nested_field_access() {
        let ctx = ctx_with(rec! { "header" => rec! { "count" => 4u8 } });
        let e = this("header").field("count");
        assert_eq!(e.eval(&ctx, "(test)").unwrap(), Value::Uint(4));
    }

    #[test]
    fn const_detection() {
        assert!((lit(2u8) * 3u8).is_const());
        assert!(!(this("x") * 3u8).is_const());
    }
}
