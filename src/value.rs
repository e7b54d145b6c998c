//! Runtime values flowing through parse and build.

use regex::Regex;

/// A single parsed or to-be-built value.
///
/// `Symbol` is produced by [`symbol_map`](crate::adapters::symbol_map) and
/// compares equal both to its integer and to its name string. `Unit` is the
/// result of constructs that produce nothing (`pass_`, `padding`).
#[derive(Debug, Clone)]
pub enum Value {
    Uint(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    Record(Record),
    List(Vec<Value>),
    Symbol { name: String, value: i64 },
    Unit,
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(x) => Some(*x),
            Value::Int(x) => (*x).try_into().ok(),
            Value::Symbol { value, .. } => (*value).try_into().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Uint(x) => (*x).try_into().ok(),
            Value::Int(x) => Some(*x),
            Value::Symbol { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Uint(x) => Some(*x as f64),
            Value::Int(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Symbol { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    /// Loose truthiness used by predicates: `Unit`, `false`, zero, and empty
    /// collections are false, everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Unit => false,
            Value::Bool(b) => *b,
            Value::Uint(x) => *x != 0,
            Value::Int(x) => *x != 0,
            Value::Float(x) => *x != 0.0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Record(r) => !r.is_empty(),
            Value::List(v) => !v.is_empty(),
            Value::Symbol { .. } => true,
        }
    }

    /// Recursive first-hit search by field name, descending through nested
    /// records and lists.
    pub fn search(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(r) => r.search(name),
            Value::List(items) => items.iter().find_map(|i| i.search(name)),
            _ => None,
        }
    }

    /// Recursive first-hit search matching field names against a compiled
    /// regex.
    pub fn search_regex(&self, pattern: &Regex) -> Option<&Value> {
        match self {
            Value::Record(r) => r.search_regex(pattern),
            Value::List(items) => items.iter().find_map(|i| i.search_regex(pattern)),
            _ => None,
        }
    }

    /// All values under `name`, depth first.
    pub fn search_all(&self, name: &str) -> Vec<&Value> {
        let mut out = Vec::new();
        collect_from_value(self, &mut out, &|k| k == name);
        out
    }

    /// All values whose names match the regex, depth first.
    pub fn search_all_regex(&self, pattern: &Regex) -> Vec<&Value> {
        let mut out = Vec::new();
        collect_from_value(self, &mut out, &|k| pattern.is_match(k));
        out
    }

    /// Short type label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Symbol { .. } => "symbol",
            Value::Unit => "unit",
        }
    }
}

// Cross-variant equality: unsigned and signed integers compare by numeric
// value, a symbol compares equal to both its integer and its name.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Uint(a), Uint(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Uint(a), Int(b)) | (Int(b), Uint(a)) => {
                i64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Float(a), Float(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Symbol { name: n1, value: v1 }, Symbol { name: n2, value: v2 }) => {
                n1 == n2 && v1 == v2
            }
            (Symbol { value, .. }, Uint(x)) | (Uint(x), Symbol { value, .. }) => {
                i64::try_from(*x).map(|x| x == *value).unwrap_or(false)
            }
            (Symbol { value, .. }, Int(x)) | (Int(x), Symbol { value, .. }) => value == x,
            (Symbol { name, .. }, Str(s)) | (Str(s), Symbol { name, .. }) => name == s,
            (Unit, Unit) => true,
            _ => false,
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::$variant(x as $conv)
            }
        })*
    };
}

value_from_int! {
    u8 => Uint as u64, u16 => Uint as u64, u32 => Uint as u64,
    u64 => Uint as u64, usize => Uint as u64,
    i8 => Int as i64, i16 => Int as i64, i32 => Int as i64, i64 => Int as i64,
    f32 => Float as f64, f64 => Float as f64,
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

/// Ordered name-to-value mapping produced by `record` and `flags_map`.
///
/// Preserves insertion order. Names beginning with `_` are engine-internal
/// markers: they are skipped by equality, search, and (by default) pretty
/// printing.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record { entries: Vec::new() }
    }

    /// Insert or replace; replacement keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let i = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(i).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Depth-first search for the first value under `name`, descending into
    /// nested records and lists. A hit at the current level wins over a
    /// deeper one.
    pub fn search(&self, name: &str) -> Option<&Value> {
        for (k, v) in &self.entries {
            if k == name {
                return Some(v);
            }
        }
        for (_, v) in &self.entries {
            if let Some(hit) = v.search(name) {
                return Some(hit);
            }
        }
        None
    }

    /// First-hit variant of [`search_all_regex`](Record::search_all_regex);
    /// like [`search`](Record::search), a hit at the current level wins over
    /// a deeper one. Hidden `_` entries never match a pattern.
    pub fn search_regex(&self, pattern: &Regex) -> Option<&Value> {
        for (k, v) in &self.entries {
            if !k.starts_with('_') && pattern.is_match(k) {
                return Some(v);
            }
        }
        for (_, v) in &self.entries {
            if let Some(hit) = v.search_regex(pattern) {
                return Some(hit);
            }
        }
        None
    }

    /// All values under `name`, depth first.
    pub fn search_all(&self, name: &str) -> Vec<&Value> {
        let mut out = Vec::new();
        collect_matches(self, &mut out, &|k| k == name);
        out
    }

    /// Like [`search_all`](Record::search_all), matching names against a
    /// compiled regex.
    pub fn search_all_regex(&self, pattern: &Regex) -> Vec<&Value> {
        let mut out = Vec::new();
        collect_matches(self, &mut out, &|k| pattern.is_match(k));
        out
    }
}

fn collect_matches<'a>(r: &'a Record, out: &mut Vec<&'a Value>, pred: &dyn Fn(&str) -> bool) {
    for (k, v) in &r.entries {
        if !k.starts_with('_') && pred(k) {
            out.push(v);
        }
        collect_from_value(v, out, pred);
    }
}

fn collect_from_value<'a>(v: &'a Value, out: &mut Vec<&'a Value>, pred: &dyn Fn(&str) -> bool) {
    match v {
        Value::Record(inner) => collect_matches(inner, out, pred),
        Value::List(items) => {
            for item in items {
                collect_from_value(item, out, pred);
            }
        }
        _ => {}
    }
}

// Unordered equality ignoring `_`-hidden entries.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        fn visible(r: &Record) -> impl Iterator<Item = &(String, Value)> {
            r.entries.iter().filter(|(k, _)| !k.starts_with('_'))
        }
        if visible(self).count() != visible(other).count() {
            return false;
        }
        visible(self).all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut r = Record::new();
        for (k, v) in iter {
            r.insert(k, v);
        }
        r
    }
}

/// Build a [`Record`] from `name => value` pairs.
///
/// ```
/// use binform::{rec, Value};
/// let r = rec! { "width" => 3u8, "height" => 2u8 };
/// assert_eq!(r.get("width"), Some(&Value::Uint(3)));
/// ```
#[macro_export]
macro_rules! rec {
    ($($name:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut r = $crate::Record::new();
        $(r.insert($name, $value);)*
        r
    }};
}
