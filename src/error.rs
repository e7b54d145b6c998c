//! Error type shared by parse, build, and size-of.
//!
//! Every variant carries the breadcrumb path of the composite nesting where it
//! was raised, e.g. `(parsing) -> header -> count`. Composites extend the path
//! before dispatching to a child, so errors are tagged at the raise site.

/// Error raised by any construct operation.
///
/// The variants are error *kinds*, not identities: many constructs raise the
/// same kind (every short read is `Stream`, every exhausted alternation is
/// `Select`). [`Error::Cancel`] is not a failure but an in-band control
/// signal, emitted by `stop_if` and parse hooks and caught only by greedy
/// range consumers; anywhere else it propagates like an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("stream error in {path}: {message}")]
    Stream { message: String, path: String },
    #[error("format error in {path}: {message}")]
    Format { message: String, path: String },
    #[error("string error in {path}: {message}")]
    String { message: String, path: String },
    #[error("range error in {path}: {message}")]
    Range { message: String, path: String },
    #[error("mapping error in {path}: {message}")]
    Mapping { message: String, path: String },
    #[error("select error in {path}: {message}")]
    Select { message: String, path: String },
    #[error("terminator error in {path}: {message}")]
    Terminator { message: String, path: String },
    #[error("padding error in {path}: {message}")]
    Padding { message: String, path: String },
    #[error("size of construct is not defined in {path}: {message}")]
    SizeUnknown { message: String, path: String },
    #[error("context error in {path}: {message}")]
    Context { message: String, path: String },
    #[error("alignment error in {path}: {message}")]
    Alignment { message: String, path: String },
    #[error("validation error in {path}: {message}")]
    Validation { message: String, path: String },
    /// Control signal, not a failure. See type-level docs.
    #[error("parsing cancelled in {path}")]
    Cancel { path: String },
}

macro_rules! ctor {
    ($fn_name:ident, $variant:ident) => {
        pub fn $fn_name(path: &str, message: impl Into<String>) -> Self {
            Error::$variant {
                message: message.into(),
                path: path.to_string(),
            }
        }
    };
}

impl Error {
    ctor!(stream, Stream);
    ctor!(format, Format);
    ctor!(string, String);
    ctor!(range, Range);
    ctor!(mapping, Mapping);
    ctor!(select, Select);
    ctor!(terminator, Terminator);
    ctor!(padding, Padding);
    ctor!(size_unknown, SizeUnknown);
    ctor!(context, Context);
    ctor!(alignment, Alignment);
    ctor!(validation, Validation);

    pub fn cancel(path: &str) -> Self {
        Error::Cancel { path: path.to_string() }
    }

    /// The breadcrumb path attached at the raise site.
    pub fn path(&self) -> &str {
        match self {
            Error::Stream { path, .. }
            | Error::Format { path, .. }
            | Error::String { path, .. }
            | Error::Range { path, .. }
            | Error::Mapping { path, .. }
            | Error::Select { path, .. }
            | Error::Terminator { path, .. }
            | Error::Padding { path, .. }
            | Error::SizeUnknown { path, .. }
            | Error::Context { path, .. }
            | Error::Alignment { path, .. }
            | Error::Validation { path, .. }
            | Error::Cancel { path } => path,
        }
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, Error::Cancel { .. })
    }

    /// During sizing a missing context key means the size is not statically
    /// determinable; reclassify so callers see a size error, not a context one.
    pub fn for_sizing(self) -> Self {
        match self {
            Error::Context { message, path } => Error::SizeUnknown { message, path },
            other => other,
        }
    }
}
