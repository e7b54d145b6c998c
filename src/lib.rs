//! # binform — declarative binary format toolkit
//!
//! A symmetric parse/build engine over trees of composable *constructs*.
//! One definition describes a format in both directions: parsing turns bytes
//! into structured [`Value`]s, building turns values back into bytes, and
//! the same definition reports a static size where one exists.
//!
//! ## Defining a format
//!
//! Constructs compose through plain functions and a few operators (`/` to
//! name a field, `+` to concatenate into a record, `*` to attach docs):
//!
//! ```
//! use binform::prelude::*;
//!
//! let bmp = record([
//!     "signature" / constant(b"BMP"),
//!     "width" / int8ub(),
//!     "height" / int8ub(),
//!     "pixels" / array(this("width") * this("height"), byte()),
//! ]);
//!
//! let v = bmp.parse(b"BMP\x03\x02\x07\x08\x09\x0b\x0c\x0d").unwrap();
//! assert_eq!(v.as_record().unwrap().get("width"), Some(&Value::Uint(3)));
//!
//! let built = bmp.build(&v).unwrap();
//! assert_eq!(built, b"BMP\x03\x02\x07\x08\x09\x0b\x0c\x0d");
//! ```
//!
//! ## Families
//!
//! - **Primitives**: the fixed-width integer grid ([`int16ub`] and friends),
//!   floats, [`varint`]/[`zigzag`], raw [`bytes_fixed`]/[`greedy_bytes`],
//!   [`flag`], [`padding`], [`constant`].
//! - **Strings**: [`padded_string`], [`pascal_string`], [`cstring`],
//!   [`greedy_string`] over a fixed [`Encoding`] allow-list.
//! - **Composites**: [`record`], [`sequence`], [`array`], [`greedy_range`],
//!   [`repeat_until`], [`union`], [`select`].
//! - **Adapters**: [`symbol_map`], [`flags_map`], [`prefixed`],
//!   [`null_terminated`], [`aligned`]/[`padded`], [`bitwise`]/[`bytewise`],
//!   [`byte_swapped`]/[`bits_swapped`], [`transformed`]/[`restreamed`].
//! - **Meta**: [`computed`], [`rebuild`], [`pointer`], [`peek`], [`tell`],
//!   [`seek_to`], [`raw_copy`], [`if_then_else`], [`switch`], [`stop_if`].
//!
//! ## Context expressions
//!
//! Counts, sizes, offsets, and predicates accept deferred expressions over
//! already-parsed peers: `this("width") * this("height")` above multiplies
//! two earlier fields at parse/build time. See the [`expr`] module.
//!
//! ## Errors
//!
//! Every error carries a breadcrumb path like
//! `(parsing) -> header -> count`, assembled by the enclosing composites.

pub mod adapters;
pub mod bytes;
pub mod composite;
pub mod context;
pub mod core;
pub mod error;
pub mod expr;
pub mod meta;
pub mod numbers;
pub mod pretty;
pub mod stream;
pub mod strings;
pub mod value;

pub use crate::adapters::{
    aligned, aligned_pattern, bit_record, bits_swapped, bitwise, byte_swapped, bytewise,
    flags_map, null_terminated, null_terminated_opts, padded, padded_pattern, prefixed,
    prefixed_array, prefixed_inclusive, restreamed, symbol_map, transformed,
};
pub use crate::bytes::{
    bytes_fixed, const_of, constant, flag, greedy_bytes, padding, pass_, terminated,
};
pub use crate::composite::{
    array, greedy_range, greedy_range_discard, optional, record, repeat_until,
    repeat_until_discard, select, sequence, union, UnionFrom,
};
pub use crate::context::{Context, Mode};
pub use crate::core::{hook, Con, Construct, Hook};
pub use crate::error::Error;
pub use crate::expr::{by, index, lit, param, parent, root_field, this, Expr};
pub use crate::meta::{
    check, computed, default_of, if_then, if_then_else, peek, pointer, raw_copy, rebuild,
    seek_to, seek_to_whence, stop_if, switch, tell, Whence,
};
pub use crate::numbers::{
    bit, bits_int, bits_integer, byte, bytes_int, fixed_int, float16b, float16l, float32b,
    float32l, float64b, float64l, int16sb, int16sl, int16sn, int16ub, int16ul, int16un,
    int24sb, int24sl, int24sn, int24ub, int24ul, int24un, int32sb, int32sl, int32sn, int32ub,
    int32ul, int32un, int64sb, int64sl, int64sn, int64ub, int64ul, int64un, int8sb, int8sl,
    int8sn, int8ub, int8ul, int8un, nibble, octet, varint, zigzag, Endian,
};
pub use crate::pretty::{
    pretty, set_print_false_flags, set_print_full_strings, set_print_private_entries,
};
pub use crate::strings::{cstring, greedy_string, padded_string, pascal_string, Encoding};
pub use crate::value::{Record, Value};

/// One-stop import for format definitions.
pub mod prelude {
    pub use crate::adapters::*;
    pub use crate::bytes::*;
    pub use crate::composite::*;
    pub use crate::core::{hook, Con, Hook};
    pub use crate::expr::{by, index, lit, param, parent, root_field, this};
    pub use crate::meta::*;
    pub use crate::numbers::*;
    pub use crate::strings::*;
    pub use crate::value::{Record, Value};
    pub use crate::{rec, Error};
}
