//! Per-construct behavior tests: one section per family.

use binform::prelude::*;
use binform::{rec, Error};

// ==================== numerics ====================

#[test]
fn integer_grid_spot_checks() {
    assert_eq!(int16ub().parse(b"\x01\x02").unwrap(), Value::Uint(0x0102));
    assert_eq!(int16ul().parse(b"\x01\x02").unwrap(), Value::Uint(0x0201));
    assert_eq!(int24ub().parse(b"\x01\x02\x03").unwrap(), Value::Uint(0x010203));
    assert_eq!(int8sb().parse(b"\xff").unwrap(), Value::Int(-1));
    assert_eq!(int32sl().parse(b"\xff\xff\xff\xff").unwrap(), Value::Int(-1));
    assert_eq!(
        int64ub().parse(b"\xff\xff\xff\xff\xff\xff\xff\xff").unwrap(),
        Value::Uint(u64::MAX)
    );
}

#[test]
fn integer_out_of_range_on_build() {
    let err = byte().build(&Value::Uint(256)).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
    let err = int8sb().build(&Value::Int(128)).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
}

#[test]
fn short_read_is_stream_error() {
    let err = int32ub().parse(b"\x01\x02").unwrap_err();
    assert!(matches!(err, Error::Stream { .. }));
}

#[test]
fn bytes_int_swapped_is_little_endian() {
    let c = bytes_int(3, false, true);
    assert_eq!(c.parse(b"\x01\x02\x03").unwrap(), Value::Uint(0x030201));
    assert_eq!(c.build(&Value::Uint(0x030201)).unwrap(), b"\x01\x02\x03");
    assert_eq!(c.size_of().unwrap(), 3);
}

#[test]
fn bits_integer_signed_sign_extends() {
    let c = bitwise(record(["v" / bits_integer(4, true, false), "pad" / bits_int(4)]));
    let v = c.parse(b"\xf0").unwrap();
    assert_eq!(v.as_record().unwrap().get("v"), Some(&Value::Int(-1)));
}

#[test]
fn float_widths_round_trip() {
    for c in [float32b(), float32l(), float64b(), float64l()] {
        let built = c.build(&Value::Float(1.5)).unwrap();
        assert_eq!(c.parse(&built).unwrap(), Value::Float(1.5));
    }
    // half precision: 1.5 is exactly representable
    let c = float16b();
    let built = c.build(&Value::Float(1.5)).unwrap();
    assert_eq!(built.len(), 2);
    assert_eq!(c.parse(&built).unwrap(), Value::Float(1.5));
}

#[test]
fn varint_sizeof_fails() {
    assert!(matches!(varint().size_of().unwrap_err(), Error::SizeUnknown { .. }));
}

// ==================== bytes and sentinels ====================

#[test]
fn bytes_fixed_build_checks_length() {
    let c = bytes_fixed(3usize);
    let err = c.build(&Value::Bytes(vec![1, 2])).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
}

#[test]
fn greedy_bytes_takes_rest() {
    assert_eq!(
        greedy_bytes().parse(b"abc").unwrap(),
        Value::Bytes(b"abc".to_vec())
    );
}

#[test]
fn const_mismatch_is_validation_error() {
    let c = constant(b"MAGIC");
    assert!(c.parse(b"MAGIC").is_ok());
    let err = c.parse(b"BOGUS").unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[test]
fn const_of_non_bytes() {
    let c = const_of(int16ub(), 0xcafeu16);
    assert_eq!(c.build(&Value::Unit).unwrap(), b"\xca\xfe");
    assert!(c.parse(b"\xca\xfe").is_ok());
    assert!(c.parse(b"\x00\x00").is_err());
}

#[test]
fn terminated_asserts_eof() {
    let c = sequence([byte(), terminated()]);
    assert!(c.parse(b"\x01").is_ok());
    let err = c.parse(b"\x01\x02").unwrap_err();
    assert!(matches!(err, Error::Terminator { .. }));
}

#[test]
fn flag_parses_any_nonzero_as_true() {
    assert_eq!(flag().parse(b"\x02").unwrap(), Value::Bool(true));
    assert_eq!(flag().build(&Value::Bool(true)).unwrap(), b"\x01");
    assert_eq!(flag().build(&Value::Bool(false)).unwrap(), b"\x00");
}

// ==================== strings ====================

#[test]
fn pascal_string_with_fixed_prefix() {
    let c = pascal_string(byte(), Encoding::Utf8);
    assert_eq!(c.build(&Value::Str("hi".into())).unwrap(), b"\x02hi");
    assert_eq!(c.parse(b"\x02hi").unwrap(), Value::Str("hi".into()));
}

#[test]
fn utf16_cstring_uses_two_byte_nul() {
    let c = cstring(Encoding::Utf16Le);
    let built = c.build(&Value::Str("A".into())).unwrap();
    assert_eq!(built, b"A\x00\x00\x00");
    assert_eq!(c.parse(&built).unwrap(), Value::Str("A".into()));
}

#[test]
fn greedy_string_decodes_rest() {
    assert_eq!(
        greedy_string(Encoding::Latin1).parse(b"caf\xe9").unwrap(),
        Value::Str("café".into())
    );
}

#[test]
fn string_encoding_error_kind() {
    let err = greedy_string(Encoding::Utf8).parse(b"\xff\xfe").unwrap_err();
    assert!(matches!(err, Error::String { .. }));
}

// ==================== composites ====================

#[test]
fn operators_build_composites() {
    let s = ("a" / byte()) + ("b" / int16ub()) + ("c" / flag());
    let v = s.parse(b"\x01\x00\x02\x01").unwrap();
    let r = v.as_record().unwrap();
    assert_eq!(r.get("a"), Some(&Value::Uint(1)));
    assert_eq!(r.get("b"), Some(&Value::Uint(2)));
    assert_eq!(r.get("c"), Some(&Value::Bool(true)));

    let seq = byte() >> int16ub() >> byte();
    let v = seq.parse(b"\x01\x00\x02\x03").unwrap();
    assert_eq!(
        v,
        Value::List(vec![Value::Uint(1), Value::Uint(2), Value::Uint(3)])
    );

    let documented = byte() * "a humble byte";
    assert_eq!(documented.docs(), Some("a humble byte"));
}

#[test]
fn sequence_names_feed_context_but_not_output() {
    let c = sequence(["n" / byte(), bytes_fixed(this("n"))]);
    let v = c.parse(b"\x02xy").unwrap();
    assert_eq!(
        v,
        Value::List(vec![Value::Uint(2), Value::Bytes(b"xy".to_vec())])
    );
}

#[test]
fn array_wrong_count_is_range_error() {
    let c = array(3u8, byte());
    let err = c.build(&Value::List(vec![Value::Uint(1)])).unwrap_err();
    assert!(matches!(err, Error::Range { .. }));
}

#[test]
fn array_exposes_index() {
    let c = array(3u8, computed(index()));
    let v = c.parse(b"").unwrap();
    assert_eq!(
        v,
        Value::List(vec![Value::Uint(0), Value::Uint(1), Value::Uint(2)])
    );
}

#[test]
fn repeat_until_build_requires_satisfaction() {
    let c = repeat_until(|obj, _, _| Ok(obj.as_u64().unwrap_or(0) > 10), byte());
    let err = c
        .build(&Value::List(vec![Value::Uint(1), Value::Uint(2)]))
        .unwrap_err();
    assert!(matches!(err, Error::Range { .. }));
}

#[test]
fn select_picks_first_success() {
    let c = select([const_of(byte(), 7u8), byte()]);
    assert_eq!(c.parse(b"\x07").unwrap(), Value::Uint(7));
    assert_eq!(c.parse(b"\x09").unwrap(), Value::Uint(9));
}

#[test]
fn optional_yields_unit_on_failure() {
    let c = optional(int32ub());
    assert_eq!(c.parse(b"\x01").unwrap(), Value::Unit);
    assert_eq!(c.parse(b"\x01\x02\x03\x04").unwrap(), Value::Uint(0x01020304));
}

#[test]
fn greedy_range_discard_drops_items() {
    let c = greedy_range_discard(byte());
    assert_eq!(c.parse(b"\x01\x02\x03").unwrap(), Value::List(vec![]));
}

#[test]
#[should_panic(expected = "duplicate field name")]
fn duplicate_struct_names_rejected() {
    record(["x" / byte(), "x" / byte()]);
}

#[test]
#[should_panic(expected = "reserved")]
fn reserved_names_rejected() {
    record(["_io" / byte()]);
}

// ==================== adapters ====================

#[test]
fn flags_map_round_trip() {
    let c = flags_map(byte(), [("fin", 0x01), ("syn", 0x02), ("ack", 0x10)]);
    let v = c.parse(b"\x11").unwrap();
    let r = v.as_record().unwrap();
    assert_eq!(r.get("fin"), Some(&Value::Bool(true)));
    assert_eq!(r.get("syn"), Some(&Value::Bool(false)));
    assert_eq!(r.get("ack"), Some(&Value::Bool(true)));

    assert_eq!(c.build(&v).unwrap(), b"\x11");
    // integers build directly; undeclared bits survive that path
    assert_eq!(c.build(&Value::Uint(0x13)).unwrap(), b"\x13");
    // unknown names do not
    let err = c
        .build(&Value::Record(rec! { "bogus" => true }))
        .unwrap_err();
    assert!(matches!(err, Error::Mapping { .. }));
}

#[test]
fn prefixed_bounds_the_payload() {
    let c = prefixed(byte(), greedy_bytes());
    assert_eq!(c.parse(b"\x03abcdef").unwrap(), Value::Bytes(b"abc".to_vec()));
    assert_eq!(
        c.build(&Value::Bytes(b"abcd".to_vec())).unwrap(),
        b"\x04abcd"
    );
}

#[test]
fn prefixed_inclusive_counts_itself() {
    let c = prefixed_inclusive(byte(), greedy_bytes());
    assert_eq!(c.parse(b"\x04abc").unwrap(), Value::Bytes(b"abc".to_vec()));
    assert_eq!(c.build(&Value::Bytes(b"ab".to_vec())).unwrap(), b"\x03ab");
}

#[test]
fn prefixed_array_counts_items() {
    let c = prefixed_array(byte(), int16ub());
    let v = c.parse(b"\x02\x00\x01\x00\x02").unwrap();
    assert_eq!(v, Value::List(vec![Value::Uint(1), Value::Uint(2)]));
    assert_eq!(c.build(&v).unwrap(), b"\x02\x00\x01\x00\x02");
}

#[test]
fn null_terminated_options() {
    // missing terminator tolerated when not required
    let lenient = null_terminated_opts(greedy_bytes(), b"\x00".to_vec(), false, true, false);
    assert_eq!(lenient.parse(b"abc").unwrap(), Value::Bytes(b"abc".to_vec()));

    // required terminator missing
    let strict = null_terminated(greedy_bytes());
    let err = strict.parse(b"abc").unwrap_err();
    assert!(matches!(err, Error::Terminator { .. }));

    // include keeps the terminator in the fed bytes
    let including = null_terminated_opts(greedy_bytes(), b"\x00".to_vec(), true, true, true);
    assert_eq!(
        including.parse(b"ab\x00").unwrap(),
        Value::Bytes(b"ab\x00".to_vec())
    );
}

#[test]
fn aligned_pads_to_boundary() {
    let c = aligned(4u8, bytes_fixed(5usize));
    let built = c.build(&Value::Bytes(b"hello".to_vec())).unwrap();
    assert_eq!(built, b"hello\x00\x00\x00");
    assert_eq!(c.parse(&built).unwrap(), Value::Bytes(b"hello".to_vec()));
    assert_eq!(c.size_of().unwrap(), 8);

    let err = c.parse(b"helloXXX").unwrap_err();
    assert!(matches!(err, Error::Padding { .. }));
}

#[test]
fn padded_checks_length_and_pattern() {
    let c = padded_pattern(4u8, byte(), 0xcc);
    assert_eq!(c.build(&Value::Uint(9)).unwrap(), b"\x09\xcc\xcc\xcc");
    assert_eq!(c.parse(b"\x09\xcc\xcc\xcc").unwrap(), Value::Uint(9));
    let err = c.parse(b"\x09\x00\x00\x00").unwrap_err();
    assert!(matches!(err, Error::Padding { .. }));
}

#[test]
fn byte_swapped_region() {
    let c = byte_swapped(record(["a" / int16ub(), "b" / byte()]));
    // region 01 02 03 reversed to 03 02 01 before the struct sees it
    let v = c.parse(b"\x01\x02\x03").unwrap();
    let r = v.as_record().unwrap();
    assert_eq!(r.get("a"), Some(&Value::Uint(0x0302)));
    assert_eq!(r.get("b"), Some(&Value::Uint(0x01)));
}

#[test]
fn bits_swapped_reverses_within_bytes() {
    let c = bits_swapped(byte());
    assert_eq!(c.parse(b"\x80").unwrap(), Value::Uint(0x01));
    assert_eq!(c.build(&Value::Uint(0x01)).unwrap(), b"\x80");
}

#[test]
fn bitwise_sizeof_reports_outer_bytes() {
    let c = bitwise(sequence([bits_int(12), bits_int(4)]));
    assert_eq!(c.size_of().unwrap(), 2);
}

// ==================== meta ====================

#[test]
fn computed_has_no_footprint() {
    let c = record([
        "w" / byte(),
        "h" / byte(),
        "area" / computed(this("w") * this("h")),
    ]);
    let v = c.parse(b"\x03\x04").unwrap();
    assert_eq!(v.as_record().unwrap().get("area"), Some(&Value::Uint(12)));
    assert_eq!(c.build(&v).unwrap(), b"\x03\x04");
}

#[test]
fn default_of_fills_missing_values() {
    let c = record(["version" / default_of(byte(), 1u8), "data" / byte()]);
    let built = c
        .build(&Value::Record(rec! { "data" => 5u8 }))
        .unwrap();
    assert_eq!(built, b"\x01\x05");
}

#[test]
fn check_validates_context() {
    let c = record(["n" / byte(), check(this("n").lt(10u8))]);
    assert!(c.parse(b"\x05").is_ok());
    let err = c.parse(b"\x0b").unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[test]
fn if_then_else_branches_on_context() {
    let c = record([
        "wide" / flag(),
        "v" / if_then_else(this("wide"), int16ub(), byte()),
    ]);
    let v = c.parse(b"\x01\x00\x07").unwrap();
    assert_eq!(v.as_record().unwrap().get("v"), Some(&Value::Uint(7)));
    let v = c.parse(b"\x00\x07").unwrap();
    assert_eq!(v.as_record().unwrap().get("v"), Some(&Value::Uint(7)));
}

#[test]
fn switch_dispatches_and_reports_unknown() {
    let c = record([
        "tag" / byte(),
        "body" / switch(
            this("tag"),
            [
                (Value::Uint(1), byte()),
                (Value::Uint(2), int16ub()),
            ],
            None,
        ),
    ]);
    let v = c.parse(b"\x02\x00\x09").unwrap();
    assert_eq!(v.as_record().unwrap().get("body"), Some(&Value::Uint(9)));
    let err = c.parse(b"\x09\x00").unwrap_err();
    assert!(matches!(err, Error::Mapping { .. }));
}

#[test]
fn peek_does_not_consume() {
    let c = sequence([peek(int16ub()), byte()]);
    let v = c.parse(b"\x01\x02").unwrap();
    assert_eq!(
        v,
        Value::List(vec![Value::Uint(0x0102), Value::Uint(0x01)])
    );
}

#[test]
fn tell_reports_offsets() {
    let c = sequence([tell(), int16ub(), tell()]);
    let v = c.parse(b"\x00\x01").unwrap();
    assert_eq!(
        v,
        Value::List(vec![Value::Uint(0), Value::Uint(1), Value::Uint(2)])
    );
}

#[test]
fn raw_copy_captures_bytes_and_value() {
    let c = raw_copy(int16ub());
    let v = c.parse(b"\x01\x02").unwrap();
    let r = v.as_record().unwrap();
    assert_eq!(r.get("data"), Some(&Value::Bytes(vec![1, 2])));
    assert_eq!(r.get("value"), Some(&Value::Uint(0x0102)));
    assert_eq!(r.get("offset1"), Some(&Value::Uint(0)));
    assert_eq!(r.get("offset2"), Some(&Value::Uint(2)));
    assert_eq!(r.get("length"), Some(&Value::Uint(2)));

    // data wins over value on build
    let forged = Value::Record(rec! {
        "data" => Value::Bytes(vec![9, 9]),
        "value" => 1u16,
    });
    assert_eq!(c.build(&forged).unwrap(), vec![9, 9]);

    // value alone gets rendered
    let from_value = Value::Record(rec! { "value" => 0x0102u16 });
    assert_eq!(c.build(&from_value).unwrap(), vec![1, 2]);
}

#[test]
fn pointer_from_end_with_negative_offset() {
    let c = pointer(lit(-1i64), byte());
    assert_eq!(c.parse(b"\x01\x02\x03").unwrap(), Value::Uint(3));
}

// ==================== pretty ====================

#[test]
fn pretty_renders_parse_results() {
    let c = record([
        "name" / cstring(Encoding::Utf8),
        "flags" / flags_map(byte(), [("a", 1), ("b", 2)]),
    ]);
    let v = c.parse(b"hi\x00\x01").unwrap();
    let text = binform::pretty(&v);
    assert!(text.contains("name = \"hi\""));
    assert!(text.contains("a = true"));
    // false flags hidden by default
    assert!(!text.contains("b = false"));
}

// ==================== sizing ====================

#[test]
fn fixed_size_propagates_through_wrappers() {
    assert!(int32ub().is_fixed_size());
    assert!(record(["a" / int16ub(), "b" / byte()]).is_fixed_size());
    assert!(!record(["n" / byte(), "d" / bytes_fixed(this("n"))]).is_fixed_size());
    assert!(symbol_map(byte(), [("x", 1)]).is_fixed_size());
}

#[test]
fn sizeof_with_params() {
    let c = bytes_fixed(param("n"));
    assert_eq!(c.size_of_with(rec! { "n" => 12u8 }).unwrap(), 12);
    assert!(matches!(c.size_of().unwrap_err(), Error::SizeUnknown { .. }));
}
