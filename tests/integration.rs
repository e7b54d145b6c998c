//! End-to-end scenarios: whole formats defined, parsed, built, and sized.

use std::io::{Cursor, Seek};

use binform::prelude::*;
use binform::{rec, Error};

fn bmp_like() -> Con {
    record([
        "signature" / constant(b"BMP"),
        "width" / int8ub(),
        "height" / int8ub(),
        "pixels" / array(this("width") * this("height"), byte()),
    ])
}

#[test]
fn bmp_header_build_and_parse() {
    let bmp = bmp_like();
    let value = Value::Record(rec! {
        "width" => 3u8,
        "height" => 2u8,
        "pixels" => Value::List(vec![
            Value::Uint(7), Value::Uint(8), Value::Uint(9),
            Value::Uint(11), Value::Uint(12), Value::Uint(13),
        ]),
    });
    let built = bmp.build(&value).expect("build");
    assert_eq!(built, b"BMP\x03\x02\x07\x08\x09\x0b\x0c\x0d");

    let parsed = bmp.parse(&built).expect("parse");
    let r = parsed.as_record().expect("record");
    assert_eq!(r.get("width"), Some(&Value::Uint(3)));
    assert_eq!(r.get("height"), Some(&Value::Uint(2)));
    assert_eq!(
        r.get("pixels").and_then(Value::as_list).map(|l| l.len()),
        Some(6)
    );
}

#[test]
fn bit_struct_scenario() {
    let c = bit_record([
        "a" / flag(),
        "b" / bits_int(4),
        "c" / bits_int(10),
        "d" / padding(1usize),
    ]);
    let v = c.parse(b"\xbe\xef").expect("parse");
    let r = v.as_record().expect("record");
    assert_eq!(r.get("a"), Some(&Value::Bool(true)));
    assert_eq!(r.get("b"), Some(&Value::Uint(7)));
    assert_eq!(r.get("c"), Some(&Value::Uint(887)));
    assert_eq!(r.get("d"), Some(&Value::Unit));
    assert_eq!(c.size_of().expect("size"), 2);

    // the padding bit was 1 in the input but always builds as zero
    let rebuilt = c.build(&v).expect("build");
    assert_eq!(rebuilt, b"\xbe\xee");
}

#[test]
fn enum_scenario() {
    let c = symbol_map(byte(), [("g", 8), ("h", 11)]);
    let v = c.parse(b"\x08").expect("parse");
    assert_eq!(v, Value::Str("g".into()));
    assert_eq!(v, Value::Uint(8));

    assert_eq!(c.build(&Value::Str("g".into())).expect("build"), b"\x08");
    assert_eq!(c.build(&Value::Uint(11)).expect("build"), b"\x0b");
    // unknown integers pass through on parse
    assert_eq!(c.parse(b"\xff").expect("parse"), Value::Uint(255));
    // unknown names fail on build
    let err = c.build(&Value::Str("nope".into())).unwrap_err();
    assert!(matches!(err, Error::Mapping { .. }));
}

#[test]
fn repeat_until_scenario() {
    let c = repeat_until(|obj, _, _| Ok(obj.as_u64().unwrap_or(0) > 10), byte());
    let mut cursor = Cursor::new(&b"\x01\x05\x08\xff\x01\x02\x03"[..]);
    let v = c.parse_stream(&mut cursor).expect("parse");
    assert_eq!(
        v,
        Value::List(vec![
            Value::Uint(1),
            Value::Uint(5),
            Value::Uint(8),
            Value::Uint(255)
        ])
    );
    assert_eq!(cursor.stream_position().unwrap(), 4);
}

#[test]
fn varint_prefixed_utf8_scenario() {
    let c = pascal_string(varint(), Encoding::Utf8);
    let built = c.build(&Value::Str("Афон".into())).expect("build");
    assert_eq!(built, b"\x08\xd0\x90\xd1\x84\xd0\xbe\xd0\xbd");
    assert_eq!(c.parse(&built).expect("parse"), Value::Str("Афон".into()));
}

#[test]
fn nested_path_in_stream_error() {
    let c = record([
        "a" / record([
            "b" / record([
                "c" / record(["foo" / bytes_fixed(8usize)]),
            ]),
        ]),
    ]);
    let err = c.parse(b"\x01\x02\x03").unwrap_err();
    assert!(matches!(err, Error::Stream { .. }));
    assert_eq!(err.path(), "(parsing) -> a -> b -> c -> foo");
}

// ---- invariants ----

#[test]
fn round_trip_parse_then_build() {
    let cases: Vec<(Con, &[u8])> = vec![
        (int32ub(), b"\x12\x34\x56\x78"),
        (int24sl(), b"\xff\xff\xff"),
        (float64b(), b"\x40\x09\x21\xfb\x54\x44\x2d\x18"),
        (varint(), b"\xac\x02"),
        (cstring(Encoding::Utf8), b"hey\x00"),
        (
            record(["n" / byte(), "data" / bytes_fixed(this("n"))]),
            b"\x02ab",
        ),
    ];
    for (c, bytes) in cases {
        let v = c.parse(bytes).expect("parse");
        assert_eq!(c.build(&v).expect("build"), bytes, "{c:?}");
    }
}

#[test]
fn round_trip_build_then_parse() {
    let c = record([
        "kind" / symbol_map(byte(), [("x", 1), ("y", 2)]),
        "score" / int16ub(),
        "label" / padded_string(8usize, Encoding::Utf8),
    ]);
    let v = Value::Record(rec! {
        "kind" => Value::Str("y".into()),
        "score" => 999u16,
        "label" => "ok",
    });
    let parsed = c.parse(&c.build(&v).expect("build")).expect("parse");
    let r = parsed.as_record().unwrap();
    assert_eq!(r.get("kind"), Some(&Value::Str("y".into())));
    assert_eq!(r.get("score"), Some(&Value::Uint(999)));
    assert_eq!(r.get("label"), Some(&Value::Str("ok".into())));
}

#[test]
fn size_of_matches_built_length_and_consumption() {
    let c = record([
        "a" / int16ub(),
        "b" / int32ul(),
        "c" / bytes_fixed(3usize),
        "d" / flag(),
    ]);
    let n = c.size_of().expect("size") as usize;
    let v = Value::Record(rec! {
        "a" => 1u16,
        "b" => 2u32,
        "c" => Value::Bytes(vec![9, 9, 9]),
        "d" => true,
    });
    let built = c.build(&v).expect("build");
    assert_eq!(built.len(), n);

    let mut padded_input = built.clone();
    padded_input.extend_from_slice(b"trailing");
    let mut cursor = Cursor::new(&padded_input[..]);
    c.parse_stream(&mut cursor).expect("parse");
    assert_eq!(cursor.stream_position().unwrap() as usize, n);
}

#[test]
fn endianness_symmetry() {
    let widths: Vec<(Con, Con, usize)> = vec![
        (int16ub(), int16ul(), 2),
        (int24ub(), int24ul(), 3),
        (int32ub(), int32ul(), 4),
        (int64ub(), int64ul(), 8),
    ];
    for (be, le, n) in widths {
        let bytes: Vec<u8> = (1..=n as u8).collect();
        let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
        assert_eq!(
            be.parse(&reversed).expect("be"),
            le.parse(&bytes).expect("le"),
            "width {n}"
        );
    }
}

#[test]
fn context_isolation_between_frames() {
    // the inner record binds its own "n"; the outer array count must keep
    // seeing the outer one
    let c = record([
        "n" / byte(),
        "items" / array(this("n"), record(["n" / byte(), "data" / bytes_fixed(this("n"))])),
    ]);
    let v = c.parse(b"\x02\x01a\x02bc").expect("parse");
    let items = v.as_record().unwrap().get("items").and_then(Value::as_list).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[1].as_record().unwrap().get("data"),
        Some(&Value::Bytes(b"bc".to_vec()))
    );
}

// ---- boundary behaviors ----

#[test]
fn varint_boundaries() {
    let c = varint();
    for n in [0u64, 127, 128, 16383, 16384, u64::MAX] {
        let built = c.build(&Value::Uint(n)).expect("build");
        assert_eq!(c.parse(&built).expect("parse"), Value::Uint(n), "{n}");
    }
    assert_eq!(c.build(&Value::Uint(127)).unwrap().len(), 1);
    assert_eq!(c.build(&Value::Uint(128)).unwrap().len(), 2);
    assert_eq!(c.build(&Value::Uint(16384)).unwrap().len(), 3);
}

#[test]
fn zigzag_small_values() {
    let c = zigzag();
    for (v, encoded) in [(-1i64, 1u8), (1, 2), (-2, 3)] {
        assert_eq!(c.build(&Value::Int(v)).expect("build"), vec![encoded]);
        assert_eq!(c.parse(&[encoded]).expect("parse"), Value::Int(v));
    }
    for v in [i64::MIN, i64::MAX, 0, 42, -42] {
        let built = c.build(&Value::Int(v)).expect("build");
        assert_eq!(c.parse(&built).expect("parse"), Value::Int(v));
    }
}

#[test]
fn greedy_range_empty_input() {
    let c = greedy_range(int16ub());
    let mut cursor = Cursor::new(&b""[..]);
    let v = c.parse_stream(&mut cursor).expect("parse");
    assert_eq!(v, Value::List(vec![]));
    assert_eq!(cursor.stream_position().unwrap(), 0);
}

#[test]
fn greedy_range_rewinds_partial_item() {
    let c = greedy_range(int16ub());
    let mut cursor = Cursor::new(&b"\x00\x01\x00\x02\xff"[..]);
    let v = c.parse_stream(&mut cursor).expect("parse");
    assert_eq!(v, Value::List(vec![Value::Uint(1), Value::Uint(2)]));
    // rewound to just after the last whole item
    assert_eq!(cursor.stream_position().unwrap(), 4);
}

#[test]
fn select_with_no_alternatives_fails() {
    let c = select([]);
    let err = c.parse(b"\x00").unwrap_err();
    assert!(matches!(err, Error::Select { .. }));
}

// ---- parameters and files ----

#[test]
fn params_reach_expressions() {
    let c = record(["data" / bytes_fixed(param("n"))]);
    let v = c
        .parse_with(b"abcd", rec! { "n" => 4u8 })
        .expect("parse");
    assert_eq!(
        v.as_record().unwrap().get("data"),
        Some(&Value::Bytes(b"abcd".to_vec()))
    );
}

#[test]
fn file_round_trip() {
    let c = record(["a" / int16ub(), "b" / cstring(Encoding::Utf8)]);
    let v = Value::Record(rec! { "a" => 7u16, "b" => "file" });
    let path = std::env::temp_dir().join("binform_file_round_trip.bin");
    c.build_file(&v, &path).expect("write");
    let parsed = c.parse_file(&path).expect("read");
    assert_eq!(parsed.as_record().unwrap().get("a"), Some(&Value::Uint(7)));
    std::fs::remove_file(&path).ok();
}

#[test]
fn union_shares_window_and_resumes_at_designated_member() {
    let c = union(
        ["word" / int16ub(), "bytes" / bytes_fixed(2usize)],
        Some(UnionFrom::Name("word")),
    );
    let mut cursor = Cursor::new(&b"\x01\x02rest"[..]);
    let v = c.parse_stream(&mut cursor).expect("parse");
    let r = v.as_record().unwrap();
    assert_eq!(r.get("word"), Some(&Value::Uint(0x0102)));
    assert_eq!(r.get("bytes"), Some(&Value::Bytes(vec![1, 2])));
    assert_eq!(cursor.stream_position().unwrap(), 2);

    // build writes exactly one member
    let built = c
        .build(&Value::Record(rec! { "word" => 0x0102u16 }))
        .expect("build");
    assert_eq!(built, b"\x01\x02");
}

#[test]
fn union_build_writes_the_designated_member() {
    // the designated member is deliberately not first in declaration order,
    // and the given record disagrees between members
    let c = union(
        ["first" / int16ub(), "second" / int16ub()],
        Some(UnionFrom::Name("second")),
    );
    let built = c
        .build(&Value::Record(rec! { "first" => 0x1111u16, "second" => 0x2222u16 }))
        .expect("build");
    assert_eq!(built, b"\x22\x22");

    // round trip: parse fills every member, build must still pick "second"
    let parsed = c.parse(b"\x01\x02").expect("parse");
    assert_eq!(c.build(&parsed).expect("build"), b"\x01\x02");

    // designated member absent from the value
    let err = c
        .build(&Value::Record(rec! { "first" => 0x1111u16 }))
        .unwrap_err();
    assert!(matches!(err, Error::Select { .. }));
}

#[test]
fn union_without_parsefrom_stays_at_start() {
    let c = union(["w" / int16ub()], None);
    let mut cursor = Cursor::new(&b"\x01\x02"[..]);
    c.parse_stream(&mut cursor).expect("parse");
    assert_eq!(cursor.stream_position().unwrap(), 0);
}

#[test]
fn pointer_restores_position() {
    let c = record([
        "off" / byte(),
        "far" / pointer(this("off"), byte()),
        "next" / byte(),
    ]);
    let v = c.parse(b"\x03\xaa\xbb\xcc").expect("parse");
    let r = v.as_record().unwrap();
    assert_eq!(r.get("far"), Some(&Value::Uint(0xcc)));
    // "next" parsed right after "off"
    assert_eq!(r.get("next"), Some(&Value::Uint(0xaa)));
}

#[test]
fn stop_if_cancels_greedy_range_only() {
    // each item: a flag byte, stop when it is zero
    let item = record(["v" / byte(), stop_if(this("v").eq_to(0u8))]);
    let c = greedy_range(item);
    let v = c.parse(b"\x01\x02\x00\x03").expect("parse");
    // the cancelling item itself is not kept
    assert_eq!(v.as_list().map(|l| l.len()), Some(2));

    // outside a range the signal is an error
    let bare = record(["v" / byte(), stop_if(this("v").eq_to(0u8))]);
    let err = bare.parse(b"\x00").unwrap_err();
    assert!(err.is_cancel());
}

#[test]
fn parse_hook_can_replace_and_cancel() {
    // operator form
    let doubled = byte() * hook(|v, _ctx| Ok(Value::Uint(v.as_u64().unwrap_or(0) * 2)));
    assert_eq!(doubled.parse(b"\x05").unwrap(), Value::Uint(10));

    let c = greedy_range(byte() * hook(|v, _ctx| {
        if v == Value::Uint(0) {
            Err(Error::cancel("(hook)"))
        } else {
            Ok(v)
        }
    }));
    let v = c.parse(b"\x01\x02\x00\x03").expect("parse");
    assert_eq!(v.as_list().map(|l| l.len()), Some(2));

    // method form
    let tripled = byte().on_parse(|v, _ctx| Ok(Value::Uint(v.as_u64().unwrap_or(0) * 3)));
    assert_eq!(tripled.parse(b"\x02").unwrap(), Value::Uint(6));
}

#[test]
fn length_field_rebuilt_from_payload() {
    let c = record([
        "len" / rebuild(byte(), this("payload").length()),
        "payload" / bytes_fixed(this("len")),
    ]);
    let built = c
        .build(&Value::Record(rec! { "payload" => Value::Bytes(b"abc".to_vec()) }))
        .expect("build");
    assert_eq!(built, b"\x03abc");
    let v = c.parse(&built).expect("parse");
    assert_eq!(v.as_record().unwrap().get("len"), Some(&Value::Uint(3)));
}

#[test]
fn seek_then_tell() {
    let c = sequence([seek_to(2u8), tell()]);
    let v = c.parse(b"\x00\x00\x00\x00").expect("parse");
    assert_eq!(v, Value::List(vec![Value::Uint(2), Value::Uint(2)]));
}
