//! Parse fuzz target: feed arbitrary bytes to a representative construct.
//! Parsing must not panic; it returns Ok(Value) or Err(Error).
//! Build with: cargo fuzz run parse_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use binform::prelude::*;

    let format = record([
        "magic" / constant(b"FZ"),
        "count" / byte(),
        "items" / array(this("count"), int16ub()),
        "name" / cstring(Encoding::Utf8),
        "tail" / greedy_range(varint()),
    ]);
    let _ = format.parse(data);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parse_fuzz");
}
