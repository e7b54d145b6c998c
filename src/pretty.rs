//! Multi-line display of parsed values, with process-wide print toggles.
//!
//! The toggles only affect this module's output; parse and build never read
//! them.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::value::Value;

static PRINT_FULL_STRINGS: AtomicBool = AtomicBool::new(false);
static PRINT_FALSE_FLAGS: AtomicBool = AtomicBool::new(false);
static PRINT_PRIVATE_ENTRIES: AtomicBool = AtomicBool::new(false);

/// Show byte and text strings unabridged instead of truncating to 16 bytes
/// / 32 characters.
pub fn set_print_full_strings(enabled: bool) {
    PRINT_FULL_STRINGS.store(enabled, Ordering::Relaxed);
}

/// Show false entries of flag records, not only the set ones.
pub fn set_print_false_flags(enabled: bool) {
    PRINT_FALSE_FLAGS.store(enabled, Ordering::Relaxed);
}

/// Show engine-internal `_`-prefixed record entries.
pub fn set_print_private_entries(enabled: bool) {
    PRINT_PRIVATE_ENTRIES.store(enabled, Ordering::Relaxed);
}

/// Render a value as an indented tree.
pub fn pretty(value: &Value) -> String {
    let mut out = String::new();
    render(value, 0, &mut out);
    out
}

fn render(value: &Value, indent: usize, out: &mut String) {
    let pad = "    ".repeat(indent);
    match value {
        Value::Record(r) => {
            let is_flags = r.get("_flags").is_some();
            out.push_str("Record");
            for (k, v) in r.iter() {
                if k.starts_with('_') && !PRINT_PRIVATE_ENTRIES.load(Ordering::Relaxed) {
                    continue;
                }
                if is_flags
                    && !PRINT_FALSE_FLAGS.load(Ordering::Relaxed)
                    && v == &Value::Bool(false)
                {
                    continue;
                }
                out.push('\n');
                out.push_str(&pad);
                out.push_str("    ");
                out.push_str(k);
                out.push_str(" = ");
                render(v, indent + 1, out);
            }
        }
        Value::List(items) => {
            out.push_str("List");
            for v in items {
                out.push('\n');
                out.push_str(&pad);
                out.push_str("    ");
                render(v, indent + 1, out);
            }
        }
        Value::Bytes(b) => out.push_str(&format_bytes(b)),
        Value::Str(s) => out.push_str(&format_text(s)),
        Value::Uint(x) => out.push_str(&x.to_string()),
        Value::Int(x) => out.push_str(&x.to_string()),
        Value::Float(x) => out.push_str(&x.to_string()),
        Value::Bool(x) => out.push_str(if *x { "true" } else { "false" }),
        Value::Symbol { name, value } => out.push_str(&format!("{name} ({value})")),
        Value::Unit => out.push_str("None"),
    }
}

fn format_bytes(b: &[u8]) -> String {
    let full = PRINT_FULL_STRINGS.load(Ordering::Relaxed);
    let shown = if full { b } else { &b[..b.len().min(16)] };
    let hex: String = shown.iter().map(|x| format!("{x:02x} ")).collect();
    if shown.len() < b.len() {
        format!("{}... (total {})", hex.trim_end(), b.len())
    } else {
        format!("{} (total {})", hex.trim_end(), b.len())
    }
}

fn format_text(s: &str) -> String {
    let full = PRINT_FULL_STRINGS.load(Ordering::Relaxed);
    let count = s.chars().count();
    if full || count <= 32 {
        format!("{s:?} (total {count})")
    } else {
        let truncated: String = s.chars().take(32).collect();
        format!("{truncated:?}... (total {count})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rec;

    #[test]
    fn records_render_nested() {
        let v = Value::Record(rec! {
            "width" => 3u8,
            "inner" => rec! { "x" => true },
        });
        let s = pretty(&v);
        assert!(s.contains("width = 3"));
        assert!(s.contains("x = true"));
    }

    #[test]
    fn hidden_entries_skipped_by_default() {
        let mut r = rec! { "a" => 1u8 };
        r.insert("_marker", true);
        let s = pretty(&Value::Record(r));
        assert!(!s.contains("_marker"));
    }

    #[test]
    fn long_bytes_truncated() {
        let s = pretty(&Value::Bytes(vec![0xab; 40]));
        assert!(s.contains("... (total 40)"));
    }
}
