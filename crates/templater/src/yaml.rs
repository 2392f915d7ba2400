// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Block-style YAML output for `toYaml`.
//!
//! Strings that a YAML 1.1 resolver would read as something else (`yes`,
//! `on`, `~`, `0755`, `1e3`, ...) are double-quoted, so Kubernetes tooling
//! built on go-yaml reads back exactly what was rendered.

use serde_json::{Map, Value};

/// Serializes `value` with sorted keys and two-space indentation. The output
/// ends with a newline.
pub(crate) fn to_string(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Object(map) if !map.is_empty() => write_map(map, 0, &mut out),
        Value::Array(items) if !items.is_empty() => write_seq(items, 0, &mut out),
        scalar => {
            out.push_str(&inline(scalar));
            out.push('\n');
        }
    }
    out
}

fn is_block(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

fn write_map(map: &Map<String, Value>, indent: usize, out: &mut String) {
    for (key, value) in map {
        push_indent(indent, out);
        out.push_str(&string(key));
        out.push(':');
        match value {
            Value::Object(child) if !child.is_empty() => {
                out.push('\n');
                write_map(child, indent + 2, out);
            }
            // Sequences under a key sit at the key's own indentation.
            Value::Array(items) if !items.is_empty() => {
                out.push('\n');
                write_seq(items, indent, out);
            }
            scalar => {
                out.push(' ');
                out.push_str(&inline(scalar));
                out.push('\n');
            }
        }
    }
}

fn write_seq(items: &[Value], indent: usize, out: &mut String) {
    for item in items {
        push_indent(indent, out);
        out.push_str("- ");
        if is_block(item) {
            let mut nested = String::new();
            match item {
                Value::Object(map) => write_map(map, indent + 2, &mut nested),
                Value::Array(inner) => write_seq(inner, indent + 2, &mut nested),
                _ => {}
            }
            // The first nested line continues after the dash.
            out.push_str(&nested[indent + 2..]);
        } else {
            out.push_str(&inline(item));
            out.push('\n');
        }
    }
}

fn push_indent(indent: usize, out: &mut String) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn inline(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string(s),
        Value::Array(_) => "[]".to_string(),
        Value::Object(_) => "{}".to_string(),
    }
}

fn string(s: &str) -> String {
    if needs_quotes(s) {
        // JSON string syntax is valid YAML double-quoted syntax.
        Value::String(s.to_string()).to_string()
    } else {
        s.to_string()
    }
}

/// Words YAML 1.1 resolves to booleans or null.
const RESERVED: [&str; 11] = ["y", "n", "yes", "no", "on", "off", "true", "false", "null", "~", ""];

fn needs_quotes(s: &str) -> bool {
    if RESERVED.contains(&s.to_ascii_lowercase().as_str()) {
        return true;
    }
    let mut chars = s.chars();
    let (Some(first), Some(last)) = (chars.next(), s.chars().last()) else {
        return true;
    };
    if first.is_whitespace() || last.is_whitespace() || last == ':' {
        return true;
    }
    // Indicators, and anything that may start a number, date or special float.
    if "-?:,[]{}#&*!|>'\"%@`+.".contains(first) || first.is_ascii_digit() {
        return true;
    }
    s.contains(": ")
        || s.contains(" #")
        || s.chars().any(|c| c.is_control() || c == '\u{feff}')
}
