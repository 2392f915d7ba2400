// SPDX-License-Identifier: Apache-2.0 OR MIT
#[cfg(test)]
use templater_engine::EvalContext;
use templater_engine::{
    format_value, is_empty, is_truthy, type_name, value_to_string, Error, FunctionRegistryBuilder,
};
use serde_json::Value;

mod date;
mod dict;
mod encoding;
mod flow;
mod lists;
mod math;
mod reflect;
mod regexp;
mod string_slice;
mod strings;
mod version;

pub use dict::deep_merge;

pub fn install_all(builder: &mut FunctionRegistryBuilder) {
    flow::register(builder);
    strings::register(builder);
    string_slice::register(builder);
    lists::register(builder);
    dict::register(builder);
    math::register(builder);
    encoding::register(builder);
    regexp::register(builder);
    version::register(builder);
    date::register(builder);
    reflect::register(builder);
}

pub(crate) fn expect_min_args(name: &'static str, args: &[Value], min: usize) -> Result<(), Error> {
    if args.len() < min {
        return Err(Error::execute(
            format!(
                "{name} expected at least {min} arguments, got {}",
                args.len()
            ),
            None,
        ));
    }
    Ok(())
}

pub(crate) fn expect_exact_args(
    name: &'static str,
    args: &[Value],
    expected: usize,
) -> Result<(), Error> {
    if args.len() != expected {
        return Err(Error::execute(
            format!(
                "{name} expected {expected} argument{}, got {}",
                if expected == 1 { "" } else { "s" },
                args.len()
            ),
            None,
        ));
    }
    Ok(())
}

pub(crate) fn expect_string(
    name: &'static str,
    value: &Value,
    position: usize,
) -> Result<String, Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(format_value(value)),
        Value::Null => Ok(String::new()),
        _ => Err(Error::execute(
            format!(
                "{name} argument {position} must be coercible to string, got {}",
                type_name(value)
            ),
            None,
        )),
    }
}

pub(crate) fn expect_array(
    name: &'static str,
    value: &Value,
    position: usize,
) -> Result<Vec<Value>, Error> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Null => Ok(Vec::new()),
        _ => Err(Error::execute(
            format!(
                "{name} argument {position} must be an array, got {}",
                type_name(value)
            ),
            None,
        )),
    }
}

/// Integer argument; integral floats and numeric strings are accepted.
pub(crate) fn expect_int(name: &'static str, value: &Value, position: usize) -> Result<i64, Error> {
    to_int(value).ok_or_else(|| {
        Error::execute(
            format!(
                "{name} argument {position} must be an integer, got {}",
                type_name(value)
            ),
            None,
        )
    })
}

pub(crate) fn expect_usize(
    name: &'static str,
    value: &Value,
    position: usize,
) -> Result<usize, Error> {
    let int = expect_int(name, value, position)?;
    usize::try_from(int).map_err(|_| {
        Error::execute(
            format!("{name} argument {position} must be a non-negative integer, got {int}"),
            None,
        )
    })
}

pub(crate) fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < 9.0e15)
                .map(|f| format!("{:.0}", f.trunc()))
                .and_then(|text| text.parse().ok())
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Stringifies each element of a list, dropping nulls; a scalar becomes a
/// one-element list.
pub(crate) fn string_slice(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(value_to_string)
            .collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_string(other)],
    }
}

pub(crate) fn clamp_char_range(
    s: &str,
    start_chars: usize,
    len_chars: Option<usize>,
) -> (usize, usize) {
    let mut indices: Vec<usize> = s.char_indices().map(|(idx, _)| idx).collect();
    indices.push(s.len());
    let total = indices.len() - 1;
    let start = start_chars.min(total);
    let end = match len_chars {
        Some(len) => start.saturating_add(len).min(total),
        None => total,
    };
    (indices[start], indices[end])
}

#[cfg(test)]
pub(crate) fn empty_context() -> EvalContext {
    EvalContext::default()
}
