// SPDX-License-Identifier: Apache-2.0 OR MIT
#![forbid(unsafe_code)]
//! The functions Go's `text/template` predefines: logic (`and`, `or`, `not`),
//! comparison (`eq`, `ne`, `lt`, `le`, `gt`, `ge`), containers (`len`,
//! `index`, `slice`), formatting (`print`, `println`, `printf`), escaping
//! (`html`, `js`, `urlquery`) and `call`.

mod format;

use std::cmp::Ordering;

use serde_json::{Number, Value};
pub use templater_engine::{
    format_value, is_truthy, type_name, value_to_string, Arity, Error, EvalContext,
    FunctionRegistry, FunctionRegistryBuilder, Template,
};

/// Builds a registry holding only Go's predefined template functions.
pub fn text_template_functions() -> FunctionRegistry {
    let mut builder = FunctionRegistryBuilder::new();
    install_text_template_functions(&mut builder);
    builder.build()
}

/// Installs the standard Go text/template functions into an existing registry builder.
pub fn install_text_template_functions(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("and", Arity::AtLeast(1), builtin_and)
        .register_with_arity("call", Arity::AtLeast(1), builtin_call)
        .register("html", builtin_html)
        .register_with_arity("eq", Arity::AtLeast(2), builtin_eq)
        .register_with_arity("ge", Arity::Exactly(2), builtin_ge)
        .register_with_arity("gt", Arity::Exactly(2), builtin_gt)
        .register_with_arity("index", Arity::AtLeast(1), builtin_index)
        .register("js", builtin_js)
        .register_with_arity("len", Arity::Exactly(1), builtin_len)
        .register_with_arity("le", Arity::Exactly(2), builtin_le)
        .register_with_arity("lt", Arity::Exactly(2), builtin_lt)
        .register_with_arity("ne", Arity::Exactly(2), builtin_ne)
        .register_with_arity("not", Arity::Exactly(1), builtin_not)
        .register("print", builtin_print)
        .register("println", builtin_println)
        .register_with_arity("or", Arity::AtLeast(1), builtin_or)
        .register_with_arity("printf", Arity::AtLeast(1), builtin_printf)
        .register_with_arity("slice", Arity::AtLeast(1), builtin_slice)
        .register("urlquery", builtin_urlquery);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasicKind {
    Nil,
    Bool,
    Number,
    String,
}

fn basic_kind(value: &Value) -> Result<BasicKind, Error> {
    match value {
        Value::Null => Ok(BasicKind::Nil),
        Value::Bool(_) => Ok(BasicKind::Bool),
        Value::Number(_) => Ok(BasicKind::Number),
        Value::String(_) => Ok(BasicKind::String),
        other => Err(Error::execute(
            format!("non-comparable type {}", type_name(other)),
            None,
        )),
    }
}

/// Orders two numbers exactly when both are integers, by `f64` otherwise.
fn compare_numbers(lhs: &Number, rhs: &Number) -> Option<Ordering> {
    let exact = |n: &Number| {
        n.as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
    };
    match (exact(lhs), exact(rhs)) {
        (Some(l), Some(r)) => Some(l.cmp(&r)),
        _ => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> Result<bool, Error> {
    let (left, right) = (basic_kind(lhs)?, basic_kind(rhs)?);
    match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => Ok(compare_numbers(l, r) == Some(Ordering::Equal)),
        _ if left == BasicKind::Nil || right == BasicKind::Nil => Ok(left == right),
        _ if left == right => Ok(lhs == rhs),
        _ => Err(Error::execute("incompatible types for comparison", None)),
    }
}

fn order(lhs: &Value, rhs: &Value) -> Result<Ordering, Error> {
    match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => compare_numbers(l, r)
            .ok_or_else(|| Error::execute("invalid type for comparison", None)),
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => {
            let (left, right) = (basic_kind(lhs)?, basic_kind(rhs)?);
            if left == right {
                Err(Error::execute("invalid type for comparison", None))
            } else {
                Err(Error::execute("incompatible types for comparison", None))
            }
        }
    }
}

/// `eq arg1 arg2 ...` is true when `arg1` equals any of the others.
fn builtin_eq(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let Some((first, rest)) = args.split_first() else {
        return Err(Error::execute("missing argument for comparison", None));
    };
    for other in rest {
        if values_equal(first, other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn builtin_ne(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let [lhs, rhs] = args else {
        return Err(Error::execute("ne expects two arguments", None));
    };
    Ok(Value::Bool(!values_equal(lhs, rhs)?))
}

fn comparison(args: &[Value], accept: fn(Ordering) -> bool) -> Result<Value, Error> {
    let [lhs, rhs] = args else {
        return Err(Error::execute("comparison expects two arguments", None));
    };
    Ok(Value::Bool(accept(order(lhs, rhs)?)))
}

fn builtin_lt(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    comparison(args, Ordering::is_lt)
}

fn builtin_le(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    comparison(args, Ordering::is_le)
}

fn builtin_gt(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    comparison(args, Ordering::is_gt)
}

fn builtin_ge(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    comparison(args, Ordering::is_ge)
}

fn builtin_printf(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let Some((format, rest)) = args.split_first() else {
        return Err(Error::execute("printf expects format string", None));
    };
    let format = format.as_str().ok_or_else(|| {
        Error::execute(
            format!(
                "wrong type for value; expected string; got {}",
                type_name(format)
            ),
            None,
        )
    })?;
    Ok(Value::String(format::sprintf(format, rest)))
}

fn builtin_print(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(format::sprint(args)))
}

fn builtin_println(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(format::sprintln(args)))
}

fn builtin_html(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(escape_html(&format::sprint(args))))
}

fn builtin_js(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(escape_js(&format::sprint(args))))
}

fn builtin_urlquery(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(escape_urlquery(&format::sprint(args))))
}

fn escape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&#34;"),
            '\'' => output.push_str("&#39;"),
            '\0' => output.push('\u{FFFD}'),
            _ => output.push(ch),
        }
    }
    output
}

fn escape_js(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => output.push_str("\\\\"),
            '\'' => output.push_str("\\'"),
            '"' => output.push_str("\\\""),
            '<' => output.push_str("\\u003C"),
            '>' => output.push_str("\\u003E"),
            '&' => output.push_str("\\u0026"),
            '=' => output.push_str("\\u003D"),
            ch if ch.is_control() || ch == '\u{2028}' || ch == '\u{2029}' => {
                output.push_str(&format!("\\u{:04X}", u32::from(ch)));
            }
            _ => output.push(ch),
        }
    }
    output
}

fn escape_urlquery(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                output.push(char::from(b));
            }
            b' ' => output.push('+'),
            _ => output.push_str(&format!("%{b:02X}")),
        }
    }
    output
}

/// Integer argument used by `index` and `slice`; numeric strings are accepted.
fn integer_arg(value: &Value, what: &str) -> Result<i64, Error> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .and_then(|f| format!("{f:.0}").parse().ok())
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        Error::execute(
            format!("cannot index {what} with type {}", type_name(value)),
            None,
        )
    })
}

fn map_key(key: &Value) -> Result<String, Error> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::execute(
            format!("value has type {}; should be string", type_name(other)),
            None,
        )),
    }
}

fn builtin_index(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let Some((target, keys)) = args.split_first() else {
        return Err(Error::execute("index expects at least one argument", None));
    };

    let mut current = target.clone();
    for key in keys {
        current = match &current {
            Value::Object(map) => map.get(&map_key(key)?).cloned().unwrap_or(Value::Null),
            Value::Array(items) => {
                let idx = integer_arg(key, "slice/array")?;
                usize::try_from(idx)
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .cloned()
                    .ok_or_else(|| Error::execute(format!("index out of range: {idx}"), None))?
            }
            Value::String(text) => {
                let idx = integer_arg(key, "string")?;
                usize::try_from(idx)
                    .ok()
                    .and_then(|idx| text.as_bytes().get(idx))
                    .map(|byte| Value::from(*byte))
                    .ok_or_else(|| Error::execute(format!("index out of range: {idx}"), None))?
            }
            Value::Null => return Err(Error::execute("index of untyped nil", None)),
            other => {
                return Err(Error::execute(
                    format!("can't index item of type {}", type_name(other)),
                    None,
                ))
            }
        };
    }

    Ok(current)
}

fn builtin_and(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    for value in args {
        if !is_truthy(value) {
            return Ok(value.clone());
        }
    }
    Ok(args.last().cloned().unwrap_or(Value::Bool(true)))
}

fn builtin_or(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    for value in args {
        if is_truthy(value) {
            return Ok(value.clone());
        }
    }
    Ok(args.last().cloned().unwrap_or(Value::Bool(false)))
}

fn builtin_len(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let [value] = args else {
        return Err(Error::execute("len expects exactly one argument", None));
    };
    let len = match value {
        Value::Null => 0,
        Value::String(s) => s.len(),
        Value::Array(list) => list.len(),
        Value::Object(map) => map.len(),
        other @ (Value::Bool(_) | Value::Number(_)) => {
            return Err(Error::execute(
                format!("len of type {}", type_name(other)),
                None,
            ));
        }
    };
    Ok(Value::from(len))
}

struct SliceIndices {
    start: usize,
    end: usize,
}

fn builtin_slice(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let Some((target, indices)) = args.split_first() else {
        return Err(Error::execute("slice expects at least one argument", None));
    };

    match target {
        Value::String(s) => {
            if indices.len() > 2 {
                return Err(Error::execute("cannot 3-index slice a string", None));
            }
            let SliceIndices { start, end } = parse_slice_indices(indices, s.len())?;
            let slice = s
                .get(start..end)
                .ok_or_else(|| Error::execute("slice indices not on char boundaries", None))?;
            Ok(Value::String(slice.to_string()))
        }
        Value::Array(list) => {
            let SliceIndices { start, end } = parse_slice_indices(indices, list.len())?;
            Ok(Value::Array(list[start..end].to_vec()))
        }
        Value::Null => Ok(Value::Array(Vec::new())),
        other => Err(Error::execute(
            format!("can't slice item of type {}", type_name(other)),
            None,
        )),
    }
}

fn parse_slice_indices(indices: &[Value], len: usize) -> Result<SliceIndices, Error> {
    if indices.len() > 3 {
        return Err(Error::execute(
            format!("too many slice indexes: {}", indices.len()),
            None,
        ));
    }
    let parsed = indices
        .iter()
        .map(|arg| {
            let idx = integer_arg(arg, "slice")?;
            usize::try_from(idx)
                .map_err(|_| Error::execute(format!("index out of range: {idx}"), None))
        })
        .collect::<Result<Vec<usize>, Error>>()?;

    let start = parsed.first().copied().unwrap_or(0);
    let end = parsed.get(1).copied().unwrap_or(len);
    let cap = parsed.get(2).copied().unwrap_or(len);
    if cap > len {
        return Err(Error::execute(format!("index out of range: {cap}"), None));
    }
    if end > cap {
        return Err(Error::execute(format!("index out of range: {end}"), None));
    }
    if start > end {
        return Err(Error::execute(
            format!("invalid slice index: {start} > {end}"),
            None,
        ));
    }
    Ok(SliceIndices { start, end })
}

/// `call NAME args...` invokes the registered function `NAME`.
fn builtin_call(ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let Some((name, rest)) = args.split_first() else {
        return Err(Error::execute("call expects at least one argument", None));
    };
    let func_name = name
        .as_str()
        .ok_or_else(|| Error::execute("call expects function name as string", None))?;
    let func = ctx
        .function(func_name)
        .ok_or_else(|| Error::execute(format!("function {func_name:?} not defined"), None))?;
    if let Some(arity) = ctx.functions().arity(func_name) {
        if !arity.accepts(rest.len()) {
            return Err(Error::execute(
                format!(
                    "wrong number of args for {func_name}: want {arity} got {}",
                    rest.len()
                ),
                None,
            ));
        }
    }
    func(ctx, rest)
}

fn builtin_not(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let [value] = args else {
        return Err(Error::execute("not expects exactly one argument", None));
    };
    Ok(Value::Bool(!is_truthy(value)))
}
