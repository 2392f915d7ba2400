// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::Value;
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_min_args, expect_string};
use super::{is_empty, is_truthy, value_to_string};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("default", Arity::Between(1, 2), default)
        .register("coalesce", coalesce)
        .register_with_arity("ternary", Arity::Exactly(3), ternary)
        .register_with_arity("empty", Arity::Exactly(1), empty)
        .register_with_arity("fail", Arity::AtLeast(1), fail)
        .register_with_arity("required", Arity::Exactly(2), required)
        .register_with_arity("fromJson", Arity::Exactly(1), from_json)
        .register_with_arity("mustFromJson", Arity::Exactly(1), must_from_json)
        .register_with_arity("toJson", Arity::Exactly(1), to_json)
        .register_with_arity("mustToJson", Arity::Exactly(1), must_to_json)
        .register_with_arity("toPrettyJson", Arity::Exactly(1), to_pretty_json)
        .register_with_arity("mustToPrettyJson", Arity::Exactly(1), must_to_pretty_json)
        .register_with_arity("toRawJson", Arity::Exactly(1), to_raw_json)
        .register_with_arity("mustToRawJson", Arity::Exactly(1), must_to_raw_json);
}

// NOTE: Every helper takes `&mut EvalContext` even when the body does not need
// to touch the context, so all of them share the engine's `Function` shape.

/// `default FALLBACK GIVEN`: `GIVEN` unless it is empty or absent.
pub fn default(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("default", args, 1)?;
    let fallback = &args[0];
    match args.get(1) {
        Some(candidate) if !is_empty(candidate) => Ok(candidate.clone()),
        _ => Ok(fallback.clone()),
    }
}

pub fn coalesce(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    for value in args {
        if !is_empty(value) {
            return Ok(value.clone());
        }
    }
    Ok(Value::Null)
}

pub fn ternary(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("ternary", args, 3)?;
    if is_truthy(&args[2]) {
        Ok(args[0].clone())
    } else {
        Ok(args[1].clone())
    }
}

pub fn empty(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("empty", args, 1)?;
    Ok(Value::Bool(is_empty(&args[0])))
}

pub fn fail(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("fail", args, 1)?;
    let message = args
        .iter()
        .map(value_to_string)
        .collect::<Vec<_>>()
        .join(" ");
    Err(Error::execute(message, None))
}

/// `required MESSAGE VALUE` fails with `MESSAGE` when the value is null or
/// an empty string.
pub fn required(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("required", args, 2)?;
    let message = expect_string("required", &args[0], 1)?;
    match &args[1] {
        Value::Null => Err(Error::execute(message, None)),
        Value::String(s) if s.is_empty() => Err(Error::execute(message, None)),
        other => Ok(other.clone()),
    }
}

pub fn from_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("fromJson", args, 1)?;
    let text = expect_string("fromJson", &args[0], 1)?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
}

pub fn must_from_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("mustFromJson", args, 1)?;
    let text = expect_string("mustFromJson", &args[0], 1)?;
    serde_json::from_str(&text)
        .map_err(|err| Error::execute_with_source(format!("mustFromJson failed: {err}"), err))
}

/// JSON text; `escape_html` replaces `<`, `>` and `&` with unicode escapes.
fn serialize_json(value: &Value, pretty: bool, escape_html: bool) -> Result<String, serde_json::Error> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    if !escape_html {
        return Ok(text);
    }
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    Ok(escaped)
}

fn json_or_empty(value: &Value, pretty: bool, escape_html: bool) -> Value {
    Value::String(serialize_json(value, pretty, escape_html).unwrap_or_default())
}

fn json_or_error(
    name: &'static str,
    value: &Value,
    pretty: bool,
    escape_html: bool,
) -> Result<Value, Error> {
    serialize_json(value, pretty, escape_html)
        .map(Value::String)
        .map_err(|err| Error::execute_with_source(format!("{name} failed: {err}"), err))
}

pub fn to_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("toJson", args, 1)?;
    Ok(json_or_empty(&args[0], false, true))
}

pub fn must_to_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("mustToJson", args, 1)?;
    json_or_error("mustToJson", &args[0], false, true)
}

pub fn to_pretty_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("toPrettyJson", args, 1)?;
    Ok(json_or_empty(&args[0], true, true))
}

pub fn must_to_pretty_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("mustToPrettyJson", args, 1)?;
    json_or_error("mustToPrettyJson", &args[0], true, true)
}

pub fn to_raw_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("toRawJson", args, 1)?;
    Ok(json_or_empty(&args[0], false, false))
}

pub fn must_to_raw_json(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("mustToRawJson", args, 1)?;
    json_or_error("mustToRawJson", &args[0], false, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    #[test]
    fn default_uses_fallback_for_empty_or_missing_value() {
        let mut ctx = ctx();
        assert_eq!(default(&mut ctx, &[json!("x")]).unwrap(), json!("x"));
        assert_eq!(default(&mut ctx, &[json!("x"), json!("")]).unwrap(), json!("x"));
        assert_eq!(default(&mut ctx, &[json!("x"), json!(0)]).unwrap(), json!("x"));
        assert_eq!(default(&mut ctx, &[json!("x"), json!("y")]).unwrap(), json!("y"));
    }

    #[test]
    fn ternary_rejects_wrong_argument_count() {
        let mut ctx = ctx();
        let err = ternary(&mut ctx, &[json!("true"), json!("false")]).unwrap_err();
        assert_eq!(err.message(), "ternary expected 3 arguments, got 2");
    }

    #[test]
    fn must_from_json_surfaces_parse_errors() {
        let mut ctx = ctx();
        let err = must_from_json(&mut ctx, &[json!("{invalid}")]).unwrap_err();
        assert!(
            err.message().starts_with("mustFromJson failed:"),
            "unexpected error: {err}"
        );
        assert_eq!(from_json(&mut ctx, &[json!("{invalid}")]).unwrap(), Value::Null);
    }

    #[test]
    fn fail_joins_arguments_with_spaces() {
        let mut ctx = ctx();
        let err = fail(&mut ctx, &[json!("boom"), json!(123)]).unwrap_err();
        assert_eq!(err.message(), "boom 123");
    }

    #[test]
    fn required_rejects_null_and_empty_strings_only() {
        let mut ctx = ctx();
        let err = required(&mut ctx, &[json!("name is required"), Value::Null]).unwrap_err();
        assert_eq!(err.message(), "name is required");
        assert!(required(&mut ctx, &[json!("msg"), json!("")]).is_err());
        assert_eq!(
            required(&mut ctx, &[json!("msg"), json!(0)]).unwrap(),
            json!(0)
        );
    }

    #[test]
    fn to_json_escapes_html_but_raw_json_does_not() {
        let mut ctx = ctx();
        let value = json!({"a": "<b>&"});
        assert_eq!(
            to_json(&mut ctx, &[value.clone()]).unwrap(),
            json!(r#"{"a":"\u003cb\u003e\u0026"}"#)
        );
        assert_eq!(
            to_raw_json(&mut ctx, &[value]).unwrap(),
            json!(r#"{"a":"<b>&"}"#)
        );
    }

    #[test]
    fn pretty_json_uses_two_space_indent() {
        let mut ctx = ctx();
        let out = to_pretty_json(&mut ctx, &[json!({"a": [1]})]).unwrap();
        assert_eq!(out, json!("{\n  \"a\": [\n    1\n  ]\n}"));
    }
}
