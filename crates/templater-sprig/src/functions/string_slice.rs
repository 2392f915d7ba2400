// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::{Map, Value};
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_int, expect_string, string_slice};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("splitList", Arity::Exactly(2), split_list)
        .register_with_arity("split", Arity::Exactly(2), split_map)
        .register_with_arity("splitn", Arity::Exactly(3), splitn)
        .register_with_arity("join", Arity::Exactly(2), join)
        .register_with_arity("sortAlpha", Arity::Exactly(1), sort_alpha);
}

fn indexed_parts<'a>(parts: impl Iterator<Item = &'a str>) -> Value {
    let mut map = Map::new();
    for (idx, part) in parts.enumerate() {
        map.insert(format!("_{idx}"), Value::String(part.to_string()));
    }
    Value::Object(map)
}

pub fn split_list(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("splitList", args, 2)?;
    let sep = expect_string("splitList", &args[0], 1)?;
    let text = expect_string("splitList", &args[1], 2)?;
    Ok(Value::Array(
        text.split(sep.as_str())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    ))
}

/// `split SEP S` returns a map keyed `_0`, `_1`, ...
pub fn split_map(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("split", args, 2)?;
    let sep = expect_string("split", &args[0], 1)?;
    let text = expect_string("split", &args[1], 2)?;
    Ok(indexed_parts(text.split(sep.as_str())))
}

/// `splitn SEP N S`; a negative `N` splits without limit and zero yields an
/// empty map.
pub fn splitn(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("splitn", args, 3)?;
    let sep = expect_string("splitn", &args[0], 1)?;
    let count = expect_int("splitn", &args[1], 2)?;
    let text = expect_string("splitn", &args[2], 3)?;
    match usize::try_from(count) {
        Ok(0) => Ok(Value::Object(Map::new())),
        Ok(n) => Ok(indexed_parts(text.splitn(n, sep.as_str()))),
        Err(_) => Ok(indexed_parts(text.split(sep.as_str()))),
    }
}

pub fn join(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("join", args, 2)?;
    let sep = expect_string("join", &args[0], 1)?;
    Ok(Value::String(string_slice(&args[1]).join(&sep)))
}

pub fn sort_alpha(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("sortAlpha", args, 1)?;
    let mut list = string_slice(&args[0]);
    list.sort();
    Ok(Value::Array(list.into_iter().map(Value::String).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    #[test]
    fn split_list_requires_string_separator() {
        let mut ctx = ctx();
        let err = split_list(&mut ctx, &[json!({"oops": true}), json!("a,b")]).unwrap_err();
        assert_eq!(
            err.message(),
            "splitList argument 1 must be coercible to string, got map[string]interface {}"
        );
    }

    #[test]
    fn split_map_uses_incrementing_keys() {
        let mut ctx = ctx();
        let out = split_map(&mut ctx, &[json!(":"), json!("a:b")]).unwrap();
        assert_eq!(out, json!({"_0": "a", "_1": "b"}));
    }

    #[test]
    fn splitn_truncates_to_requested_segments() {
        let mut ctx = ctx();
        let out = splitn(&mut ctx, &[json!(","), json!(2), json!("a,b,c")]).unwrap();
        assert_eq!(out, json!({"_0": "a", "_1": "b,c"}));
        let out = splitn(&mut ctx, &[json!(","), json!(-1), json!("a,b,c")]).unwrap();
        assert_eq!(out, json!({"_0": "a", "_1": "b", "_2": "c"}));
    }

    #[test]
    fn join_skips_nulls_and_accepts_scalars() {
        let mut ctx = ctx();
        let out = join(&mut ctx, &[json!("-"), json!(["a", null, 1, true])]).unwrap();
        assert_eq!(out, json!("a-1-true"));
        let out = join(&mut ctx, &[json!("-"), json!("solo")]).unwrap();
        assert_eq!(out, json!("solo"));
    }

    #[test]
    fn sort_alpha_orders_stringified_items() {
        let mut ctx = ctx();
        let out = sort_alpha(&mut ctx, &[json!(["b", 10, "a", 2])]).unwrap();
        assert_eq!(out, json!(["10", "2", "a", "b"]));
    }
}
