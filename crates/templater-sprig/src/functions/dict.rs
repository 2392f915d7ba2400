// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::{Map, Value};
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_min_args, expect_string, type_name, value_to_string};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register("dict", dict)
        .register_with_arity("get", Arity::Exactly(2), get)
        .register_with_arity("set", Arity::Exactly(3), set)
        .register_with_arity("unset", Arity::Exactly(2), unset)
        .register_with_arity("hasKey", Arity::Exactly(2), has_key)
        .register_with_arity("keys", Arity::AtLeast(1), keys)
        .register_with_arity("values", Arity::Exactly(1), values)
        .register_with_arity("pick", Arity::AtLeast(1), pick)
        .register_with_arity("omit", Arity::AtLeast(1), omit)
        .register_with_arity("pluck", Arity::AtLeast(1), pluck)
        .register_with_arity("dig", Arity::AtLeast(3), dig)
        .register_with_arity("merge", Arity::AtLeast(1), merge)
        .register_with_arity("mergeOverwrite", Arity::AtLeast(1), merge_overwrite)
        .register_with_arity("deepCopy", Arity::Exactly(1), deep_copy);
}

/// Merges `overlay` into `base`. Keys from the overlay win, except that two
/// mappings under the same key are merged recursively. Sequences, scalars and
/// `null` replace the earlier value wholesale.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// `dict K1 V1 K2 V2 ...`; a trailing key without a value maps to `""`.
pub fn dict(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let mut map = Map::new();
    for pair in args.chunks(2) {
        let key = value_to_string(&pair[0]);
        let value = pair
            .get(1)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

pub fn set(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("set", args, 3)?;
    let mut map = as_object("set", &args[0])?;
    let key = expect_string("set", &args[1], 2)?;
    map.insert(key, args[2].clone());
    Ok(Value::Object(map))
}

pub fn unset(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("unset", args, 2)?;
    let mut map = as_object("unset", &args[0])?;
    let key = expect_string("unset", &args[1], 2)?;
    map.remove(&key);
    Ok(Value::Object(map))
}

pub fn has_key(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("hasKey", args, 2)?;
    let map = as_object("hasKey", &args[0])?;
    let key = expect_string("hasKey", &args[1], 2)?;
    Ok(Value::Bool(map.contains_key(&key)))
}

pub fn get(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("get", args, 2)?;
    let map = as_object("get", &args[0])?;
    let key = expect_string("get", &args[1], 2)?;
    Ok(map
        .get(&key)
        .cloned()
        .unwrap_or_else(|| Value::String(String::new())))
}

/// Keys of every given mapping, each mapping's keys in sorted order.
pub fn keys(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("keys", args, 1)?;
    let mut out = Vec::new();
    for value in args {
        let map = as_object("keys", value)?;
        out.extend(map.keys().cloned().map(Value::String));
    }
    Ok(Value::Array(out))
}

pub fn values(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("values", args, 1)?;
    let map = as_object("values", &args[0])?;
    Ok(Value::Array(map.into_iter().map(|(_, value)| value).collect()))
}

pub fn pick(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("pick", args, 1)?;
    let map = as_object("pick", &args[0])?;
    let mut result = Map::new();
    for (idx, key_val) in args[1..].iter().enumerate() {
        let key = expect_string("pick", key_val, idx + 2)?;
        if let Some(value) = map.get(&key) {
            result.insert(key, value.clone());
        }
    }
    Ok(Value::Object(result))
}

pub fn omit(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("omit", args, 1)?;
    let mut map = as_object("omit", &args[0])?;
    for (idx, key_val) in args[1..].iter().enumerate() {
        let key = expect_string("omit", key_val, idx + 2)?;
        map.remove(&key);
    }
    Ok(Value::Object(map))
}

pub fn pluck(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("pluck", args, 1)?;
    let key = expect_string("pluck", &args[0], 1)?;
    let mut result = Vec::new();
    let mut collect = |candidate: &Value| {
        if let Value::Object(map) = candidate {
            if let Some(value) = map.get(&key) {
                result.push(value.clone());
            }
        }
    };
    for source in &args[1..] {
        match source {
            Value::Array(items) => items.iter().for_each(&mut collect),
            other => collect(other),
        }
    }
    Ok(Value::Array(result))
}

/// `dig K1 K2 ... DEFAULT MAP` walks nested mappings, falling back to
/// `DEFAULT` as soon as a key is missing.
pub fn dig(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    if args.len() < 3 {
        return Err(Error::execute(
            format!("dig requires at least three arguments, got {}", args.len()),
            None,
        ));
    }
    let key_count = args.len() - 2;
    let default_value = &args[key_count];
    let mut current = &args[key_count + 1];
    for (idx, key_val) in args[..key_count].iter().enumerate() {
        let key = expect_string("dig", key_val, idx + 1)?;
        match current {
            Value::Object(map) => match map.get(&key) {
                Some(next) => current = next,
                None => return Ok(default_value.clone()),
            },
            _ => return Ok(default_value.clone()),
        }
    }
    Ok(current.clone())
}

/// `merge DST SRC...`: deep merge where the destination's keys win.
pub fn merge(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("merge", args, 1)?;
    let mut result = Map::new();
    for value in args.iter().rev() {
        deep_merge(&mut result, as_object("merge", value)?);
    }
    Ok(Value::Object(result))
}

/// `mergeOverwrite DST SRC...`: deep merge where later sources win.
pub fn merge_overwrite(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("mergeOverwrite", args, 1)?;
    let mut result = Map::new();
    for value in args {
        deep_merge(&mut result, as_object("mergeOverwrite", value)?);
    }
    Ok(Value::Object(result))
}

pub fn deep_copy(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("deepCopy", args, 1)?;
    Ok(args[0].clone())
}

fn as_object(name: &'static str, value: &Value) -> Result<Map<String, Value>, Error> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::execute(
            format!(
                "{name} expects a map as the first argument, got {}",
                type_name(value)
            ),
            None,
        )),
    }
}
