// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::Value;
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_array, expect_exact_args, expect_int, expect_min_args, is_empty};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register("list", list)
        .register_with_arity("first", Arity::Exactly(1), first)
        .register_with_arity("last", Arity::Exactly(1), last)
        .register_with_arity("rest", Arity::Exactly(1), rest)
        .register_with_arity("initial", Arity::Exactly(1), initial)
        .register_with_arity("append", Arity::AtLeast(2), append)
        .register_with_arity("prepend", Arity::AtLeast(2), prepend)
        .register_with_arity("concat", Arity::AtLeast(1), concat)
        .register_with_arity("reverse", Arity::Exactly(1), reverse)
        .register_with_arity("compact", Arity::Exactly(1), compact)
        .register_with_arity("uniq", Arity::Exactly(1), uniq)
        .register_with_arity("without", Arity::AtLeast(1), without)
        .register_with_arity("has", Arity::Exactly(2), has)
        .register_with_arity("chunk", Arity::Exactly(2), chunk)
        .register_with_arity("until", Arity::Exactly(1), until)
        .register_with_arity("untilStep", Arity::Exactly(3), until_step)
        .register_with_arity("seq", Arity::Between(0, 3), seq);
}

pub fn list(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Array(args.to_vec()))
}

pub fn first(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("first", args, 1)?;
    let list = expect_array("first", &args[0], 1)?;
    Ok(list.into_iter().next().unwrap_or(Value::Null))
}

pub fn last(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("last", args, 1)?;
    let list = expect_array("last", &args[0], 1)?;
    Ok(list.into_iter().last().unwrap_or(Value::Null))
}

pub fn rest(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("rest", args, 1)?;
    let list = expect_array("rest", &args[0], 1)?;
    Ok(Value::Array(list.into_iter().skip(1).collect()))
}

pub fn initial(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("initial", args, 1)?;
    let mut list = expect_array("initial", &args[0], 1)?;
    list.pop();
    Ok(Value::Array(list))
}

pub fn append(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("append", args, 2)?;
    let mut list = expect_array("append", &args[0], 1)?;
    list.extend_from_slice(&args[1..]);
    Ok(Value::Array(list))
}

pub fn prepend(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("prepend", args, 2)?;
    let list = expect_array("prepend", &args[0], 1)?;
    let mut prefix: Vec<Value> = args[1..].to_vec();
    prefix.extend(list);
    Ok(Value::Array(prefix))
}

pub fn concat(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("concat", args, 1)?;
    let mut combined = Vec::new();
    for (idx, value) in args.iter().enumerate() {
        let mut list = expect_array("concat", value, idx + 1)?;
        combined.append(&mut list);
    }
    Ok(Value::Array(combined))
}

pub fn reverse(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("reverse", args, 1)?;
    let mut list = expect_array("reverse", &args[0], 1)?;
    list.reverse();
    Ok(Value::Array(list))
}

pub fn compact(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("compact", args, 1)?;
    let list = expect_array("compact", &args[0], 1)?;
    Ok(Value::Array(
        list.into_iter().filter(|value| !is_empty(value)).collect(),
    ))
}

pub fn uniq(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("uniq", args, 1)?;
    let list = expect_array("uniq", &args[0], 1)?;
    let mut out = Vec::new();
    for value in list {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    Ok(Value::Array(out))
}

pub fn without(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("without", args, 1)?;
    let list = expect_array("without", &args[0], 1)?;
    Ok(Value::Array(
        list.into_iter()
            .filter(|item| !args[1..].contains(item))
            .collect(),
    ))
}

/// `has NEEDLE HAYSTACK`; a string haystack is searched for the needle's text.
pub fn has(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("has", args, 2)?;
    let target = &args[0];
    let result = match &args[1] {
        Value::Array(items) => items.contains(target),
        Value::String(text) => text.contains(&super::value_to_string(target)),
        Value::Null => false,
        _ => {
            return Err(Error::execute(
                "has expects a string or array as the second argument",
                None,
            ));
        }
    };
    Ok(Value::Bool(result))
}

/// `chunk SIZE LIST` splits a list into runs of `SIZE`; the last run may be
/// shorter.
pub fn chunk(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("chunk", args, 2)?;
    let size = expect_int("chunk", &args[0], 1)?;
    let list = expect_array("chunk", &args[1], 2)?;
    let size = usize::try_from(size)
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(|| Error::execute(format!("chunk size must be positive, got {size}"), None))?;
    Ok(Value::Array(
        list.chunks(size)
            .map(|run| Value::Array(run.to_vec()))
            .collect(),
    ))
}

/// Integers from `start` towards `stop` (exclusive). A step pointing away
/// from `stop` produces nothing.
fn step_range(start: i64, stop: i64, step: i64) -> Vec<i64> {
    let mut out = Vec::new();
    if stop < start {
        if step >= 0 {
            return out;
        }
        let mut current = start;
        while current > stop {
            out.push(current);
            current += step;
        }
    } else {
        if step <= 0 {
            return out;
        }
        let mut current = start;
        while current < stop {
            out.push(current);
            current += step;
        }
    }
    out
}

fn int_list(values: Vec<i64>) -> Value {
    Value::Array(values.into_iter().map(Value::from).collect())
}

pub fn until(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("until", args, 1)?;
    let count = expect_int("until", &args[0], 1)?;
    let step = if count < 0 { -1 } else { 1 };
    Ok(int_list(step_range(0, count, step)))
}

pub fn until_step(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("untilStep", args, 3)?;
    let start = expect_int("untilStep", &args[0], 1)?;
    let stop = expect_int("untilStep", &args[1], 2)?;
    let step = expect_int("untilStep", &args[2], 3)?;
    Ok(int_list(step_range(start, stop, step)))
}

/// Bash-style `seq`: `seq END`, `seq START END` or `seq START STEP END`,
/// rendered as space-separated integers with an inclusive end.
pub fn seq(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let mut params = Vec::with_capacity(args.len());
    for (idx, value) in args.iter().enumerate() {
        params.push(expect_int("seq", value, idx + 1)?);
    }
    let numbers = match params.as_slice() {
        [end] => {
            let increment = if *end < 1 { -1 } else { 1 };
            step_range(1, end + increment, increment)
        }
        [start, end] => {
            let step = if end < start { -1 } else { 1 };
            step_range(*start, end + step, step)
        }
        [start, step, end] => {
            let increment = if end < start { -1 } else { 1 };
            if end < start && *step > 0 {
                Vec::new()
            } else {
                step_range(*start, end + increment, *step)
            }
        }
        _ => Vec::new(),
    };
    let text: Vec<String> = numbers.iter().map(i64::to_string).collect();
    Ok(Value::String(text.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    #[test]
    fn first_requires_array_input() {
        let mut ctx = ctx();
        let err = first(&mut ctx, &[json!("oops")]).unwrap_err();
        assert_eq!(err.message(), "first argument 1 must be an array, got string");
        assert_eq!(first(&mut ctx, &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn concat_propagates_first_non_array_error() {
        let mut ctx = ctx();
        let err = concat(&mut ctx, &[json!([1, 2]), json!({"bad": true})]).unwrap_err();
        assert_eq!(
            err.message(),
            "concat argument 2 must be an array, got map[string]interface {}"
        );
    }

    #[test]
    fn without_handles_duplicates_and_nulls() {
        let mut ctx = ctx();
        let out = without(&mut ctx, &[json!([1, 2, 2, null, 3]), json!(2), Value::Null]).unwrap();
        assert_eq!(out, json!([1, 3]));
    }

    #[test]
    fn has_rejects_invalid_haystack_type() {
        let mut ctx = ctx();
        let err = has(&mut ctx, &[json!("a"), json!({"not": "supported"})]).unwrap_err();
        assert_eq!(
            err.message(),
            "has expects a string or array as the second argument"
        );
        assert_eq!(has(&mut ctx, &[json!(2), json!([1, 2])]).unwrap(), json!(true));
    }

    #[test]
    fn chunk_splits_into_runs() {
        let mut ctx = ctx();
        let out = chunk(&mut ctx, &[json!(2), json!([1, 2, 3, 4, 5])]).unwrap();
        assert_eq!(out, json!([[1, 2], [3, 4], [5]]));
        assert!(chunk(&mut ctx, &[json!(0), json!([1])]).is_err());
    }

    #[test]
    fn until_counts_in_either_direction() {
        let mut ctx = ctx();
        assert_eq!(until(&mut ctx, &[json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(until(&mut ctx, &[json!(-3)]).unwrap(), json!([0, -1, -2]));
        assert_eq!(
            until_step(&mut ctx, &[json!(3), json!(10), json!(3)]).unwrap(),
            json!([3, 6, 9])
        );
        assert_eq!(
            until_step(&mut ctx, &[json!(0), json!(10), json!(-1)]).unwrap(),
            json!([])
        );
    }

    #[test]
    fn seq_mirrors_shell_seq() {
        let mut ctx = ctx();
        assert_eq!(seq(&mut ctx, &[json!(3)]).unwrap(), json!("1 2 3"));
        assert_eq!(seq(&mut ctx, &[json!(0)]).unwrap(), json!("1 0"));
        assert_eq!(seq(&mut ctx, &[json!(2), json!(5)]).unwrap(), json!("2 3 4 5"));
        assert_eq!(seq(&mut ctx, &[json!(5), json!(2)]).unwrap(), json!("5 4 3 2"));
        assert_eq!(
            seq(&mut ctx, &[json!(0), json!(2), json!(6)]).unwrap(),
            json!("0 2 4 6")
        );
        assert_eq!(
            seq(&mut ctx, &[json!(6), json!(-2), json!(0)]).unwrap(),
            json!("6 4 2 0")
        );
        assert_eq!(seq(&mut ctx, &[]).unwrap(), json!(""));
    }
}
