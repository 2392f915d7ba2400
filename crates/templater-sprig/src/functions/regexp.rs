// SPDX-License-Identifier: Apache-2.0 OR MIT
use regex::{NoExpand, Regex};
use serde_json::Value;
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_int, expect_string};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("regexMatch", Arity::Exactly(2), regex_match)
        .register_with_arity("regexFind", Arity::Exactly(2), regex_find)
        .register_with_arity("regexFindAll", Arity::Exactly(3), regex_find_all)
        .register_with_arity("regexReplaceAll", Arity::Exactly(3), regex_replace_all)
        .register_with_arity(
            "regexReplaceAllLiteral",
            Arity::Exactly(3),
            regex_replace_all_literal,
        )
        .register_with_arity("regexSplit", Arity::Exactly(3), regex_split);
}

fn compile(name: &'static str, value: &Value) -> Result<Regex, Error> {
    let pattern = expect_string(name, value, 1)?;
    Regex::new(&pattern)
        .map_err(|err| Error::execute_with_source(format!("{name}: invalid regex {pattern:?}"), err))
}

/// Result cap for the `N` argument: negative means unlimited.
fn limit(n: i64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn strings(items: impl Iterator<Item = String>) -> Value {
    Value::Array(items.map(Value::String).collect())
}

pub fn regex_match(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("regexMatch", args, 2)?;
    let re = compile("regexMatch", &args[0])?;
    let text = expect_string("regexMatch", &args[1], 2)?;
    Ok(Value::Bool(re.is_match(&text)))
}

pub fn regex_find(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("regexFind", args, 2)?;
    let re = compile("regexFind", &args[0])?;
    let text = expect_string("regexFind", &args[1], 2)?;
    let found = re.find(&text).map(|m| m.as_str()).unwrap_or_default();
    Ok(Value::String(found.to_string()))
}

pub fn regex_find_all(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("regexFindAll", args, 3)?;
    let re = compile("regexFindAll", &args[0])?;
    let text = expect_string("regexFindAll", &args[1], 2)?;
    let n = expect_int("regexFindAll", &args[2], 3)?;
    Ok(strings(
        re.find_iter(&text)
            .take(limit(n))
            .map(|m| m.as_str().to_string()),
    ))
}

/// Replacement text may reference groups as `$1` or `${name}`.
pub fn regex_replace_all(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("regexReplaceAll", args, 3)?;
    let re = compile("regexReplaceAll", &args[0])?;
    let text = expect_string("regexReplaceAll", &args[1], 2)?;
    let replacement = expect_string("regexReplaceAll", &args[2], 3)?;
    Ok(Value::String(
        re.replace_all(&text, replacement.as_str()).into_owned(),
    ))
}

pub fn regex_replace_all_literal(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("regexReplaceAllLiteral", args, 3)?;
    let re = compile("regexReplaceAllLiteral", &args[0])?;
    let text = expect_string("regexReplaceAllLiteral", &args[1], 2)?;
    let replacement = expect_string("regexReplaceAllLiteral", &args[2], 3)?;
    Ok(Value::String(
        re.replace_all(&text, NoExpand(&replacement)).into_owned(),
    ))
}

pub fn regex_split(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("regexSplit", args, 3)?;
    let re = compile("regexSplit", &args[0])?;
    let text = expect_string("regexSplit", &args[1], 2)?;
    let n = expect_int("regexSplit", &args[2], 3)?;
    let parts: Vec<String> = if n < 0 {
        re.split(&text).map(str::to_string).collect()
    } else {
        re.splitn(&text, limit(n)).map(str::to_string).collect()
    };
    Ok(strings(parts.into_iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    #[test]
    fn match_and_find() {
        let mut ctx = ctx();
        assert_eq!(
            regex_match(&mut ctx, &[json!("^[a-z]+\\d$"), json!("abc1")]).unwrap(),
            json!(true)
        );
        assert_eq!(
            regex_find(&mut ctx, &[json!("[0-9]+"), json!("ab12cd34")]).unwrap(),
            json!("12")
        );
        assert_eq!(
            regex_find(&mut ctx, &[json!("[0-9]+"), json!("none")]).unwrap(),
            json!("")
        );
    }

    #[test]
    fn find_all_honours_limit() {
        let mut ctx = ctx();
        let all = regex_find_all(&mut ctx, &[json!("[0-9]"), json!("a1b2c3"), json!(-1)]).unwrap();
        assert_eq!(all, json!(["1", "2", "3"]));
        let two = regex_find_all(&mut ctx, &[json!("[0-9]"), json!("a1b2c3"), json!(2)]).unwrap();
        assert_eq!(two, json!(["1", "2"]));
    }

    #[test]
    fn replace_expands_groups_unless_literal() {
        let mut ctx = ctx();
        let out = regex_replace_all(
            &mut ctx,
            &[json!("a(x*)b"), json!("-ab-axxb-"), json!("${1}W")],
        )
        .unwrap();
        assert_eq!(out, json!("-W-xxW-"));
        let out = regex_replace_all_literal(
            &mut ctx,
            &[json!("a(x*)b"), json!("-ab-axxb-"), json!("${1}")],
        )
        .unwrap();
        assert_eq!(out, json!("-${1}-${1}-"));
    }

    #[test]
    fn split_with_and_without_limit() {
        let mut ctx = ctx();
        let out = regex_split(&mut ctx, &[json!("z+"), json!("pizza"), json!(-1)]).unwrap();
        assert_eq!(out, json!(["pi", "a"]));
        let out = regex_split(&mut ctx, &[json!(","), json!("a,b,c"), json!(2)]).unwrap();
        assert_eq!(out, json!(["a", "b,c"]));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let mut ctx = ctx();
        let err = regex_match(&mut ctx, &[json!("("), json!("x")]).unwrap_err();
        assert_eq!(err.message(), "regexMatch: invalid regex \"(\"");
    }
}
