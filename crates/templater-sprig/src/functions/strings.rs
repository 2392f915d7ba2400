// SPDX-License-Identifier: Apache-2.0 OR MIT
use heck::{ToKebabCase, ToSnakeCase, ToUpperCamelCase};
use serde_json::{json, Value};
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{
    clamp_char_range, expect_exact_args, expect_int, expect_min_args, expect_string,
    expect_usize, format_value, string_slice, value_to_string,
};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("upper", Arity::Exactly(1), upper)
        .register_with_arity("lower", Arity::Exactly(1), lower)
        .register_with_arity("title", Arity::Exactly(1), title)
        .register_with_arity("untitle", Arity::Exactly(1), untitle)
        .register_with_arity("trim", Arity::Exactly(1), trim)
        .register_with_arity("trimAll", Arity::Exactly(2), trim_all)
        .register_with_arity("trimPrefix", Arity::Exactly(2), trim_prefix)
        .register_with_arity("trimSuffix", Arity::Exactly(2), trim_suffix)
        .register_with_arity("hasPrefix", Arity::Exactly(2), has_prefix)
        .register_with_arity("hasSuffix", Arity::Exactly(2), has_suffix)
        .register_with_arity("contains", Arity::Exactly(2), contains)
        .register_with_arity("replace", Arity::Exactly(3), replace)
        .register_with_arity("substr", Arity::Exactly(3), substr)
        .register_with_arity("trunc", Arity::Exactly(2), trunc)
        .register_with_arity("abbrev", Arity::Exactly(2), abbrev)
        .register_with_arity("initials", Arity::Exactly(1), initials)
        .register_with_arity("wrap", Arity::Exactly(2), wrap)
        .register_with_arity("indent", Arity::Exactly(2), indent)
        .register_with_arity("nindent", Arity::Exactly(2), nindent)
        .register_with_arity("nospace", Arity::Exactly(1), nospace)
        .register_with_arity("repeat", Arity::Exactly(2), repeat)
        .register("cat", cat)
        .register("quote", quote)
        .register("squote", squote)
        .register_with_arity("snakecase", Arity::Exactly(1), snakecase)
        .register_with_arity("camelcase", Arity::Exactly(1), camelcase)
        .register_with_arity("kebabcase", Arity::Exactly(1), kebabcase)
        .register_with_arity("swapcase", Arity::Exactly(1), swapcase)
        .register_with_arity("plural", Arity::Exactly(3), plural)
        .register_with_arity("toString", Arity::Exactly(1), to_string)
        .register_with_arity("toStrings", Arity::Exactly(1), to_strings);
}

pub fn upper(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("upper", args, 1)?;
    let s = expect_string("upper", &args[0], 1)?;
    Ok(json!(s.to_uppercase()))
}

pub fn lower(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("lower", args, 1)?;
    let s = expect_string("lower", &args[0], 1)?;
    Ok(json!(s.to_lowercase()))
}

/// Applies `change` to the first letter of every word. Letters, digits and
/// underscores continue a word, everything else separates words.
fn map_word_starts(input: &str, change: impl Fn(char, &mut String)) -> String {
    let mut result = String::with_capacity(input.len());
    let mut at_start = true;
    for ch in input.chars() {
        if at_start && ch.is_alphabetic() {
            change(ch, &mut result);
        } else {
            result.push(ch);
        }
        at_start = !(ch.is_alphanumeric() || ch == '_');
    }
    result
}

pub fn title(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("title", args, 1)?;
    let input = expect_string("title", &args[0], 1)?;
    Ok(json!(map_word_starts(&input, |ch, out| out.extend(ch.to_uppercase()))))
}

pub fn untitle(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("untitle", args, 1)?;
    let input = expect_string("untitle", &args[0], 1)?;
    Ok(json!(map_word_starts(&input, |ch, out| out.extend(ch.to_lowercase()))))
}

pub fn trim(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("trim", args, 1)?;
    let input = expect_string("trim", &args[0], 1)?;
    Ok(json!(input.trim()))
}

pub fn trim_all(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("trimAll", args, 2)?;
    let cutset = expect_string("trimAll", &args[0], 1)?;
    let input = expect_string("trimAll", &args[1], 2)?;
    Ok(json!(input.trim_matches(|c: char| cutset.contains(c))))
}

pub fn trim_prefix(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("trimPrefix", args, 2)?;
    let prefix = expect_string("trimPrefix", &args[0], 1)?;
    let input = expect_string("trimPrefix", &args[1], 2)?;
    let result = input.strip_prefix(prefix.as_str()).unwrap_or(&input);
    Ok(json!(result))
}

pub fn trim_suffix(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("trimSuffix", args, 2)?;
    let suffix = expect_string("trimSuffix", &args[0], 1)?;
    let input = expect_string("trimSuffix", &args[1], 2)?;
    let result = input.strip_suffix(suffix.as_str()).unwrap_or(&input);
    Ok(json!(result))
}

pub fn has_prefix(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("hasPrefix", args, 2)?;
    let prefix = expect_string("hasPrefix", &args[0], 1)?;
    let input = expect_string("hasPrefix", &args[1], 2)?;
    Ok(Value::Bool(input.starts_with(&prefix)))
}

pub fn has_suffix(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("hasSuffix", args, 2)?;
    let suffix = expect_string("hasSuffix", &args[0], 1)?;
    let input = expect_string("hasSuffix", &args[1], 2)?;
    Ok(Value::Bool(input.ends_with(&suffix)))
}

pub fn contains(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("contains", args, 2)?;
    let needle = expect_string("contains", &args[0], 1)?;
    let haystack = expect_string("contains", &args[1], 2)?;
    Ok(Value::Bool(haystack.contains(&needle)))
}

pub fn replace(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("replace", args, 3)?;
    let old = expect_string("replace", &args[0], 1)?;
    let new = expect_string("replace", &args[1], 2)?;
    let text = expect_string("replace", &args[2], 3)?;
    Ok(Value::String(text.replace(&old, &new)))
}

/// `substr START END S`, counted in characters. A negative start means the
/// beginning; a negative or oversized end means the end.
pub fn substr(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("substr", args, 3)?;
    let start = expect_int("substr", &args[0], 1)?;
    let end = expect_int("substr", &args[1], 2)?;
    let input = expect_string("substr", &args[2], 3)?;
    let start = usize::try_from(start).unwrap_or(0);
    let len = usize::try_from(end)
        .ok()
        .map(|end| end.saturating_sub(start));
    let (start_idx, end_idx) = clamp_char_range(&input, start, len);
    Ok(Value::String(input[start_idx..end_idx].to_string()))
}

/// `trunc N S` keeps the first `N` characters, or the last `-N` when `N` is
/// negative.
pub fn trunc(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("trunc", args, 2)?;
    let length = expect_int("trunc", &args[0], 1)?;
    let text = expect_string("trunc", &args[1], 2)?;
    let total = text.chars().count();
    let keep = usize::try_from(length.unsigned_abs()).unwrap_or(usize::MAX);
    let out: String = if length < 0 {
        text.chars().skip(total.saturating_sub(keep)).collect()
    } else {
        text.chars().take(keep).collect()
    };
    Ok(Value::String(out))
}

/// `abbrev WIDTH S` shortens `S` to `WIDTH` characters ending in `...`.
pub fn abbrev(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("abbrev", args, 2)?;
    let width = expect_int("abbrev", &args[0], 1)?;
    let text = expect_string("abbrev", &args[1], 2)?;
    let Ok(width) = usize::try_from(width) else {
        return Ok(Value::String(text));
    };
    if width < 4 || text.chars().count() <= width {
        return Ok(Value::String(text));
    }
    let mut out: String = text.chars().take(width - 3).collect();
    out.push_str("...");
    Ok(Value::String(out))
}

pub fn initials(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("initials", args, 1)?;
    let text = expect_string("initials", &args[0], 1)?;
    Ok(Value::String(
        text.split_whitespace()
            .filter_map(|word| word.chars().next())
            .collect(),
    ))
}

pub fn wrap(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("wrap", args, 2)?;
    let width = expect_usize("wrap", &args[0], 1)?;
    let text = expect_string("wrap", &args[1], 2)?;
    if width == 0 {
        return Ok(Value::String(text));
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if current.is_empty() {
            current.push_str(word);
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    Ok(Value::String(lines.join("\n")))
}

/// Prefixes every line, including empty ones, with `N` spaces.
pub fn indent(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("indent", args, 2)?;
    let spaces = expect_usize("indent", &args[0], 1)?;
    let input = expect_string("indent", &args[1], 2)?;
    let pad = " ".repeat(spaces);
    let result = format!("{pad}{}", input.replace('\n', &format!("\n{pad}")));
    Ok(Value::String(result))
}

pub fn nindent(ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let mut output = indent(ctx, args)?;
    if let Value::String(s) = &mut output {
        s.insert(0, '\n');
    }
    Ok(output)
}

pub fn nospace(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("nospace", args, 1)?;
    let input = expect_string("nospace", &args[0], 1)?;
    Ok(Value::String(
        input.chars().filter(|c| !c.is_whitespace()).collect(),
    ))
}

pub fn repeat(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("repeat", args, 2)?;
    let count = expect_usize("repeat", &args[0], 1)?;
    let s = expect_string("repeat", &args[1], 2)?;
    Ok(json!(s.repeat(count)))
}

pub fn cat(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .filter(|value| !value.is_null())
        .map(value_to_string)
        .collect();
    Ok(Value::String(parts.join(" ")))
}

pub fn quote(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let mut parts = Vec::new();
    for value in args {
        if value.is_null() {
            continue;
        }
        let raw = value_to_string(value);
        let quoted = serde_json::to_string(&raw)
            .unwrap_or_else(|_| format!("\"{}\"", raw.replace('"', "\\\"")));
        parts.push(quoted);
    }
    Ok(Value::String(parts.join(" ")))
}

pub fn squote(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .filter(|value| !value.is_null())
        .map(|value| format!("'{}'", value_to_string(value)))
        .collect();
    Ok(Value::String(parts.join(" ")))
}

pub fn snakecase(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("snakecase", args, 1)?;
    let input = expect_string("snakecase", &args[0], 1)?;
    Ok(Value::String(input.to_snake_case()))
}

pub fn camelcase(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("camelcase", args, 1)?;
    let input = expect_string("camelcase", &args[0], 1)?;
    Ok(Value::String(input.to_upper_camel_case()))
}

pub fn kebabcase(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("kebabcase", args, 1)?;
    let input = expect_string("kebabcase", &args[0], 1)?;
    Ok(Value::String(input.to_kebab_case()))
}

pub fn swapcase(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("swapcase", args, 1)?;
    let input = expect_string("swapcase", &args[0], 1)?;
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_lowercase() {
            output.extend(ch.to_uppercase());
        } else if ch.is_uppercase() {
            output.extend(ch.to_lowercase());
        } else {
            output.push(ch);
        }
    }
    Ok(Value::String(output))
}

/// `plural ONE MANY COUNT`.
pub fn plural(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("plural", args, 3)?;
    let count = expect_int("plural", &args[2], 3)?;
    let chosen = if count == 1 { &args[0] } else { &args[1] };
    Ok(Value::String(expect_string("plural", chosen, if count == 1 { 1 } else { 2 })?))
}

pub fn to_string(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("toString", args, 1)?;
    Ok(Value::String(match &args[0] {
        Value::String(s) => s.clone(),
        other => format_value(other),
    }))
}

pub fn to_strings(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("toStrings", args, 1)?;
    Ok(Value::Array(
        string_slice(&args[0]).into_iter().map(Value::String).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    #[test]
    fn uppercases_text() {
        let mut ctx = ctx();
        let out = super::upper(&mut ctx, &[json!("hello")]).unwrap();
        assert_eq!(out, json!("HELLO"));
    }

    #[test]
    fn title_only_touches_word_starts() {
        let mut ctx = ctx();
        let out = title(&mut ctx, &[json!("hello wORLD-wide web_site")]).unwrap();
        assert_eq!(out, json!("Hello WORLD-Wide Web_site"));
        let out = untitle(&mut ctx, &[json!("Hello World")]).unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[test]
    fn substr_handles_unicode_and_open_ends() {
        let mut ctx = ctx();
        let out = substr(&mut ctx, &[json!(1), json!(4), json!("héllo")]).unwrap();
        assert_eq!(out, json!("éll"));
        let out = substr(&mut ctx, &[json!(2), json!(-1), json!("héllo")]).unwrap();
        assert_eq!(out, json!("llo"));
        let out = substr(&mut ctx, &[json!(-3), json!(2), json!("héllo")]).unwrap();
        assert_eq!(out, json!("hé"));
    }

    #[test]
    fn trunc_keeps_head_or_tail() {
        let mut ctx = ctx();
        assert_eq!(trunc(&mut ctx, &[json!(5), json!("hello world")]).unwrap(), json!("hello"));
        assert_eq!(trunc(&mut ctx, &[json!(-5), json!("hello world")]).unwrap(), json!("world"));
        assert_eq!(trunc(&mut ctx, &[json!(50), json!("short")]).unwrap(), json!("short"));
    }

    #[test]
    fn abbrev_and_initials() {
        let mut ctx = ctx();
        let out = abbrev(&mut ctx, &[json!(5), json!("hello world")]).unwrap();
        assert_eq!(out, json!("he..."));
        let out = initials(&mut ctx, &[json!("First Try")]).unwrap();
        assert_eq!(out, json!("FT"));
    }

    #[test]
    fn indent_pads_every_line() {
        let mut ctx = ctx();
        let out = indent(&mut ctx, &[json!(2), json!("a\n\nb\n")]).unwrap();
        assert_eq!(out, json!("  a\n  \n  b\n  "));
        let out = nindent(&mut ctx, &[json!(2), json!("a")]).unwrap();
        assert_eq!(out, json!("\n  a"));
    }

    #[test]
    fn cat_skips_null_arguments() {
        let mut ctx = ctx();
        let out = super::cat(&mut ctx, &[Value::Null, json!("foo"), json!("bar")]).unwrap();
        assert_eq!(out, json!("foo bar"));
    }

    #[test]
    fn quote_and_squote_wrap_values() {
        let mut ctx = ctx();
        let quote_out = super::quote(&mut ctx, &[json!("foo"), json!("bar baz")]).unwrap();
        assert_eq!(quote_out, json!("\"foo\" \"bar baz\""));
        let squote_out = super::squote(&mut ctx, &[json!("foo"), json!(123)]).unwrap();
        assert_eq!(squote_out, json!("'foo' '123'"));
    }

    #[test]
    fn case_conversions_follow_sprig_conventions() {
        let mut ctx = ctx();
        assert_eq!(
            super::snakecase(&mut ctx, &[json!("FirstName")]).unwrap(),
            json!("first_name")
        );
        assert_eq!(
            super::camelcase(&mut ctx, &[json!("first_name")]).unwrap(),
            json!("FirstName")
        );
        assert_eq!(
            super::kebabcase(&mut ctx, &[json!("First Name")]).unwrap(),
            json!("first-name")
        );
        assert_eq!(
            super::swapcase(&mut ctx, &[json!("FirstName")]).unwrap(),
            json!("fIRSTnAME")
        );
    }

    #[test]
    fn plural_and_string_conversions() {
        let mut ctx = ctx();
        assert_eq!(
            plural(&mut ctx, &[json!("one anchovy"), json!("many anchovies"), json!(2)]).unwrap(),
            json!("many anchovies")
        );
        assert_eq!(to_string(&mut ctx, &[json!(1.5)]).unwrap(), json!("1.5"));
        assert_eq!(
            to_strings(&mut ctx, &[json!([1, null, "a"])]).unwrap(),
            json!(["1", "a"])
        );
    }
}
