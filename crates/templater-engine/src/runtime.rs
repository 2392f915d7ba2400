// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::error::Error;

/// Signature implemented by helper functions invoked from templates.
pub type Function = dyn Fn(&mut EvalContext, &[Value]) -> Result<Value, Error> + Send + Sync;

/// Number of arguments a function accepts, counting a piped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Any,
    Exactly(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Any => true,
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Between(min, max) => (min..=max).contains(&count),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Any => f.write_str("any number"),
            Arity::Exactly(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Between(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

#[derive(Clone)]
struct FunctionEntry {
    func: Arc<Function>,
    arity: Arity,
}

/// Registry that maps helper names to callable functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    map: Arc<HashMap<String, FunctionEntry>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.map.len())
            .finish()
    }
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a new builder for constructing registries.
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::new()
    }

    /// Fetches a helper function by name.
    pub fn get(&self, name: &str) -> Option<Arc<Function>> {
        self.map.get(name).map(|entry| entry.func.clone())
    }

    /// Declared arity of a helper, if it is registered.
    pub fn arity(&self, name: &str) -> Option<Arity> {
        self.map.get(name).map(|entry| entry.arity)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Reports whether the registry contains no helper functions.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns a sorted list of the registered function names.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Helper for constructing registries before freezing them into an immutable map.
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    map: HashMap<String, FunctionEntry>,
}

impl FunctionRegistryBuilder {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a helper function that accepts any number of arguments.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&mut EvalContext, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.register_with_arity(name, Arity::Any, func)
    }

    /// Registers a helper whose argument count is checked when a template is
    /// compiled. Later registrations replace earlier ones.
    pub fn register_with_arity<F>(
        &mut self,
        name: impl Into<String>,
        arity: Arity,
        func: F,
    ) -> &mut Self
    where
        F: Fn(&mut EvalContext, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.map.insert(
            name.into(),
            FunctionEntry {
                func: Arc::new(func),
                arity,
            },
        );
        self
    }

    /// Extends the builder with all helpers from another registry.
    pub fn extend(&mut self, other: &FunctionRegistry) -> &mut Self {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
        }
        self
    }

    /// Finalises the builder into an immutable registry.
    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            map: Arc::new(self.map),
        }
    }
}

/// Context handed to helper functions while a template executes.
#[derive(Debug, Default)]
pub struct EvalContext {
    functions: FunctionRegistry,
    template: String,
}

impl EvalContext {
    pub fn new(functions: FunctionRegistry, template: impl Into<String>) -> Self {
        Self {
            functions,
            template: template.into(),
        }
    }

    /// Retrieves a helper function by name, if registered.
    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Name of the template currently executing.
    pub fn template_name(&self) -> &str {
        &self.template
    }

    pub(crate) fn replace_template_name(&mut self, name: String) -> String {
        std::mem::replace(&mut self.template, name)
    }
}

/// Renders a value the way `{{ . }}` prints it: `null` prints nothing, strings
/// are written verbatim and everything else uses Go's `%v` formatting.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => format_value(other),
    }
}

/// Go `%v` formatting: `[a b]` for sequences, `map[k:v]` for mappings and
/// `<nil>` for null.
pub fn format_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("<nil>"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(n)),
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("map[");
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                out.push_str(key);
                out.push(':');
                write_value(out, item);
            }
            out.push(']');
        }
    }
}

pub fn format_number(number: &Number) -> String {
    if let Some(i) = number.as_i64() {
        i.to_string()
    } else if let Some(u) = number.as_u64() {
        u.to_string()
    } else {
        format_float(number.as_f64().unwrap_or(f64::NAN))
    }
}

/// Formats a float like Go's `%v`: the shortest representation that round
/// trips, switching to exponent form below 1e-4 and from 1e6 up.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let mut out = String::new();
    if value < 0.0 {
        out.push('-');
    }
    if exponent < -4 || exponent >= 6 {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if exponent < 0 { '-' } else { '+' });
        out.push_str(&format!("{:02}", exponent.abs()));
    } else if exponent < 0 {
        out.push_str("0.");
        for _ in 0..(-exponent - 1) {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        let int_len = usize::try_from(exponent).unwrap_or(0) + 1;
        if digits.len() <= int_len {
            out.push_str(&digits);
            for _ in digits.len()..int_len {
                out.push('0');
            }
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    }
    out
}

/// Go type name of a value, as used in error messages and `typeOf`.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "<nil>",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() => "int",
        Value::Number(n) if n.is_u64() => "uint64",
        Value::Number(_) => "float64",
        Value::String(_) => "string",
        Value::Array(_) => "[]interface {}",
        Value::Object(_) => "map[string]interface {}",
    }
}

/// Parses a Go number literal: decimal, `0x`/`0o`/`0b` prefixed or legacy
/// octal integers, floats with optional exponent, `_` separators, optional
/// sign. Integers that overflow 64 bits become floats.
pub fn parse_number(text: &str) -> Option<Number> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let lower = body.to_ascii_lowercase();
    let radix = if let Some(digits) = lower.strip_prefix("0x") {
        Some((16, digits))
    } else if let Some(digits) = lower.strip_prefix("0o") {
        Some((8, digits))
    } else if let Some(digits) = lower.strip_prefix("0b") {
        Some((2, digits))
    } else if lower.len() > 1 && lower.starts_with('0') && lower.bytes().all(|b| b.is_ascii_digit())
    {
        Some((8, &lower[1..]))
    } else {
        None
    };

    if let Some((radix, digits)) = radix {
        let magnitude = u64::from_str_radix(digits, radix).ok()?;
        return signed_integer(negative, magnitude);
    }

    if !lower.contains(['.', 'e']) {
        if let Ok(magnitude) = lower.parse::<u64>() {
            return signed_integer(negative, magnitude);
        }
    }

    let value: f64 = lower.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Number::from_f64(if negative { -value } else { value })
}

fn signed_integer(negative: bool, magnitude: u64) -> Option<Number> {
    if !negative {
        return Some(match i64::try_from(magnitude) {
            Ok(value) => Number::from(value),
            Err(_) => Number::from(magnitude),
        });
    }
    let value = -i128::from(magnitude);
    i64::try_from(value).ok().map(Number::from)
}

/// Go's notion of an empty value, used by `empty` and `default`.
pub fn is_empty(value: &Value) -> bool {
    !is_truthy(value)
}

/// Truthiness used by `if`, `with`, `and`, `or` and `not`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().is_some_and(|f| f != 0.0)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub fn coerce_number(value: &Value) -> Result<f64, Error> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::execute("number out of range", None)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::execute(format!("cannot convert {s:?} to number"), None)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        other => Err(Error::execute(
            format!("expected numeric value, got {}", type_name(other)),
            None,
        )),
    }
}
