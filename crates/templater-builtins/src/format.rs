// SPDX-License-Identifier: Apache-2.0 OR MIT
//! `fmt`-style formatting behind `print`, `println` and `printf`.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value;
use templater_engine::{format_float, format_value, type_name};

/// Concatenates operands, adding a space between two operands when neither
/// is a string.
pub(crate) fn sprint(args: &[Value]) -> String {
    let mut output = String::new();
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 && !arg.is_string() && !args[idx - 1].is_string() {
            output.push(' ');
        }
        output.push_str(&format_value(arg));
    }
    output
}

pub(crate) fn sprintln(args: &[Value]) -> String {
    let mut output = args.iter().map(format_value).collect::<Vec<_>>().join(" ");
    output.push('\n');
    output
}

pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut output = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut arg_index = 0usize;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }

        let Some(specifier) = ParsedSpecifier::parse(&mut chars) else {
            output.push_str("%!(NOVERB)");
            break;
        };

        if !specifier.needs_argument() {
            output.push('%');
            continue;
        }

        match args.get(arg_index) {
            Some(arg) => {
                arg_index += 1;
                output.push_str(&specifier.format(arg));
            }
            None => {
                output.push_str("%!");
                output.push(specifier.verb);
                output.push_str("(MISSING)");
            }
        }
    }

    append_extra_args(&mut output, &args[arg_index.min(args.len())..]);
    output
}

fn append_extra_args(output: &mut String, extra_args: &[Value]) {
    if extra_args.is_empty() {
        return;
    }
    output.push_str("%!(EXTRA ");
    for (idx, arg) in extra_args.iter().enumerate() {
        if idx > 0 {
            output.push_str(", ");
        }
        output.push_str(&describe(arg));
    }
    output.push(')');
}

/// `type=value`, the way `fmt` reports operands it could not use.
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        other => format!("{}={}", type_name(other), format_value(other)),
    }
}

fn bad_verb(verb: char, value: &Value) -> String {
    format!("%!{verb}({})", describe(value))
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    minus: bool,
    plus: bool,
    zero: bool,
    space: bool,
    sharp: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatStrategy {
    PercentLiteral,
    StringLike,
    Quoted,
    Integer,
    Float,
    Bool,
    Char,
    Type,
    Fallback,
}

/// Widths and precisions above this are rejected the way Go's `fmt` does.
const MAX_WIDTH: usize = 1_000_000;

#[derive(Debug)]
struct ParsedSpecifier {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    bad_width: bool,
    bad_precision: bool,
    verb: char,
    strategy: FormatStrategy,
}

impl ParsedSpecifier {
    fn parse(chars: &mut Peekable<Chars<'_>>) -> Option<Self> {
        let mut flags = Flags::default();
        while let Some(&ch) = chars.peek() {
            match ch {
                '-' => flags.minus = true,
                '+' => flags.plus = true,
                '0' => flags.zero = true,
                ' ' => flags.space = true,
                '#' => flags.sharp = true,
                _ => break,
            }
            chars.next();
        }

        let mut width = read_number(chars);
        let mut precision = if chars.peek() == Some(&'.') {
            chars.next();
            Some(read_number(chars).unwrap_or(0))
        } else {
            None
        };
        let bad_width = width.is_some_and(|w| w > MAX_WIDTH);
        if bad_width {
            width = None;
        }
        let bad_precision = precision.is_some_and(|p| p > MAX_WIDTH);
        if bad_precision {
            precision = None;
        }

        let verb = chars.next()?;
        let strategy = match verb {
            '%' => FormatStrategy::PercentLiteral,
            's' | 'v' => FormatStrategy::StringLike,
            'q' => FormatStrategy::Quoted,
            'd' | 'b' | 'o' | 'x' | 'X' => FormatStrategy::Integer,
            'f' | 'F' | 'g' | 'G' | 'e' | 'E' => FormatStrategy::Float,
            't' => FormatStrategy::Bool,
            'c' => FormatStrategy::Char,
            'T' => FormatStrategy::Type,
            _ => FormatStrategy::Fallback,
        };

        Some(Self {
            flags,
            width,
            precision,
            bad_width,
            bad_precision,
            verb,
            strategy,
        })
    }

    fn needs_argument(&self) -> bool {
        self.strategy != FormatStrategy::PercentLiteral
    }

    fn format(&self, arg: &Value) -> String {
        let body = match self.strategy {
            FormatStrategy::PercentLiteral => return "%".to_string(),
            FormatStrategy::StringLike => self.format_string_like(arg),
            FormatStrategy::Quoted => match arg {
                Value::String(s) => quote(s),
                other => match integer_of(other).and_then(char_of) {
                    Some(ch) => format!("'{ch}'"),
                    None => bad_verb(self.verb, other),
                },
            },
            FormatStrategy::Integer => self.format_integer(arg),
            FormatStrategy::Float => self.format_float(arg),
            FormatStrategy::Bool => match arg {
                Value::Bool(flag) => flag.to_string(),
                other => bad_verb(self.verb, other),
            },
            FormatStrategy::Char => match integer_of(arg).and_then(char_of) {
                Some(ch) => ch.to_string(),
                None => bad_verb(self.verb, arg),
            },
            FormatStrategy::Type => type_name(arg).to_string(),
            FormatStrategy::Fallback => bad_verb(self.verb, arg),
        };
        let mut out = String::new();
        if self.bad_width {
            out.push_str("%!(BADWIDTH)");
        }
        if self.bad_precision {
            out.push_str("%!(BADPREC)");
        }
        out.push_str(&self.pad(body));
        out
    }

    fn format_string_like(&self, arg: &Value) -> String {
        let text = match arg {
            Value::String(s) => s.clone(),
            Value::Number(_) if self.verb == 'v' => return self.format_float_or_integer(arg),
            other => format_value(other),
        };
        match self.precision {
            Some(limit) if self.verb == 's' || arg.is_string() => text.chars().take(limit).collect(),
            _ => text,
        }
    }

    /// `%v` on numbers honours the sign flag like the numeric verbs do.
    fn format_float_or_integer(&self, arg: &Value) -> String {
        let text = format_value(arg);
        self.with_sign(text)
    }

    fn format_integer(&self, arg: &Value) -> String {
        if let Value::String(s) = arg {
            return match self.verb {
                'x' => hex_bytes(s.as_bytes(), false),
                'X' => hex_bytes(s.as_bytes(), true),
                _ => bad_verb(self.verb, arg),
            };
        }
        let Some(value) = integer_of(arg) else {
            return bad_verb(self.verb, arg);
        };

        let magnitude = value.unsigned_abs();
        let mut digits = match self.verb {
            'b' => format!("{magnitude:b}"),
            'o' => format!("{magnitude:o}"),
            'x' => format!("{magnitude:x}"),
            'X' => format!("{magnitude:X}"),
            _ => magnitude.to_string(),
        };
        if let Some(min_digits) = self.precision {
            while digits.len() < min_digits {
                digits.insert(0, '0');
            }
        }
        if self.flags.sharp {
            let prefix = match self.verb {
                'b' => "0b",
                'o' => "0",
                'x' => "0x",
                'X' => "0X",
                _ => "",
            };
            digits.insert_str(0, prefix);
        }
        if value < 0 {
            digits.insert(0, '-');
            digits
        } else {
            self.with_sign(digits)
        }
    }

    fn format_float(&self, arg: &Value) -> String {
        let value = match arg {
            Value::Number(number) => match number.as_f64() {
                Some(value) => value,
                None => return bad_verb(self.verb, arg),
            },
            other => return bad_verb(self.verb, other),
        };
        let upper = self.verb.is_ascii_uppercase();
        let text = match self.verb {
            'e' | 'E' => format_exponent(value, self.precision.unwrap_or(6), upper),
            'g' | 'G' => match self.precision {
                Some(precision) => format_general(value, precision, upper),
                None if upper => format_float(value).to_uppercase(),
                None => format_float(value),
            },
            _ => format!("{:.*}", self.precision.unwrap_or(6), value),
        };
        self.with_sign(text)
    }

    fn with_sign(&self, text: String) -> String {
        if text.starts_with('-') {
            text
        } else if self.flags.plus {
            format!("+{text}")
        } else if self.flags.space {
            format!(" {text}")
        } else {
            text
        }
    }

    fn pad(&self, body: String) -> String {
        let Some(width) = self.width else {
            return body;
        };
        let len = body.chars().count();
        if len >= width {
            return body;
        }
        let fill = width - len;
        if self.flags.minus {
            return format!("{body}{}", " ".repeat(fill));
        }
        if !self.flags.zero {
            return format!("{}{body}", " ".repeat(fill));
        }
        let numeric = matches!(
            self.strategy,
            FormatStrategy::Integer | FormatStrategy::Float
        );
        match body.chars().next() {
            Some(sign @ ('-' | '+' | ' ')) if numeric => {
                format!("{sign}{}{}", "0".repeat(fill), &body[1..])
            }
            _ => format!("{}{body}", "0".repeat(fill)),
        }
    }
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|ch| ch.to_digit(10)) {
        chars.next();
        let digit = usize::try_from(digit).unwrap_or(0);
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
    }
    value
}

/// Integer view of a number. Floats without a fractional part count, since
/// YAML and JSON inputs do not keep the distinction reliably.
fn integer_of(value: &Value) -> Option<i128> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(i) = number.as_i64() {
        return Some(i128::from(i));
    }
    if let Some(u) = number.as_u64() {
        return Some(i128::from(u));
    }
    let float = number.as_f64()?;
    if float.fract() == 0.0 && float.abs() < 9.2e18 {
        format!("{float:.0}").parse().ok()
    } else {
        None
    }
}

fn char_of(code: i128) -> Option<char> {
    u32::try_from(code).ok().and_then(char::from_u32)
}

fn hex_bytes(bytes: &[u8], upper: bool) -> String {
    bytes
        .iter()
        .map(|b| {
            if upper {
                format!("{b:02X}")
            } else {
                format!("{b:02x}")
            }
        })
        .collect()
}

/// Double-quoted Go string literal with escapes for control characters.
pub(crate) fn quote(text: &str) -> String {
    let mut output = String::with_capacity(text.len() + 2);
    output.push('"');
    for ch in text.chars() {
        match ch {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            '\u{7}' => output.push_str("\\a"),
            '\u{8}' => output.push_str("\\b"),
            '\u{c}' => output.push_str("\\f"),
            '\u{b}' => output.push_str("\\v"),
            ch if (ch as u32) < 0x20 || ch == '\u{7f}' => {
                output.push_str(&format!("\\x{:02x}", ch as u32));
            }
            ch => output.push(ch),
        }
    }
    output.push('"');
    output
}

fn split_exponent(formatted: &str) -> (&str, i32) {
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse().unwrap_or(0)),
        None => (formatted, 0),
    }
}

/// `%e`: mantissa with `precision` fraction digits and a signed exponent of
/// at least two digits.
fn format_exponent(value: f64, precision: usize, upper: bool) -> String {
    let formatted = format!("{value:.precision$e}");
    let (mantissa, exponent) = split_exponent(&formatted);
    let sign = if exponent < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:02}", exponent.abs())
}

/// `%.Ng`: `precision` significant digits, trailing zeros dropped, exponent
/// form when the exponent falls outside the precision.
fn format_general(value: f64, precision: usize, upper: bool) -> String {
    let precision = precision.max(1);
    let formatted = format!("{:.*e}", precision - 1, value.abs());
    let (mantissa, exponent) = split_exponent(&formatted);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_end_matches('0');
    let significant = i32::try_from(digits.len().max(1)).unwrap_or(i32::MAX);
    let point = exponent + 1;

    let mut exponent_limit = i32::try_from(precision).unwrap_or(i32::MAX);
    if exponent_limit > significant && significant >= point {
        exponent_limit = significant;
    }

    let body = if exponent < -4 || exponent >= exponent_limit {
        let fraction = usize::try_from(significant - 1).unwrap_or(0);
        format_exponent(value.abs(), fraction, upper)
    } else {
        let fraction = usize::try_from((significant - point).max(0)).unwrap_or(0);
        format!("{:.*}", fraction, value.abs())
    };
    if value.is_sign_negative() && value != 0.0 {
        format!("-{body}")
    } else {
        body
    }
}
