// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Date helpers. Times are RFC 3339 strings or integer Unix seconds; layouts
//! use Go's reference time `Mon Jan 2 15:04:05 MST 2006`. Nothing here reads
//! the wall clock.

use std::fmt::Write as _;

use chrono::format::{self, Fixed, Item, Numeric, Pad, Parsed};
use chrono::{
    DateTime, Duration, FixedOffset, Local, Offset, SecondsFormat, TimeZone, Utc,
};
use serde_json::Value;
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_string, to_int, type_name};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("date", Arity::Exactly(2), date)
        .register_with_arity("dateInZone", Arity::Exactly(3), date_in_zone)
        .register_with_arity("htmlDate", Arity::Exactly(1), html_date)
        .register_with_arity("toDate", Arity::Exactly(2), to_date)
        .register_with_arity("unixEpoch", Arity::Exactly(1), unix_epoch)
        .register_with_arity("dateModify", Arity::Exactly(2), date_modify);
}

/// Go layout chunks in match order; longer chunks shadow their prefixes.
const CHUNKS: &[(&str, Chunk)] = &[
    ("January", Chunk::Fixed(Fixed::LongMonthName)),
    ("Jan", Chunk::Fixed(Fixed::ShortMonthName)),
    ("Monday", Chunk::Fixed(Fixed::LongWeekdayName)),
    ("Mon", Chunk::Fixed(Fixed::ShortWeekdayName)),
    ("MST", Chunk::ZoneName),
    ("2006", Chunk::Numeric(Numeric::Year, Pad::Zero)),
    ("__2", Chunk::Numeric(Numeric::Ordinal, Pad::Space)),
    ("_2006", Chunk::Underscore),
    ("_2", Chunk::Numeric(Numeric::Day, Pad::Space)),
    ("002", Chunk::Numeric(Numeric::Ordinal, Pad::Zero)),
    ("01", Chunk::Numeric(Numeric::Month, Pad::Zero)),
    ("02", Chunk::Numeric(Numeric::Day, Pad::Zero)),
    ("03", Chunk::Numeric(Numeric::Hour12, Pad::Zero)),
    ("04", Chunk::Numeric(Numeric::Minute, Pad::Zero)),
    ("05", Chunk::Numeric(Numeric::Second, Pad::Zero)),
    ("06", Chunk::Numeric(Numeric::YearMod100, Pad::Zero)),
    ("15", Chunk::Numeric(Numeric::Hour, Pad::Zero)),
    ("1", Chunk::Numeric(Numeric::Month, Pad::None)),
    ("2", Chunk::Numeric(Numeric::Day, Pad::None)),
    ("3", Chunk::Numeric(Numeric::Hour12, Pad::None)),
    ("4", Chunk::Numeric(Numeric::Minute, Pad::None)),
    ("5", Chunk::Numeric(Numeric::Second, Pad::None)),
    ("PM", Chunk::Fixed(Fixed::UpperAmPm)),
    ("pm", Chunk::Fixed(Fixed::LowerAmPm)),
    ("Z07:00", Chunk::Fixed(Fixed::TimezoneOffsetColonZ)),
    ("Z0700", Chunk::Fixed(Fixed::TimezoneOffsetZ)),
    ("-07:00", Chunk::Fixed(Fixed::TimezoneOffsetColon)),
    ("-0700", Chunk::Fixed(Fixed::TimezoneOffset)),
    ("-07", Chunk::Fixed(Fixed::TimezoneOffsetTripleColon)),
];

#[derive(Clone)]
enum Chunk {
    Fixed(Fixed),
    Numeric(Numeric, Pad),
    ZoneName,
    /// `_2006` is a literal underscore followed by the year.
    Underscore,
}

/// Fractional seconds: `.000` style keeps trailing zeros, `.999` trims them.
fn fraction_chunk<'a>(rest: &str) -> Option<(usize, Item<'a>)> {
    let digits = rest.strip_prefix('.')?;
    let digit = digits.chars().next().filter(|c| *c == '0' || *c == '9')?;
    let run = digits.chars().take_while(|c| *c == digit).count();
    if digits[run..].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let fixed = match (digit, run) {
        ('9', _) => Fixed::Nanosecond,
        ('0', 3) => Fixed::Nanosecond3,
        ('0', 6) => Fixed::Nanosecond6,
        ('0', 9) => Fixed::Nanosecond9,
        _ => return None,
    };
    Some((run + 1, Item::Fixed(fixed)))
}

/// Translates a Go layout into chrono format items. `zone_name` is printed for
/// `MST` when formatting; `None` parses any zone name there.
fn layout_items<'a>(layout: &'a str, zone_name: Option<&'a str>) -> Vec<Item<'a>> {
    let mut items = Vec::new();
    let mut literal_start = 0;
    let mut idx = 0;
    while idx < layout.len() {
        let rest = &layout[idx..];
        let matched = fraction_chunk(rest).or_else(|| {
            CHUNKS
                .iter()
                .find(|(token, _)| rest.starts_with(token))
                .map(|(token, chunk)| {
                    let item = match chunk {
                        Chunk::Fixed(fixed) => Item::Fixed(fixed.clone()),
                        Chunk::Numeric(numeric, pad) => Item::Numeric(numeric.clone(), *pad),
                        Chunk::ZoneName => match zone_name {
                            Some(name) => Item::Literal(name),
                            None => Item::Fixed(Fixed::TimezoneName),
                        },
                        Chunk::Underscore => return (1, Item::Literal("_")),
                    };
                    (token.len(), item)
                })
        });
        match matched {
            Some((len, item)) => {
                if literal_start < idx {
                    items.push(Item::Literal(&layout[literal_start..idx]));
                }
                items.push(item);
                idx += len;
                literal_start = idx;
            }
            None => idx += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    if literal_start < layout.len() {
        items.push(Item::Literal(&layout[literal_start..]));
    }
    items
}

/// Name printed for `MST`: `UTC` at offset zero, otherwise `+hhmm`.
fn zone_label(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "UTC".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("{sign}{:02}{:02}", minutes / 60, minutes % 60)
}

fn format_time(name: &'static str, layout: &str, time: &DateTime<FixedOffset>) -> Result<String, Error> {
    let label = zone_label(time.offset());
    let items = layout_items(layout, Some(&label));
    let mut out = String::new();
    write!(out, "{}", time.format_with_items(items.iter()))
        .map_err(|_| Error::execute(format!("{name}: cannot format time with layout {layout:?}"), None))?;
    Ok(out)
}

fn rfc3339(time: &DateTime<FixedOffset>) -> Value {
    Value::String(time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn time_arg(name: &'static str, value: &Value, position: usize) -> Result<DateTime<FixedOffset>, Error> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim()).map_err(|err| {
            Error::execute_with_source(
                format!("{name} argument {position} is not an RFC 3339 time: {text:?}"),
                err,
            )
        }),
        Value::Number(_) => to_int(value)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|time| time.with_timezone(&Utc.fix()))
            .ok_or_else(|| {
                Error::execute(
                    format!("{name} argument {position} is not a valid Unix time"),
                    None,
                )
            }),
        other => Err(Error::execute(
            format!(
                "{name} argument {position} must be a time, got {}",
                type_name(other)
            ),
            None,
        )),
    }
}

fn in_local(time: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let local = time.with_timezone(&Local);
    local.with_timezone(&local.offset().fix())
}

/// Accepts `UTC` (or empty), `Local`, and fixed offsets `+hh`, `+hhmm` or
/// `+hh:mm`.
fn parse_zone(zone: &str) -> Option<ZoneSpec> {
    match zone.trim() {
        "" | "UTC" | "utc" | "Z" => return Some(ZoneSpec::Fixed(Utc.fix())),
        "Local" | "local" => return Some(ZoneSpec::Local),
        _ => {}
    }
    let zone = zone.trim();
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(ZoneSpec::Fixed)
}

enum ZoneSpec {
    Local,
    Fixed(FixedOffset),
}

/// `date LAYOUT TIME` formats in the local zone.
pub fn date(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("date", args, 2)?;
    let layout = expect_string("date", &args[0], 1)?;
    let time = time_arg("date", &args[1], 2)?;
    format_time("date", &layout, &in_local(&time)).map(Value::String)
}

/// `dateInZone LAYOUT TIME ZONE`; an unknown zone is an error.
pub fn date_in_zone(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("dateInZone", args, 3)?;
    let layout = expect_string("dateInZone", &args[0], 1)?;
    let time = time_arg("dateInZone", &args[1], 2)?;
    let zone = expect_string("dateInZone", &args[2], 3)?;
    let zoned = match parse_zone(&zone) {
        Some(ZoneSpec::Local) => in_local(&time),
        Some(ZoneSpec::Fixed(offset)) => time.with_timezone(&offset),
        None => {
            return Err(Error::execute(
                format!("dateInZone: unknown time zone {zone:?}"),
                None,
            ))
        }
    };
    format_time("dateInZone", &layout, &zoned).map(Value::String)
}

pub fn html_date(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("htmlDate", args, 1)?;
    let time = time_arg("htmlDate", &args[0], 1)?;
    format_time("htmlDate", "2006-01-02", &in_local(&time)).map(Value::String)
}

/// `toDate LAYOUT TEXT` parses with a Go layout and returns RFC 3339. Text
/// without a zone is read as local time; a missing clock means midnight.
pub fn to_date(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("toDate", args, 2)?;
    let layout = expect_string("toDate", &args[0], 1)?;
    let text = expect_string("toDate", &args[1], 2)?;
    let items = layout_items(&layout, None);
    let mut parsed = Parsed::new();
    format::parse(&mut parsed, &text, items.iter()).map_err(|err| {
        Error::execute_with_source(
            format!("toDate: cannot parse {text:?} as {layout:?}"),
            err,
        )
    })?;
    let day = parsed.to_naive_date().map_err(|err| {
        Error::execute_with_source(format!("toDate: {text:?} has no complete date"), err)
    })?;
    let naive = day.and_time(parsed.to_naive_time().unwrap_or_default());
    let time = match parsed.to_fixed_offset() {
        Ok(offset) => offset.from_local_datetime(&naive).single(),
        Err(_) => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&local.offset().fix())),
    };
    time.map(|time| rfc3339(&time)).ok_or_else(|| {
        Error::execute(format!("toDate: {text:?} is not a valid local time"), None)
    })
}

pub fn unix_epoch(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("unixEpoch", args, 1)?;
    let time = time_arg("unixEpoch", &args[0], 1)?;
    Ok(Value::from(time.timestamp()))
}

/// `dateModify DURATION TIME` shifts the time by a Go duration such as
/// `-1h30m`. An unparsable duration leaves the time unchanged.
pub fn date_modify(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("dateModify", args, 2)?;
    let modifier = expect_string("dateModify", &args[0], 1)?;
    let time = time_arg("dateModify", &args[1], 2)?;
    let Some(nanos) = parse_duration(&modifier) else {
        return Ok(rfc3339(&time));
    };
    time.checked_add_signed(Duration::nanoseconds(nanos))
        .map(|shifted| rfc3339(&shifted))
        .ok_or_else(|| Error::execute("dateModify: time out of range", None))
}

/// Parses a Go duration string into nanoseconds: an optional sign followed by
/// decimal numbers with units `ns`, `us`, `µs`, `ms`, `s`, `m` or `h`.
fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, mut rest) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }
    let mut total: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." {
            return None;
        }
        let amount: f64 = number.parse().ok()?;
        rest = &rest[number_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        total += amount * scale;
        rest = &rest[unit_len..];
    }
    if total > i64::MAX as f64 {
        return None;
    }
    let nanos = total.round() as i64;
    Some(if negative { -nanos } else { nanos })
}
