// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::Value;
use templater_engine::{coerce_number, Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_int, expect_min_args, to_int};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("add", Arity::AtLeast(1), add)
        .register_with_arity("add1", Arity::Exactly(1), add1)
        .register_with_arity("sub", Arity::Exactly(2), sub)
        .register_with_arity("mul", Arity::AtLeast(1), mul)
        .register_with_arity("div", Arity::Exactly(2), div)
        .register_with_arity("mod", Arity::Exactly(2), modulo)
        .register_with_arity("max", Arity::AtLeast(1), max)
        .register_with_arity("min", Arity::AtLeast(1), min)
        .register_with_arity("floor", Arity::Exactly(1), floor)
        .register_with_arity("ceil", Arity::Exactly(1), ceil)
        .register_with_arity("round", Arity::Between(2, 3), round)
        .register_with_arity("int", Arity::Exactly(1), int)
        .register_with_arity("int64", Arity::Exactly(1), int)
        .register_with_arity("float64", Arity::Exactly(1), float64)
        .register_with_arity("atoi", Arity::Exactly(1), atoi);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Num::Int(i)),
                None => coerce_number(value).map(Num::Float),
            },
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Num::Int(i)),
                Err(_) => coerce_number(value).map(Num::Float),
            },
            Value::Bool(b) => Ok(Num::Int(i64::from(*b))),
            Value::Null => Ok(Num::Int(0)),
            other => coerce_number(other).map(Num::Float),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => Value::from(f),
        }
    }
}

/// Folds the arguments with an integer operation while every operand is an
/// integer, switching to floating point for good once a float appears.
fn fold(
    args: &[Value],
    int_op: fn(i64, i64) -> Result<i64, Error>,
    float_op: fn(f64, f64) -> Result<f64, Error>,
) -> Result<Value, Error> {
    let mut acc = Num::from_value(&args[0])?;
    for value in &args[1..] {
        let next = Num::from_value(value)?;
        acc = match (acc, next) {
            (Num::Int(a), Num::Int(b)) => Num::Int(int_op(a, b)?),
            (a, b) => Num::Float(float_op(a.as_f64(), b.as_f64())?),
        };
    }
    Ok(acc.into_value())
}

fn division_by_zero() -> Error {
    Error::execute("division by zero", None)
}

pub fn add(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("add", args, 1)?;
    fold(args, |a, b| Ok(a.wrapping_add(b)), |a, b| Ok(a + b))
}

pub fn add1(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("add1", args, 1)?;
    fold(&[args[0].clone(), Value::from(1)], |a, b| Ok(a.wrapping_add(b)), |a, b| Ok(a + b))
}

pub fn sub(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("sub", args, 2)?;
    fold(args, |a, b| Ok(a.wrapping_sub(b)), |a, b| Ok(a - b))
}

pub fn mul(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("mul", args, 1)?;
    fold(args, |a, b| Ok(a.wrapping_mul(b)), |a, b| Ok(a * b))
}

pub fn div(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("div", args, 2)?;
    fold(
        args,
        |a, b| if b == 0 { Err(division_by_zero()) } else { Ok(a.wrapping_div(b)) },
        |a, b| if b == 0.0 { Err(division_by_zero()) } else { Ok(a / b) },
    )
}

pub fn modulo(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("mod", args, 2)?;
    fold(
        args,
        |a, b| if b == 0 { Err(division_by_zero()) } else { Ok(a.wrapping_rem(b)) },
        |a, b| if b == 0.0 { Err(division_by_zero()) } else { Ok(a % b) },
    )
}

pub fn max(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("max", args, 1)?;
    fold(args, |a, b| Ok(a.max(b)), |a, b| Ok(a.max(b)))
}

pub fn min(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("min", args, 1)?;
    fold(args, |a, b| Ok(a.min(b)), |a, b| Ok(a.min(b)))
}

pub fn floor(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("floor", args, 1)?;
    Ok(Value::from(Num::from_value(&args[0])?.as_f64().floor()))
}

pub fn ceil(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("ceil", args, 1)?;
    Ok(Value::from(Num::from_value(&args[0])?.as_f64().ceil()))
}

/// `round VALUE PLACES [ROUND_ON]` rounds up once the fractional part of the
/// scaled value reaches `ROUND_ON` (0.5 by default).
pub fn round(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_min_args("round", args, 2)?;
    let value = Num::from_value(&args[0])?.as_f64();
    let places = expect_int("round", &args[1], 2)?;
    let round_on = match args.get(2) {
        Some(value) => Num::from_value(value)?.as_f64(),
        None => 0.5,
    };
    let pow = 10f64.powi(i32::try_from(places).unwrap_or(i32::MAX));
    let digit = pow * value;
    let rounded = if digit.fract() >= round_on {
        digit.ceil()
    } else {
        digit.floor()
    };
    Ok(Value::from(rounded / pow))
}

/// Lenient integer conversion: floats truncate, booleans count as 0 or 1,
/// anything unparsable is 0.
fn lenient_int(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => to_int(value)
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64))
            .unwrap_or(0),
        Value::Number(n) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().map_or(0, |f| f as i64)),
        _ => 0,
    }
}

pub fn int(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("int", args, 1)?;
    Ok(Value::from(lenient_int(&args[0])))
}

pub fn float64(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("float64", args, 1)?;
    let value = match &args[0] {
        Value::Array(_) | Value::Object(_) => 0.0,
        other => coerce_number(other).unwrap_or(0.0),
    };
    Ok(Value::from(value))
}

/// `atoi` parses a base-10 integer string, yielding 0 on failure.
pub fn atoi(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("atoi", args, 1)?;
    let text = super::value_to_string(&args[0]);
    Ok(Value::from(text.trim().parse::<i64>().unwrap_or(0)))
}
