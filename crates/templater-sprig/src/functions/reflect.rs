// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::Value;
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_string, type_name};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("typeOf", Arity::Exactly(1), type_of)
        .register_with_arity("kindOf", Arity::Exactly(1), kind_of)
        .register_with_arity("typeIs", Arity::Exactly(2), type_is)
        .register_with_arity("kindIs", Arity::Exactly(2), kind_is);
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "invalid",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() => "int",
        Value::Number(n) if n.is_u64() => "uint64",
        Value::Number(_) => "float64",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

pub fn type_of(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("typeOf", args, 1)?;
    Ok(Value::String(type_name(&args[0]).to_string()))
}

pub fn kind_of(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("kindOf", args, 1)?;
    Ok(Value::String(kind_name(&args[0]).to_string()))
}

/// `typeIs TYPE VALUE`
pub fn type_is(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("typeIs", args, 2)?;
    let expected = expect_string("typeIs", &args[0], 1)?;
    Ok(Value::Bool(type_name(&args[1]) == expected))
}

/// `kindIs KIND VALUE`
pub fn kind_is(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("kindIs", args, 2)?;
    let expected = expect_string("kindIs", &args[0], 1)?;
    Ok(Value::Bool(kind_name(&args[1]) == expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    #[test]
    fn reports_go_type_and_kind_names() {
        let mut ctx = ctx();
        assert_eq!(type_of(&mut ctx, &[json!([1])]).unwrap(), json!("[]interface {}"));
        assert_eq!(type_of(&mut ctx, &[json!(1.5)]).unwrap(), json!("float64"));
        assert_eq!(kind_of(&mut ctx, &[json!({"a": 1})]).unwrap(), json!("map"));
        assert_eq!(kind_of(&mut ctx, &[Value::Null]).unwrap(), json!("invalid"));
    }

    #[test]
    fn predicates_compare_names() {
        let mut ctx = ctx();
        assert_eq!(kind_is(&mut ctx, &[json!("int"), json!(3)]).unwrap(), json!(true));
        assert_eq!(kind_is(&mut ctx, &[json!("slice"), json!("x")]).unwrap(), json!(false));
        assert_eq!(type_is(&mut ctx, &[json!("string"), json!("x")]).unwrap(), json!(true));
    }
}
