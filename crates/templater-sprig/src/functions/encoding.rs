// SPDX-License-Identifier: Apache-2.0 OR MIT
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha256};
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_string};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("b64enc", Arity::Exactly(1), b64enc)
        .register_with_arity("b64dec", Arity::Exactly(1), b64dec)
        .register_with_arity("sha256sum", Arity::Exactly(1), sha256sum);
}

pub fn b64enc(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("b64enc", args, 1)?;
    let input = expect_string("b64enc", &args[0], 1)?;
    Ok(Value::String(STANDARD.encode(input.as_bytes())))
}

/// Decodes standard base64; invalid input or non-UTF-8 output is an error.
pub fn b64dec(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("b64dec", args, 1)?;
    let input = expect_string("b64dec", &args[0], 1)?;
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|err| Error::execute_with_source(format!("b64dec failed: {err}"), err))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|err| Error::execute_with_source(format!("b64dec failed: {err}"), err))
}

pub fn sha256sum(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("sha256sum", args, 1)?;
    let input = expect_string("sha256sum", &args[0], 1)?;
    let digest = Sha256::digest(input.as_bytes());
    Ok(Value::String(hex::encode(digest)))
}
