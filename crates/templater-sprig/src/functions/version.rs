// SPDX-License-Identifier: Apache-2.0 OR MIT
use semver::{Comparator, Version, VersionReq};
use serde_json::{Map, Value};
use templater_engine::{Arity, Error, EvalContext, FunctionRegistryBuilder};

use super::{expect_exact_args, expect_string};

pub fn register(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("semver", Arity::Exactly(1), semver)
        .register_with_arity("semverCompare", Arity::Exactly(2), semver_compare);
}

#[derive(Debug, thiserror::Error)]
enum VersionError {
    #[error("invalid semantic version {0:?}")]
    Version(String, #[source] semver::Error),
    #[error("invalid constraint {0:?}")]
    Constraint(String, #[source] semver::Error),
    #[error("invalid constraint {0:?}: range is missing a bound")]
    OpenRange(String),
}

impl VersionError {
    fn into_error(self, name: &str) -> Error {
        Error::execute_with_source(format!("{name}: {self}"), self)
    }
}

/// Parses a version leniently: a leading `v` is dropped and missing minor or
/// patch components are filled with zeros.
fn parse_version(raw: &str) -> Result<Version, VersionError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let split_at = body.find(['-', '+']).unwrap_or(body.len());
    let (core, suffix) = body.split_at(split_at);
    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    let normalized = format!("{}{suffix}", parts.join("."));
    Version::parse(&normalized).map_err(|err| VersionError::Version(raw.to_string(), err))
}

pub fn semver(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("semver", args, 1)?;
    let raw = expect_string("semver", &args[0], 1)?;
    let version = parse_version(&raw).map_err(|err| err.into_error("semver"))?;
    let mut map = Map::new();
    map.insert("Major".into(), Value::from(version.major));
    map.insert("Minor".into(), Value::from(version.minor));
    map.insert("Patch".into(), Value::from(version.patch));
    map.insert("Prerelease".into(), Value::String(version.pre.to_string()));
    map.insert("Metadata".into(), Value::String(version.build.to_string()));
    map.insert("Original".into(), Value::String(raw));
    Ok(Value::Object(map))
}

/// A single comparison. `!=` has no counterpart in `semver::Op`.
#[derive(Debug)]
enum Term {
    Matches(Comparator),
    NotEqual(Version),
}

impl Term {
    fn matches(&self, version: &Version) -> bool {
        match self {
            Term::Matches(comparator) => comparator.matches(version),
            Term::NotEqual(excluded) => version != excluded,
        }
    }
}

/// Conjunction of terms; every term must match.
#[derive(Debug)]
struct Conjunction {
    terms: Vec<Term>,
}

impl Conjunction {
    fn matches(&self, version: &Version) -> bool {
        if !self.terms.iter().all(|term| term.matches(version)) {
            return false;
        }
        // Pre-release versions only satisfy ranges that opt in on the same
        // major.minor.patch.
        let comparators: Vec<Comparator> = self
            .terms
            .iter()
            .filter_map(|term| match term {
                Term::Matches(comparator) => Some(comparator.clone()),
                Term::NotEqual(_) => None,
            })
            .collect();
        version.pre.is_empty()
            || comparators.is_empty()
            || VersionReq { comparators }.matches(version)
    }
}

const OPERATORS: [&str; 11] = [">=", "=>", "<=", "=<", "!=", "~>", ">", "<", "=", "^", "~"];

fn split_operator(token: &str) -> (&str, &str) {
    for op in OPERATORS {
        if let Some(rest) = token.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", token)
}

fn parse_term(token: &str) -> Result<Option<Term>, VersionError> {
    let (op, rest) = split_operator(token);
    let version = rest
        .strip_prefix('v')
        .or_else(|| rest.strip_prefix('V'))
        .unwrap_or(rest);
    if matches!(version, "*" | "x" | "X") && matches!(op, "" | "=") {
        return Ok(None);
    }
    if op == "!=" {
        return parse_version(version).map(|v| Some(Term::NotEqual(v)));
    }
    let op = match op {
        "" => {
            if version
                .split('.')
                .any(|part| matches!(part, "*" | "x" | "X"))
            {
                ""
            } else {
                "="
            }
        }
        "=>" => ">=",
        "=<" => "<=",
        "~>" => "~",
        other => other,
    };
    let text = format!("{op}{version}");
    Comparator::parse(&text)
        .map(|comparator| Some(Term::Matches(comparator)))
        .map_err(|err| VersionError::Constraint(token.to_string(), err))
}

fn parse_conjunction(raw: &str) -> Result<Conjunction, VersionError> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for piece in raw.split(|c: char| c.is_whitespace() || c == ',') {
        if piece.is_empty() {
            continue;
        }
        if let Some(op) = pending_op.take() {
            tokens.push(format!("{op}{piece}"));
        } else if piece != "-" && OPERATORS.contains(&piece) {
            pending_op = Some(piece.to_string());
        } else {
            tokens.push(piece.to_string());
        }
    }
    if let Some(op) = pending_op {
        return Err(VersionError::OpenRange(op));
    }

    let mut terms = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        if tokens.get(idx + 1).map(String::as_str) == Some("-") {
            let upper = tokens
                .get(idx + 2)
                .ok_or_else(|| VersionError::OpenRange(raw.to_string()))?;
            terms.extend(parse_term(&format!(">={}", tokens[idx]))?);
            terms.extend(parse_term(&format!("<={upper}"))?);
            idx += 3;
            continue;
        }
        terms.extend(parse_term(&tokens[idx])?);
        idx += 1;
    }
    Ok(Conjunction { terms })
}

/// `semverCompare CONSTRAINT VERSION` reports whether the version satisfies
/// any of the `||`-separated alternatives.
pub fn semver_compare(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    expect_exact_args("semverCompare", args, 2)?;
    let constraint = expect_string("semverCompare", &args[0], 1)?;
    let raw_version = expect_string("semverCompare", &args[1], 2)?;
    let alternatives = constraint
        .split("||")
        .map(parse_conjunction)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.into_error("semverCompare"))?;
    let version = parse_version(&raw_version).map_err(|err| err.into_error("semverCompare"))?;
    Ok(Value::Bool(
        alternatives.iter().any(|alt| alt.matches(&version)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        super::super::empty_context()
    }

    fn compare(constraint: &str, version: &str) -> bool {
        let mut ctx = ctx();
        semver_compare(&mut ctx, &[json!(constraint), json!(version)])
            .unwrap()
            .as_bool()
            .unwrap()
    }

    #[test]
    fn semver_exposes_components() {
        let mut ctx = ctx();
        let out = semver(&mut ctx, &[json!("v1.2.3-beta.1+build.5")]).unwrap();
        assert_eq!(
            out,
            json!({
                "Major": 1,
                "Minor": 2,
                "Patch": 3,
                "Prerelease": "beta.1",
                "Metadata": "build.5",
                "Original": "v1.2.3-beta.1+build.5"
            })
        );
        let out = semver(&mut ctx, &[json!("1.4")]).unwrap();
        assert_eq!(out["Patch"], json!(0));
    }

    #[test]
    fn semver_rejects_garbage() {
        let mut ctx = ctx();
        let err = semver(&mut ctx, &[json!("one.two")]).unwrap_err();
        assert!(
            err.message().starts_with("semver: invalid semantic version"),
            "{err}"
        );
    }

    #[test]
    fn compare_supports_common_operators() {
        assert!(compare("^1.2.0", "1.9.0"));
        assert!(!compare("^1.2.0", "2.0.0"));
        assert!(compare(">=1.2.3 <2.0.0", "1.5.0"));
        assert!(compare(">=1.2.3, <2.0.0", "1.5.0"));
        assert!(compare(">= 1.2.3", "1.2.3"));
        assert!(!compare("~1.2", "1.3.0"));
        assert!(compare("~> 1.2", "1.2.9"));
        assert!(compare("v1.2.3", "1.2.3"));
        assert!(compare("!=1.2.3", "1.2.4"));
        assert!(!compare("!=1.2.3", "v1.2.3"));
    }

    #[test]
    fn compare_handles_alternatives_and_ranges() {
        assert!(compare("<1.0 || >=2.0", "2.1.0"));
        assert!(!compare("<1.0 || >=2.0", "1.5.0"));
        assert!(compare("1.1 - 1.3", "1.2.0"));
        assert!(!compare("1.1 - 1.3", "1.4.0"));
    }

    #[test]
    fn invalid_constraint_is_an_error() {
        let mut ctx = ctx();
        let err = semver_compare(&mut ctx, &[json!(">=abc"), json!("1.0.0")]).unwrap_err();
        assert!(
            err.message().starts_with("semverCompare: invalid constraint"),
            "{err}"
        );
    }
}
