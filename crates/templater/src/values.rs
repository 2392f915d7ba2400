// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Value files and the merged mapping templates execute against.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use serde_yaml::Value as Yaml;
use templater_sprig::deep_merge;
use tracing::debug;

use crate::error::{Error, ParseError, Result};

/// The merged value mapping. The root is always a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Values {
    root: Value,
}

impl Default for Values {
    fn default() -> Self {
        Self::empty()
    }
}

impl Values {
    /// An empty mapping.
    pub fn empty() -> Self {
        Self::from_map(Map::new())
    }

    /// Wraps an already merged mapping.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(map),
        }
    }

    /// Reads every source in order and merges it over the ones before.
    ///
    /// Nested mappings are merged key by key, anything else in a later
    /// source replaces the earlier value, `null` included.
    pub fn load(sources: &[PathBuf]) -> Result<Self> {
        let mut values = Self::empty();
        for path in sources {
            let map = read_mapping(path)?;
            debug!(path = %path.display(), keys = map.len(), "loaded values");
            values.overlay(map);
        }
        Ok(values)
    }

    /// Merges `map` over the current values; `map` wins on conflicts.
    pub fn overlay(&mut self, map: Map<String, Value>) {
        if let Value::Object(base) = &mut self.root {
            deep_merge(base, map);
        }
    }

    /// The mapping as a template data value.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Consumes the values, returning the mapping.
    pub fn into_value(self) -> Value {
        self.root
    }
}

fn read_mapping(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
    parse_mapping(&text).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses one YAML document whose top level must be a mapping. An empty
/// document is an empty mapping.
pub(crate) fn parse_mapping(text: &str) -> std::result::Result<Map<String, Value>, ParseError> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    let document: Yaml = serde_yaml::from_str(text)?;
    match yaml_to_json(document)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAMapping {
            found: kind(&other),
        }),
    }
}

/// Converts a YAML tree into the JSON value model. Tags are dropped,
/// scalar keys are stringified.
pub(crate) fn yaml_to_json(value: Yaml) -> std::result::Result<Value, ParseError> {
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => yaml_number(&n),
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(mapping_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::from(i)
    } else if let Some(u) = n.as_u64() {
        Value::from(u)
    } else {
        // JSON has no NaN or infinity, keep their YAML spelling.
        n.as_f64()
            .and_then(Number::from_f64)
            .map_or_else(|| Value::String(n.to_string()), Value::Number)
    }
}

fn mapping_key(key: Yaml) -> std::result::Result<String, ParseError> {
    match key {
        Yaml::Null => Ok("null".to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::String(s) => Ok(s),
        Yaml::Tagged(tagged) => mapping_key(tagged.value),
        Yaml::Sequence(_) => Err(ParseError::NonScalarKey { found: "sequence" }),
        Yaml::Mapping(_) => Err(ParseError::NonScalarKey { found: "mapping" }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn no_sources_is_an_empty_mapping() {
        let values = Values::load(&[]).unwrap();
        assert_eq!(values.as_value(), &json!({}));
    }

    #[test]
    fn later_sources_deep_merge_over_earlier_ones() {
        let dir = TempDir::new().unwrap();
        let base = write(
            &dir,
            "base.yaml",
            "image:\n  repo: nginx\n  tag: '1.0'\nports: [80, 443]\nreplicas: 2\n",
        );
        let prod = write(
            &dir,
            "prod.yaml",
            "image:\n  tag: '2.0'\nports: [8080]\nreplicas: ~\n",
        );
        let values = Values::load(&[base, prod]).unwrap();
        assert_eq!(
            values.into_value(),
            json!({
                "image": {"repo": "nginx", "tag": "2.0"},
                "ports": [8080],
                "replicas": null
            })
        );
    }

    #[test]
    fn loading_then_overlaying_matches_loading_everything() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.yaml", "x: {a: 1, b: {c: 1}}\nlist: [1]\n");
        let b = write(&dir, "b.yaml", "x: {b: {d: 2}}\n");
        let c = write(&dir, "c.yaml", "x: {b: {c: 3}}\nlist: [2, 3]\n");

        let mut stepwise = Values::load(&[a.clone(), b.clone()]).unwrap();
        stepwise.overlay(read_mapping(&c).unwrap());
        let at_once = Values::load(&[a, b, c]).unwrap();
        assert_eq!(stepwise, at_once);
        assert_eq!(
            at_once.as_value(),
            &json!({"x": {"a": 1, "b": {"c": 3, "d": 2}}, "list": [2, 3]})
        );
    }

    #[test]
    fn empty_and_json_documents_are_accepted() {
        assert!(parse_mapping("").unwrap().is_empty());
        assert!(parse_mapping("  \n").unwrap().is_empty());
        assert!(parse_mapping("~").unwrap().is_empty());
        let map = parse_mapping(r#"{"name": "web", "count": 3}"#).unwrap();
        assert_eq!(Value::Object(map), json!({"name": "web", "count": 3}));
    }

    #[test]
    fn scalar_keys_are_stringified_and_tags_dropped() {
        let map = parse_mapping("1: one\ntrue: yes\nport: !port 80\nweight: !custom 1.5\n").unwrap();
        assert_eq!(
            Value::Object(map),
            json!({"1": "one", "true": "yes", "port": 80, "weight": 1.5})
        );
    }

    #[test]
    fn rejects_non_mapping_documents_and_complex_keys() {
        let err = parse_mapping("- a\n- b\n").unwrap_err();
        assert!(matches!(err, ParseError::NotAMapping { found: "sequence" }));
        let err = parse_mapping("? [a, b]\n: value\n").unwrap_err();
        assert!(matches!(err, ParseError::NonScalarKey { found: "sequence" }));
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.yaml", "name: [unterminated\n");
        let err = Values::load(&[bad.clone()]).unwrap_err();
        match err {
            Error::Parse { path, source } => {
                assert_eq!(path, bad);
                assert!(matches!(source, ParseError::Yaml(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.yaml");
        let err = Values::load(&[missing.clone()]).unwrap_err();
        assert!(matches!(err, Error::NotFound { path } if path == missing));
    }
}
