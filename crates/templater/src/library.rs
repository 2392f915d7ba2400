// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The function set every template is compiled against: the Go builtins,
//! the sprig helpers and the YAML pair `toYaml` / `fromYaml`.

use serde_json::{Map, Value};
use templater_engine::{
    type_name, Arity, Error, EvalContext, FunctionRegistry, FunctionRegistryBuilder,
};

use crate::values::yaml_to_json;
use crate::yaml;

/// Builds the full registry. Later installs win on name clashes, so the YAML
/// helpers go last.
pub fn function_library() -> FunctionRegistry {
    let mut builder = FunctionRegistryBuilder::new();
    builder.extend(&templater_sprig::sprig_functions());
    install_yaml_functions(&mut builder);
    builder.build()
}

/// Registers `toYaml` and `fromYaml`.
pub fn install_yaml_functions(builder: &mut FunctionRegistryBuilder) {
    builder
        .register_with_arity("toYaml", Arity::Exactly(1), to_yaml)
        .register_with_arity("fromYaml", Arity::Exactly(1), from_yaml);
}

/// Block-style YAML with sorted keys, without the trailing newline.
pub fn to_yaml(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let value = args.first().unwrap_or(&Value::Null);
    let text = yaml::to_string(value);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    Ok(Value::String(text.to_string()))
}

/// Parses a YAML document. Like Helm, a parse failure is reported in-band as
/// `{"Error": message}` instead of failing the render.
pub fn from_yaml(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let text = match args.first() {
        Some(Value::String(text)) => text,
        Some(other) => {
            return Err(Error::execute(
                format!("fromYaml expects a string, got {}", type_name(other)),
                None,
            ))
        }
        None => return Err(Error::execute("fromYaml expects 1 argument", None)),
    };
    let parsed = serde_yaml::from_str::<serde_yaml::Value>(text)
        .map_err(|err| err.to_string())
        .and_then(|yaml| yaml_to_json(yaml).map_err(|err| err.to_string()));
    Ok(match parsed {
        Ok(value) => value,
        Err(message) => {
            let mut map = Map::new();
            map.insert("Error".to_string(), Value::String(message));
            Value::Object(map)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use templater_engine::Template;

    fn render(source: &str, data: &Value) -> String {
        Template::compile("library", source, function_library())
            .unwrap()
            .render(data)
            .unwrap()
    }

    #[test]
    fn library_layers_builtins_sprig_and_yaml() {
        let registry = function_library();
        for name in ["printf", "index", "upper", "semverCompare", "toYaml", "fromYaml"] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert!(!registry.contains("now"));
    }

    #[test]
    fn to_yaml_emits_sorted_block_style() {
        let data = json!({"replicas": 3, "name": "web", "labels": {"tier": "front"}});
        assert_eq!(
            render("{{ toYaml . }}", &data),
            "labels:\n  tier: front\nname: web\nreplicas: 3"
        );
    }

    #[test]
    fn to_yaml_round_trips_through_a_yaml_parser() {
        let data = json!({
            "service": {"ports": [80, 443], "enabled": true, "ratio": 0.25},
            "names": ["a", "true", "1.0", "multi\nline"],
            "switches": {"a": "yes", "b": "on", "c": "no", "d": "off", "e": "y", "f": "~"},
            "modes": ["0755", "1e3", "Null", ""],
            "empty": {}
        });
        let text = render("{{ .service | toYaml }}\n---\n{{ toYaml . }}", &data);
        let whole = text.split("\n---\n").nth(1).unwrap();
        let parsed: Value = serde_yaml::from_str(whole).unwrap();
        assert_eq!(parsed, data);
        assert!(whole.contains("b: \"on\"\n"), "{whole}");
        assert!(whole.contains("a: \"yes\"\n"), "{whole}");
    }

    #[test]
    fn from_yaml_parses_or_reports_in_band() {
        let data = json!({"doc": "name: web\nports: [80]\n", "bad": "a: [1"});
        assert_eq!(
            render("{{ (fromYaml .doc).name }}-{{ index (fromYaml .doc).ports 0 }}", &data),
            "web-80"
        );
        let out = render("{{ (fromYaml .bad).Error }}", &data);
        assert!(!out.is_empty());
    }

    #[test]
    fn from_yaml_rejects_non_strings() {
        let err = Template::compile("library", "{{ fromYaml .n }}", function_library())
            .unwrap()
            .render(&json!({"n": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("fromYaml expects a string, got int"), "{err}");
    }
}
