// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use templater_engine::Template;
use templater_sprig::sprig_functions;

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    template: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn load_fixtures() -> Vec<Fixture> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test-cases/templater-sprig.json");
    let bytes = fs::read(&path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
    serde_json::from_slice(&bytes).expect("invalid test cases json")
}

#[test]
fn sprig_fixtures_render_as_expected() {
    for case in load_fixtures() {
        let template = Template::compile(&case.name, &case.template, sprig_functions())
            .unwrap_or_else(|err| panic!("compile {} failed: {}", case.name, err));
        let result = template.render(&case.data);

        match (case.error, result) {
            (Some(expected), Err(err)) => {
                let text = err.to_string();
                assert!(
                    text.contains(&expected),
                    "{} expected error containing '{}', got '{}'",
                    case.name,
                    expected,
                    text
                );
            }
            (Some(expected), Ok(output)) => panic!(
                "{} expected error '{}' but rendered '{}'",
                case.name, expected, output
            ),
            (None, Ok(output)) => assert_eq!(
                output,
                case.expected.unwrap_or_default(),
                "fixture {} rendered incorrectly",
                case.name
            ),
            (None, Err(err)) => panic!("render {} failed: {}", case.name, err),
        }
    }
}

#[test]
fn function_errors_carry_template_location() {
    let template = Template::compile("loc", "line one\n{{ div 1 0 }}", sprig_functions()).unwrap();
    let err = template.render(&Value::Null).unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("template: loc:2:"), "{text}");
    assert!(text.contains("error calling div: division by zero"), "{text}");
}

#[test]
fn arity_mismatch_is_a_compile_error() {
    let err = Template::compile("arity", "{{ upper \"a\" \"b\" }}", sprig_functions()).unwrap_err();
    assert!(err.to_string().contains("upper"), "{err}");
}
