// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use templater_builtins::{text_template_functions, Template};

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

#[test]
fn test_cases_render_like_go_text_template() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let root = manifest_dir
        .parent()
        .expect("workspace root missing")
        .parent()
        .expect("workspace root missing again");
    let path = root.join("test-cases/templater-builtins.json");
    let bytes = fs::read(&path).expect("test cases file missing");
    let cases: Vec<Fixture> = serde_json::from_slice(&bytes).expect("invalid test cases json");

    for case in cases {
        let functions = text_template_functions();
        let template = Template::compile(&case.name, &case.template, functions)
            .unwrap_or_else(|err| panic!("compile {} failed: {}", case.name, err));

        match case.error {
            Some(expected_error) => match template.render(&case.data) {
                Ok(output) => panic!(
                    "{} expected error '{}' but rendered '{}'",
                    case.name, expected_error, output
                ),
                Err(err) => {
                    let err_text = err.to_string();
                    assert!(
                        err_text.contains(&expected_error),
                        "{} expected error containing '{}', got '{}'",
                        case.name,
                        expected_error,
                        err_text
                    );
                }
            },
            None => {
                let output = template
                    .render(&case.data)
                    .unwrap_or_else(|err| panic!("render {} failed: {}", case.name, err));

                let expected = case.expected.unwrap_or_default();
                assert_eq!(
                    output, expected,
                    "fixture {} rendered incorrectly",
                    case.name
                );
            }
        }
    }
}
