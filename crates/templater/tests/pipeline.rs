// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use templater::render::run;
use templater::{Error, Input, ParseError, RenderOptions};

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn options(input: Input, values: Vec<PathBuf>, output: Option<PathBuf>) -> RenderOptions {
    RenderOptions {
        input,
        values,
        output,
        strict: false,
    }
}

fn render_stdout(options: &RenderOptions, stdin: &str) -> String {
    let mut out = Vec::new();
    run(options, io::Cursor::new(stdin), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn directory_is_mirrored_under_the_output_root() {
    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("templates");
    write(&templates, "a/one.tpl", "name={{ .name }}");
    write(&templates, "b/two.tpl", "{{ .count }}");
    let values = write(dir.path(), "values.yaml", "name: foo\ncount: 3\n");
    let out = dir.path().join("out");

    let summary = run(
        &options(Input::Path(templates), vec![values], Some(out.clone())),
        io::empty(),
        io::sink(),
    )
    .unwrap();

    assert_eq!(summary.rendered, 2);
    assert_eq!(fs::read_to_string(out.join("a/one.tpl")).unwrap(), "name=foo");
    assert_eq!(fs::read_to_string(out.join("b/two.tpl")).unwrap(), "3");
}

#[test]
fn directory_without_output_concatenates_in_name_order() {
    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("templates");
    write(&templates, "z.tpl", "[z]");
    write(&templates, "a/second.tpl", "[a/second]");
    write(&templates, "a/first.tpl", "[a/first {{ .n }}]");
    let values = write(dir.path(), "values.yaml", "n: 1\n");

    let output = render_stdout(&options(Input::Path(templates), vec![values], None), "");
    assert_eq!(output, "[a/first 1][a/second][z]");
}

#[test]
fn stdin_renders_to_stdout_and_ignores_output_path() {
    let dir = TempDir::new().unwrap();
    let values = write(dir.path(), "values.yaml", "x: hi\n");
    let ignored = dir.path().join("ignored.txt");

    let output = render_stdout(
        &options(Input::Stdin, vec![values], Some(ignored.clone())),
        "{{ .x | upper }}",
    );
    assert_eq!(output, "HI");
    assert!(!ignored.exists());
}

#[test]
fn invalid_values_file_fails_before_rendering() {
    let dir = TempDir::new().unwrap();
    let template = write(dir.path(), "t.tpl", "hello");
    let good = write(dir.path(), "good.yaml", "a: 1\n");
    let bad = write(dir.path(), "bad.yaml", "a: [1, 2\nb: }\n");
    let out = dir.path().join("out.txt");

    let err = run(
        &options(Input::Path(template), vec![good, bad.clone()], Some(out.clone())),
        io::empty(),
        io::sink(),
    )
    .unwrap_err();

    match err {
        Error::Parse { path, source } => {
            assert_eq!(path, bad);
            assert!(matches!(source, ParseError::Yaml(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!out.exists());
}

#[test]
fn unknown_function_creates_no_output_file() {
    let dir = TempDir::new().unwrap();
    let template = write(dir.path(), "t.tpl", "{{ frobnicate .x }}");
    let out = dir.path().join("out/t.txt");

    let err = run(
        &options(Input::Path(template), Vec::new(), Some(out.clone())),
        io::empty(),
        io::sink(),
    )
    .unwrap_err();

    match err {
        Error::Compile { source, .. } => {
            assert!(
                source.to_string().contains("function \"frobnicate\" not defined"),
                "{source}"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!out.exists());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn first_failure_stops_the_remaining_targets() {
    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("templates");
    write(&templates, "1-ok.tpl", "ok");
    write(&templates, "2-bad.tpl", "{{ div 1 0 }}");
    write(&templates, "3-never.tpl", "never");
    let out = dir.path().join("out");

    let err = run(
        &options(Input::Path(templates), Vec::new(), Some(out.clone())),
        io::empty(),
        io::sink(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Execute { .. }), "{err:?}");
    assert_eq!(fs::read_to_string(out.join("1-ok.tpl")).unwrap(), "ok");
    assert!(!out.join("3-never.tpl").exists());
}

#[test]
fn directive_free_templates_pass_through_unchanged() {
    let dir = TempDir::new().unwrap();
    let text = "apiVersion: v1\nkind: ConfigMap\n  indented: \"quoted\" $dollar {single}\n\n";
    let template = write(dir.path(), "plain.yaml", text);
    let out = dir.path().join("plain.out");

    run(
        &options(Input::Path(template), Vec::new(), Some(out.clone())),
        io::empty(),
        io::sink(),
    )
    .unwrap();
    assert_eq!(fs::read(out).unwrap(), text.as_bytes());
}

#[test]
fn to_yaml_output_parses_back_to_the_values() {
    let dir = TempDir::new().unwrap();
    let values = write(
        dir.path(),
        "values.yaml",
        "service:\n  name: web\n  ports: [80, 443]\n  tls: false\n  weight: 0.5\n  tags: [a, 'yes']\n",
    );

    let output = render_stdout(
        &options(Input::Stdin, vec![values.clone()], None),
        "{{ toYaml .service }}",
    );
    let parsed: Value = serde_yaml::from_str(&output).unwrap();
    let loaded = templater::Values::load(&[values]).unwrap();
    assert_eq!(&parsed, &loaded.as_value()["service"]);
}

#[test]
fn value_overlays_merge_deeply_in_order() {
    let dir = TempDir::new().unwrap();
    let base = write(dir.path(), "base.yaml", "image: {repo: nginx, tag: '1'}\nreplicas: 1\n");
    let prod = write(dir.path(), "prod.yaml", "image: {tag: '2'}\n");
    let output = render_stdout(
        &options(Input::Stdin, vec![base, prod], None),
        "{{ .image.repo }}:{{ .image.tag }} x{{ .replicas }}",
    );
    assert_eq!(output, "nginx:2 x1");
}

#[cfg(unix)]
#[test]
fn self_referential_symlink_does_not_hang_traversal() {
    use std::os::unix::fs::symlink;

    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("templates");
    write(&templates, "only.tpl", "done");
    symlink(&templates, templates.join("again")).unwrap();
    symlink(templates.join("self"), templates.join("self")).unwrap();

    let output = render_stdout(&options(Input::Path(templates), Vec::new(), None), "");
    assert_eq!(output, "done");
}

#[cfg(unix)]
#[test]
fn unreadable_directory_aborts_before_anything_is_written() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("templates");
    write(&templates, "a.tpl", "first");
    write(&templates, "locked/b.tpl", "second");
    let locked = templates.join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Privileged users read through permission bits.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }
    let out = dir.path().join("out");

    let result = run(
        &options(Input::Path(templates), Vec::new(), Some(out.clone())),
        io::empty(),
        io::sink(),
    );
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    match result.unwrap_err() {
        Error::Io { path, .. } => assert_eq!(path, locked),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!out.exists());
}
