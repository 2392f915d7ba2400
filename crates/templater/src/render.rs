// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The rendering pipeline: load values, build the function library, resolve
//! targets, then compile and execute each template in turn.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use templater_engine::{FunctionRegistry, MissingKey, Template};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::library::function_library;
use crate::targets::{resolve_targets, Destination, Input, RenderTarget, Source, STDIN_NAME};
use crate::values::Values;

/// Everything one rendering run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Template file, template directory or stdin.
    pub input: Input,
    /// Value files, merged in order.
    pub values: Vec<PathBuf>,
    /// Output file, or output root for a directory input.
    pub output: Option<PathBuf>,
    /// Treat a missing map key as an error instead of an empty value.
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Number of templates rendered.
    pub rendered: usize,
}

/// Runs the pipeline. `stdin` is only read when the input is standard input;
/// `stdout` receives every target without a file destination, back to back.
///
/// Values are loaded and the function library is built before any template
/// is touched. Targets render in order and the first failure stops the run.
/// A destination file is only created once its template has compiled.
pub fn run<R: Read, W: Write>(
    options: &RenderOptions,
    mut stdin: R,
    mut stdout: W,
) -> Result<RenderSummary> {
    let values = Values::load(&options.values)?;
    let functions = function_library();
    debug!(functions = functions.len(), "built function library");
    let missing_key = if options.strict {
        MissingKey::Error
    } else {
        MissingKey::Zero
    };

    let targets = resolve_targets(&options.input, options.output.as_deref())?;
    let mut summary = RenderSummary::default();
    for target in &targets {
        let text = read_source(&target.source, &mut stdin)?;
        let template = compile(target, &text, &functions)?.with_missing_key(missing_key);
        render_target(target, &template, &values, &mut stdout)?;
        info!(source = %target.source, destination = %target.destination, "rendered template");
        summary.rendered += 1;
    }
    Ok(summary)
}

fn read_source<R: Read>(source: &Source, stdin: &mut R) -> Result<String> {
    match source {
        Source::Stdin => {
            let mut text = String::new();
            stdin
                .read_to_string(&mut text)
                .map_err(|err| Error::io(STDIN_NAME, err))?;
            Ok(text)
        }
        Source::File(path) => fs::read_to_string(path).map_err(|err| Error::io(path, err)),
    }
}

fn compile(target: &RenderTarget, text: &str, functions: &FunctionRegistry) -> Result<Template> {
    Template::compile(&target.source.template_name(), text, functions.clone()).map_err(|source| {
        Error::Compile {
            template: target.source.to_string(),
            source,
        }
    })
}

fn render_target<W: Write>(
    target: &RenderTarget,
    template: &Template,
    values: &Values,
    stdout: &mut W,
) -> Result<()> {
    match &target.destination {
        Destination::Stdout => {
            execute(target, template, values, stdout, Path::new("<stdout>"))?;
            stdout
                .flush()
                .map_err(|err| Error::io("<stdout>", err))
        }
        Destination::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
            }
            let file = File::create(path).map_err(|err| Error::io(path, err))?;
            let mut writer = BufWriter::new(file);
            execute(target, template, values, &mut writer, path)?;
            writer.flush().map_err(|err| Error::io(path, err))
        }
    }
}

fn execute<W: Write>(
    target: &RenderTarget,
    template: &Template,
    values: &Values,
    sink: &mut W,
    sink_path: &Path,
) -> Result<()> {
    template
        .execute(values.as_value(), sink)
        .map_err(|err| match err {
            templater_engine::Error::Write { source, .. } => Error::Io {
                path: sink_path.to_path_buf(),
                source,
            },
            source => Error::Execute {
                template: target.source.to_string(),
                source,
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    fn options(input: Input) -> RenderOptions {
        RenderOptions {
            input,
            values: Vec::new(),
            output: None,
            strict: false,
        }
    }

    #[test]
    fn stdin_template_renders_to_stdout() {
        let mut out = Vec::new();
        let summary = run(
            &options(Input::Stdin),
            io::Cursor::new("{{ \"hi\" | upper }} {{ .missing }}."),
            &mut out,
        )
        .unwrap();
        assert_eq!(summary.rendered, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "HI .");
    }

    #[test]
    fn strict_mode_rejects_missing_keys() {
        let mut opts = options(Input::Stdin);
        opts.strict = true;
        let err = run(&opts, io::Cursor::new("{{ .missing }}"), io::sink()).unwrap_err();
        assert!(matches!(err, Error::Execute { ref template, .. } if template == "<stdin>"));
    }

    #[test]
    fn compile_errors_name_the_template() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.tpl");
        fs::write(&input, "{{ if }}").unwrap();
        let err = run(&options(Input::Path(input.clone())), io::empty(), io::sink()).unwrap_err();
        match err {
            Error::Compile { template, source } => {
                assert_eq!(template, input.display().to_string());
                assert!(source.to_string().starts_with("template: broken.tpl:1:"), "{source}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn output_parent_directories_are_created() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.tpl");
        fs::write(&input, "ok").unwrap();
        let mut opts = options(Input::Path(input));
        let output = dir.path().join("deep/er/out.txt");
        opts.output = Some(output.clone());
        run(&opts, io::empty(), io::sink()).unwrap();
        // Rendering again over existing directories succeeds too.
        run(&opts, io::empty(), io::sink()).unwrap();
        assert_eq!(fs::read_to_string(output).unwrap(), "ok");
    }
}
