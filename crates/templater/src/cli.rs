// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Command-line arguments of the `templater` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::render::RenderOptions;
use crate::targets::Input;

/// Render Go templates against YAML values.
#[derive(Debug, Parser)]
#[command(name = "templater", author, about, long_about = None)]
pub struct Args {
    /// Template file, template directory, or `-` for stdin.
    #[arg(short, long, value_name = "PATH|-", required_unless_present = "version")]
    pub input: Option<String>,

    /// Values file; repeat to overlay several, later files win.
    #[arg(short = 'f', long = "values", value_name = "FILE")]
    pub values: Vec<PathBuf>,

    /// Output file, or output directory when the input is a directory.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Fail on missing map keys instead of rendering them empty.
    #[arg(long)]
    pub strict: bool,

    /// Print the version and exit.
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Log level for diagnostics on stderr; `RUST_LOG` takes precedence.
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// The pipeline options, or `None` for a version query.
    pub fn render_options(&self) -> Option<RenderOptions> {
        if self.version {
            return None;
        }
        let input = self.input.as_deref()?;
        Some(RenderOptions {
            input: Input::from_arg(input),
            values: self.values.clone(),
            output: self.output.clone(),
            strict: self.strict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn values_keep_their_order() {
        let args = Args::parse_from([
            "templater", "-i", "charts/", "-f", "base.yaml", "--values", "prod.yaml", "-o", "out/",
            "--strict",
        ]);
        let options = args.render_options().unwrap();
        assert_eq!(options.input, Input::Path(PathBuf::from("charts/")));
        assert_eq!(
            options.values,
            vec![PathBuf::from("base.yaml"), PathBuf::from("prod.yaml")]
        );
        assert_eq!(options.output, Some(PathBuf::from("out/")));
        assert!(options.strict);
        assert_eq!(args.log_level, "warn");
    }

    #[test]
    fn dash_selects_stdin() {
        let args = Args::parse_from(["templater", "--input", "-"]);
        assert_eq!(args.render_options().unwrap().input, Input::Stdin);
    }

    #[test]
    fn version_needs_no_input() {
        let args = Args::parse_from(["templater", "-v"]);
        assert!(args.version);
        assert!(args.render_options().is_none());
    }

    #[test]
    fn input_is_required_otherwise() {
        let err = Args::try_parse_from(["templater", "-f", "values.yaml"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
