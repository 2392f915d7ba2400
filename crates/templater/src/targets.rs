// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Turns the input argument into an ordered list of render targets.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Template name used for standard input.
pub const STDIN_NAME: &str = "<stdin>";

/// Where templates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Standard input, selected with `-`.
    Stdin,
    /// A single template file or a directory of templates.
    Path(PathBuf),
}

impl Input {
    /// Interprets a command-line argument; `-` selects standard input.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Input::Stdin
        } else {
            Input::Path(PathBuf::from(arg))
        }
    }
}

/// Where one template's text is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Standard input.
    Stdin,
    /// A template file.
    File(PathBuf),
}

impl Source {
    /// Name the template is compiled under: the file's base name, or
    /// [`STDIN_NAME`].
    pub fn template_name(&self) -> String {
        match self {
            Source::Stdin => STDIN_NAME.to_string(),
            Source::File(path) => path.file_name().map_or_else(
                || path.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            ),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => f.write_str(STDIN_NAME),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Where one template's output is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Standard output, shared by every target without a file.
    Stdout,
    /// An output file, created with its parent directories.
    File(PathBuf),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("<stdout>"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One template to render and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    /// The template to read.
    pub source: Source,
    /// Where its output goes.
    pub destination: Destination,
}

/// Resolves `input` into render targets.
///
/// A directory is walked recursively in file-name order and mirrored under
/// `output` when one is given; otherwise everything goes to stdout. Symbolic
/// links are never descended into. A link to a regular file is rendered,
/// any other link is skipped. The first traversal error aborts resolution.
pub fn resolve_targets(input: &Input, output: Option<&Path>) -> Result<Vec<RenderTarget>> {
    let root = match input {
        Input::Stdin => {
            if let Some(output) = output {
                warn!(
                    output = %output.display(),
                    "output path is ignored when reading the template from stdin"
                );
            }
            return Ok(vec![RenderTarget {
                source: Source::Stdin,
                destination: Destination::Stdout,
            }]);
        }
        Input::Path(path) => path,
    };

    let metadata = fs::metadata(root).map_err(|source| Error::io(root, source))?;
    if metadata.is_file() {
        debug!(input = %root.display(), "resolved single template");
        return Ok(vec![RenderTarget {
            source: Source::File(root.clone()),
            destination: output.map_or(Destination::Stdout, |path| {
                Destination::File(path.to_path_buf())
            }),
        }]);
    }
    if !metadata.is_dir() {
        return Err(Error::Io {
            path: root.clone(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "input is neither a regular file nor a directory",
            ),
        });
    }

    let mut targets = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            Error::Io {
                path,
                source: io::Error::from(err),
            }
        })?;
        let path = entry.path();
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_symlink() {
            match fs::metadata(path) {
                Ok(target) if target.is_file() => {}
                Ok(_) => {
                    debug!(path = %path.display(), "skipping link to a directory");
                    continue;
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping unresolvable link");
                    continue;
                }
            }
        } else if !file_type.is_file() {
            debug!(path = %path.display(), "skipping special file");
            continue;
        }

        let destination = match output {
            Some(out) => {
                let relative = path.strip_prefix(root).unwrap_or(path);
                Destination::File(out.join(relative))
            }
            None => Destination::Stdout,
        };
        targets.push(RenderTarget {
            source: Source::File(path.to_path_buf()),
            destination,
        });
    }
    debug!(input = %root.display(), count = targets.len(), "resolved template directory");
    Ok(targets)
}
