// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::path::PathBuf;

use thiserror::Error;

/// Every failure the rendering pipeline can report. All of them are fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// An input path or value file does not exist.
    #[error("{} does not exist", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A value file is not a valid YAML mapping.
    #[error("failed to parse values file {}", path.display())]
    Parse {
        /// The offending value file.
        path: PathBuf,
        /// What was wrong with it.
        #[source]
        source: ParseError,
    },

    /// A template failed to parse or referenced an unknown function.
    #[error("failed to compile {template}")]
    Compile {
        /// The template source, a path or `<stdin>`.
        template: String,
        /// The engine diagnostic, carrying name, line and column.
        #[source]
        source: templater_engine::Error,
    },

    /// A compiled template failed while executing against the values.
    #[error("failed to render {template}")]
    Execute {
        /// The template source, a path or `<stdin>`.
        template: String,
        /// The engine diagnostic.
        #[source]
        source: templater_engine::Error,
    },

    /// Reading a source, traversing a directory or writing a destination failed.
    #[error("I/O error on {}", path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
}

/// Why a value document was rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not syntactically valid YAML.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// The document parsed, but its top level is not a mapping.
    #[error("top-level value must be a mapping, found {found}")]
    NotAMapping {
        /// YAML kind of the top-level value.
        found: &'static str,
    },

    /// A mapping key is a sequence or a mapping.
    #[error("mapping keys must be scalars, found a {found} key")]
    NonScalarKey {
        /// YAML kind of the rejected key.
        found: &'static str,
    },
}

/// Convenience alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound { path }
        } else {
            Error::Io { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn missing_files_become_not_found() {
        let err = Error::io("values.yaml", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.to_string(), "values.yaml does not exist");

        let err = Error::io("out", io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("nope"));
    }

    #[test]
    fn parse_error_keeps_the_yaml_diagnostic_as_its_source() {
        let yaml = serde_yaml::from_str::<serde_yaml::Value>("a: [1").unwrap_err();
        let expected = yaml.to_string();
        let err = Error::Parse {
            path: "bad.yaml".into(),
            source: ParseError::from(yaml),
        };
        assert_eq!(err.to_string(), "failed to parse values file bad.yaml");
        assert_eq!(err.source().map(ToString::to_string), Some(expected));
    }
}
