// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt;

use crate::ast::Span;
use thiserror::Error;

/// Unified error type for the template engine.
///
/// Errors carry the message, optional source error, the `Span` pointing at the
/// offending region when one is known, and a [`Location`] that is filled in
/// once the error leaves the template it was raised in. Prefer the
/// `*_with_span` constructors when the failure originates from a concrete part
/// of the template.
#[derive(Debug, Error)]
pub enum Error {
    /// The template could not be compiled.
    #[error("template: {location}{message}")]
    Compile {
        /// Human readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Byte range of the offending input.
        span: Option<Span>,
        /// Template name and position.
        location: Location,
    },
    /// Evaluation failed while executing a compiled template.
    #[error("template: {location}{message}")]
    Execute {
        /// Human readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Byte range of the node being evaluated.
        span: Option<Span>,
        /// Template name and position.
        location: Location,
    },
    /// The output sink rejected a write.
    #[error("template: {location}write failed")]
    Write {
        /// The I/O failure reported by the sink.
        #[source]
        source: std::io::Error,
        /// Template name, position is not tracked for writes.
        location: Location,
    },
}

/// Where in which template an error was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Template name used for diagnostics.
    pub name: Option<String>,
    /// 1-based line number.
    pub line: Option<usize>,
    /// 1-based column, counted in characters.
    pub column: Option<usize>,
}

impl Location {
    /// Builds a location for `span` inside `source`.
    pub fn resolve(name: &str, source: &str, span: Option<Span>) -> Self {
        let mut location = Self {
            name: Some(name.to_string()),
            ..Self::default()
        };
        if let Some(span) = span {
            let offset = span.start.min(source.len());
            let prefix = source.get(..offset).unwrap_or(source);
            let line = prefix.matches('\n').count() + 1;
            let line_start = prefix.rfind('\n').map_or(0, |idx| idx + 1);
            location.line = Some(line);
            location.column = Some(prefix[line_start..].chars().count() + 1);
        }
        location
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.line.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        if let Some(name) = &self.name {
            f.write_str(name)?;
        }
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        f.write_str(": ")
    }
}

impl Error {
    pub fn compile(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Compile {
            message: message.into(),
            source: None,
            span,
            location: Location::default(),
        }
    }

    pub fn compile_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::compile(message, Some(span))
    }

    pub fn execute(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Execute {
            message: message.into(),
            source: None,
            span,
            location: Location::default(),
        }
    }

    pub fn execute_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::execute(message, Some(span))
    }

    /// Wraps a foreign error raised by a template function.
    pub fn execute_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Execute {
            message: message.into(),
            source: Some(Box::new(source)),
            span: None,
            location: Location::default(),
        }
    }

    pub(crate) fn write(source: std::io::Error) -> Self {
        Error::Write {
            source,
            location: Location::default(),
        }
    }

    /// Returns the message without the location prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Compile { message, .. } | Error::Execute { message, .. } => message,
            Error::Write { .. } => "write failed",
        }
    }

    /// Returns the span, if the error points at a region of the template.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Compile { span, .. } | Error::Execute { span, .. } => *span,
            Error::Write { .. } => None,
        }
    }

    /// Returns the location attached by [`Error::in_template`].
    pub fn location(&self) -> &Location {
        match self {
            Error::Compile { location, .. }
            | Error::Execute { location, .. }
            | Error::Write { location, .. } => location,
        }
    }

    /// Attaches the span when the error does not carry one yet.
    pub(crate) fn or_span(mut self, fallback: Span) -> Self {
        if let Error::Compile { span, .. } | Error::Execute { span, .. } = &mut self {
            if span.is_none() {
                *span = Some(fallback);
            }
        }
        self
    }

    /// Rewrites an error returned by a template function so the message names
    /// the function and the span points at the call.
    pub(crate) fn calling(self, name: &str, at: Span) -> Self {
        match self {
            Error::Compile {
                message, source, ..
            }
            | Error::Execute {
                message, source, ..
            } => Error::Execute {
                message: format!("error calling {name}: {message}"),
                source,
                span: Some(at),
                location: Location::default(),
            },
            write @ Error::Write { .. } => write,
        }
    }

    /// Stamps the template name and line onto the error. An existing location
    /// is kept, so errors raised inside `{{template}}` calls point at the
    /// innermost template.
    pub(crate) fn in_template(mut self, name: &str, source: &str) -> Self {
        let span = self.span();
        match &mut self {
            Error::Compile { location, .. }
            | Error::Execute { location, .. }
            | Error::Write { location, .. } => {
                if location.name.is_none() {
                    *location = Location::resolve(name, source, span);
                }
            }
        }
        self
    }

    /// Reports whether this error came from compilation.
    pub fn is_compile(&self) -> bool {
        matches!(self, Error::Compile { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_counts_lines_and_columns() {
        let source = "first\nsecond {{ oops }}";
        let location = Location::resolve("demo", source, Some(Span::new(13, 15)));
        assert_eq!(location.line, Some(2));
        assert_eq!(location.column, Some(8));
        assert_eq!(location.to_string(), "demo:2:8: ");
    }

    #[test]
    fn display_includes_location_once_stamped() {
        let err = Error::compile("unexpected EOF", Some(Span::new(0, 2)));
        assert_eq!(err.to_string(), "template: unexpected EOF");
        let err = err.in_template("cfg.yaml", "{{");
        assert_eq!(err.to_string(), "template: cfg.yaml:1:1: unexpected EOF");
    }

    #[test]
    fn in_template_keeps_innermost_location() {
        let err = Error::execute("boom", None)
            .in_template("inner", "")
            .in_template("outer", "");
        assert_eq!(err.location().name.as_deref(), Some("inner"));
    }
}
