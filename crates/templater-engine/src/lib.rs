// SPDX-License-Identifier: Apache-2.0 OR MIT
#![forbid(unsafe_code)]
//! Go `text/template` compatible compiler and evaluator.
//!
//! A [`Template`] is compiled once against a [`FunctionRegistry`]: parsing and
//! every static check (unknown functions, argument counts, undefined
//! variables, misplaced `break`) happen up front, so a compiled template only
//! fails at execution for data-dependent reasons. Execution walks the tree
//! against a `serde_json::Value` and streams text into any [`std::io::Write`].
//!
//! ```
//! use serde_json::json;
//! use templater_engine::{FunctionRegistry, Template};
//!
//! let template = Template::compile("hello", "Hello, {{ .name }}!", FunctionRegistry::empty())?;
//! assert_eq!(template.render(&json!({"name": "world"}))?, "Hello, world!");
//! # Ok::<(), templater_engine::Error>(())
//! ```

pub mod ast;
mod error;
mod exec;
pub mod lexer;
mod parser;
mod runtime;
pub mod telemetry;

pub use ast::{
    ActionNode, BindingKind, Block, Branch, Command, CommentNode, Expression, IfNode, Node,
    Pipeline, PipelineDeclarations, RangeNode, Span, TemplateNode, TextNode, WithNode,
};
pub use error::{Error, Location};
pub use lexer::{Keyword, Token, TokenKind};
pub use runtime::{
    coerce_number, format_float, format_number, format_value, is_empty, is_truthy, parse_number,
    type_name, value_to_string, Arity, EvalContext, Function, FunctionRegistry,
    FunctionRegistryBuilder,
};

use std::fmt;
use std::io::Write;
use std::time::Instant;

use serde_json::Value;

use crate::parser::ParsedTemplate;

/// What a field lookup yields when the mapping has no such key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingKey {
    /// The lookup yields `null`, which prints as empty text.
    #[default]
    Zero,
    /// The lookup fails the execution.
    Error,
}

/// Compiled template: the parsed tree, its named sub-templates and the
/// function registry it was checked against.
#[derive(Clone)]
pub struct Template {
    pub(crate) name: String,
    source: String,
    pub(crate) parsed: ParsedTemplate,
    pub(crate) functions: FunctionRegistry,
    pub(crate) missing_key: MissingKey,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("missing_key", &self.missing_key)
            .finish()
    }
}

impl Template {
    /// Parses and checks `source`. Errors carry the template name and the
    /// 1-based line and column of the offending construct.
    pub fn compile(name: &str, source: &str, functions: FunctionRegistry) -> Result<Self, Error> {
        let started = Instant::now();
        let parsed = parser::parse_template(name, source, &functions);
        telemetry::record_compile(name, source.len(), started.elapsed(), parsed.is_ok());
        let parsed = parsed.map_err(|err| err.in_template(name, source))?;
        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            parsed,
            functions,
            missing_key: MissingKey::default(),
        })
    }

    /// Consumes the template and returns it with a different missing-key policy.
    pub fn with_missing_key(mut self, missing_key: MissingKey) -> Self {
        self.missing_key = missing_key;
        self
    }

    pub fn missing_key(&self) -> MissingKey {
        self.missing_key
    }

    /// Returns the template name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the original template source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the main body of the template.
    pub fn root(&self) -> &Block {
        &self.parsed.root
    }

    /// Names introduced with `define` or `block`, sorted.
    pub fn template_names(&self) -> Vec<String> {
        self.parsed.definitions.keys().cloned().collect()
    }

    /// Registered functions the template calls, sorted.
    pub fn function_names(&self) -> Vec<String> {
        self.parsed.functions.iter().cloned().collect()
    }

    /// Returns the function registry the template was compiled against.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Executes the template with `data` as dot and `$`, streaming output into
    /// `sink`. On failure, bytes already written to `sink` stay written.
    pub fn execute<W: Write + ?Sized>(&self, data: &Value, sink: &mut W) -> Result<(), Error> {
        let started = Instant::now();
        let result = exec::Executor::new(self, sink).run(data);
        telemetry::record_execute(&self.name, self.source.len(), started.elapsed(), result.is_ok());
        result.map_err(|err| err.in_template(&self.name, &self.source))
    }

    /// Executes the template into a string.
    pub fn render(&self, data: &Value) -> Result<String, Error> {
        let mut buffer = Vec::new();
        self.execute(data, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|err| Error::execute_with_source("output is not valid UTF-8", err))
    }
}
