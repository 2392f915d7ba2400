// SPDX-License-Identifier: Apache-2.0 OR MIT
#![forbid(unsafe_code)]
//! Renders Go `text/template` files against a merged set of YAML values.
//!
//! The pipeline is deliberately small: [`Values::load`] merges the value
//! files, [`function_library`] composes the Go builtins, the sprig helpers
//! and `toYaml`/`fromYaml`, [`resolve_targets`] turns the input into an
//! ordered list of source and destination pairs, and [`render::run`] walks
//! that list, compiling and executing one template at a time.
//!
//! ```no_run
//! use std::io;
//! use templater::{Input, RenderOptions};
//!
//! let options = RenderOptions {
//!     input: Input::from_arg("templates/"),
//!     values: vec!["values.yaml".into()],
//!     output: Some("rendered/".into()),
//!     strict: false,
//! };
//! let summary = templater::render::run(&options, io::stdin().lock(), io::stdout().lock())?;
//! println!("rendered {} templates", summary.rendered);
//! # Ok::<(), templater::Error>(())
//! ```

pub mod cli;
mod error;
pub mod library;
pub mod render;
pub mod targets;
pub mod values;
mod yaml;

pub use error::{Error, ParseError, Result};
pub use library::function_library;
pub use render::{RenderOptions, RenderSummary};
pub use targets::{resolve_targets, Destination, Input, RenderTarget, Source};
pub use values::Values;
