// SPDX-License-Identifier: Apache-2.0 OR MIT
#![forbid(unsafe_code)]
//! Templater Sprig re-implements the general-purpose helpers of the `sprig`
//! Go template library on top of `templater-engine`: strings, lists, dicts,
//! math, encoding, regular expressions, semantic versions, dates and
//! reflection.
//!
//! The wall-clock and random helpers of the Go library (`now`, `randAlpha`,
//! `uuidv4`, ...) are deliberately absent so rendering stays deterministic.

use once_cell::sync::Lazy;
use templater_builtins::install_text_template_functions;
use templater_engine::{FunctionRegistry, FunctionRegistryBuilder};

mod functions;

pub use functions::deep_merge;

static SPRIG_FUNCTIONS: Lazy<FunctionRegistry> = Lazy::new(|| {
    let mut builder = FunctionRegistryBuilder::new();
    install_all(&mut builder);
    builder.build()
});

/// Installs both the Go text/template builtins and the sprig helpers. The
/// builtins go first so sprig can augment them the way Go projects expect.
pub fn install_all(builder: &mut FunctionRegistryBuilder) {
    install_text_template_functions(builder);
    install_sprig_functions(builder);
}

/// Registers the sprig helpers into an existing function registry builder.
pub fn install_sprig_functions(builder: &mut FunctionRegistryBuilder) {
    functions::install_all(builder);
}

/// Returns a registry populated with the Go builtins plus sprig extensions.
/// The registry is built once and shared.
pub fn sprig_functions() -> FunctionRegistry {
    SPRIG_FUNCTIONS.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use templater_engine::Template;

    #[test]
    fn template_with_sprig_helpers() {
        let template = Template::compile(
            "sprig",
            "{{default \"friend\" .name | upper}}",
            sprig_functions(),
        )
        .unwrap();
        let rendered = template.render(&json!({"name": "sprig"})).unwrap();
        assert_eq!(rendered, "SPRIG");
    }

    #[test]
    fn no_clock_or_random_helpers_are_registered() {
        let registry = sprig_functions();
        for name in ["now", "ago", "randAlpha", "randNumeric", "uuidv4", "genPrivateKey"] {
            assert!(!registry.contains(name), "{name} should not be registered");
        }
    }

    #[test]
    fn sprig_overrides_nothing_from_the_builtins() {
        let builtins = templater_builtins::text_template_functions();
        let mut builder = FunctionRegistryBuilder::new();
        install_sprig_functions(&mut builder);
        let sprig = builder.build();
        for name in builtins.function_names() {
            assert!(!sprig.contains(&name), "{name} is shadowed by sprig");
        }
    }
}
