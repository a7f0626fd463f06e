//! Arguments and Options
//!
//! Declared argument/option specifications and the parsed value bag a
//! generator carries. Parsing argv itself is out of scope; callers hand the
//! engine positional values and an already-parsed option map.

use crate::error::EngineError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Builtin option names every generator understands.
pub const OPT_HELP: &str = "help";
pub const OPT_SKIP_CACHE: &str = "skip_cache";
pub const OPT_SKIP_INSTALL: &str = "skip_install";
pub const OPT_FORCE: &str = "force";

/// A declared positional argument.
///
/// Arguments are retrieved by position; an argument with a default value is
/// implicitly optional, mirroring how the declaration API treats defaults.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("Description for {name}"),
            name,
            required: true,
            default: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Providing a default makes the argument optional.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.required = false;
        self
    }
}

/// A declared named option, kept for usage/help rendering.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub default: Option<Value>,
    pub hide: bool,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("Description for {name}"),
            name,
            default: None,
            hide: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }
}

/// Parsed option values, keyed by option name.
///
/// Values are JSON so the same bag can carry booleans, strings, and
/// structured data. Absence is meaningful: a flag that was never set is
/// distinguishable from one explicitly set to `false`, which is what lets
/// composition mirror parent flags without clobbering child choices.
#[derive(Debug, Clone, Default)]
pub struct OptionBag {
    values: BTreeMap<String, Value>,
}

impl OptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Boolean view of an option; unset reads as `false`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(Value::Bool(true)))
    }

    pub fn help(&self) -> bool {
        self.flag(OPT_HELP)
    }

    pub fn skip_cache(&self) -> bool {
        self.flag(OPT_SKIP_CACHE)
    }

    pub fn skip_install(&self) -> bool {
        self.flag(OPT_SKIP_INSTALL)
    }

    pub fn force(&self) -> bool {
        self.flag(OPT_FORCE)
    }

    /// Copy entries from `other` for keys this bag has not set.
    ///
    /// Used when composing: the parent mirrors its skip flags down, but a
    /// child-supplied value wins when explicitly set.
    pub fn merge_missing(&mut self, other: &OptionBag) {
        for (key, value) in &other.values {
            self.values.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Bind positional values to declared argument specs.
///
/// Resolution order per argument: positional value, then an option-bag entry
/// under the argument's name, then the declared default.
pub fn resolve_arguments(
    specs: &[ArgumentSpec],
    args: &[Value],
    options: &OptionBag,
) -> BTreeMap<String, Value> {
    let mut resolved = BTreeMap::new();
    for (index, spec) in specs.iter().enumerate() {
        let value = args
            .get(index)
            .cloned()
            .or_else(|| options.get(&spec.name).cloned())
            .or_else(|| spec.default.clone());
        if let Some(value) = value {
            resolved.insert(spec.name.clone(), value);
        }
    }
    resolved
}

/// Check declared required arguments against the provided positionals.
///
/// Skipped entirely when help was requested. Every missing required argument
/// produces one recoverable error; the caller records these in the run
/// report rather than halting.
pub fn check_required_arguments(
    specs: &[ArgumentSpec],
    args: &[Value],
    options: &OptionBag,
) -> Vec<EngineError> {
    if options.help() {
        return Vec::new();
    }

    // More positionals than declarations means nothing can be missing.
    if args.len() > specs.len() {
        return Vec::new();
    }

    specs
        .iter()
        .enumerate()
        .filter(|(position, spec)| {
            spec.required
                && *position >= args.len()
                && !options.is_set(&spec.name)
                && spec.default.is_none()
        })
        .map(|(_, spec)| EngineError::MissingRequiredArgument {
            name: spec.name.clone(),
        })
        .collect()
}
