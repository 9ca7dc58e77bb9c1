//! Placeholder substitution for template text.
//!
//! The composer only depends on the [`Substitute`] trait; [`PlaceholderEngine`]
//! is the default `{{name}}` implementation. [`BracketEngine`] understands the
//! older `[name]` and `[/path/to]` form.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key carrying attachment descriptors rather than text.
pub const ATTACHMENTS_KEY: &str = "attachments";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

static BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(/?[A-Za-z0-9_\-.]+(?:/[A-Za-z0-9_\-.]+)*)\]")
        .expect("bracket pattern is valid")
});

/// Values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstitutionMap(Map<String, Value>);

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a dotted name (`user.name`) through nested objects.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.lookup_segments(name.split('.'))
    }

    /// Walk nested objects and arrays one segment at a time.
    fn lookup_segments<'a>(&self, mut parts: impl Iterator<Item = &'a str>) -> Option<&Value> {
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The reserved `attachments` entry, untouched.
    pub fn attachments(&self) -> Option<&Value> {
        self.0.get(ATTACHMENTS_KEY)
    }
}

impl From<Map<String, Value>> for SubstitutionMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for SubstitutionMap {
    type Error = Value;

    /// Only JSON objects convert; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// A substitution engine: `substitute(text, values) -> text`.
pub trait Substitute: Send + Sync {
    fn substitute(&self, text: &str, values: &SubstitutionMap) -> String;
}

/// Replaces `{{name}}` and `{{nested.name}}` placeholders.
///
/// Placeholders with no matching value are left in place, as are any that
/// point into the reserved `attachments` entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEngine;

impl Substitute for PlaceholderEngine {
    fn substitute(&self, text: &str, values: &SubstitutionMap) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                let name = &caps[1];
                let reserved = name.split('.').next() == Some(ATTACHMENTS_KEY);
                match values.lookup(name) {
                    Some(value) if !reserved => render(value),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Replaces `[name]` with a top-level value and `[/path/to]` with a nested one.
///
/// Unknown names and the reserved `attachments` entry are left in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketEngine;

impl Substitute for BracketEngine {
    fn substitute(&self, text: &str, values: &SubstitutionMap) -> String {
        BRACKET
            .replace_all(text, |caps: &Captures| {
                let name = &caps[1];
                let value = match name.strip_prefix('/') {
                    Some(path) => values.lookup_segments(path.split('/')),
                    None => values.0.get(name),
                };
                let reserved = name.trim_start_matches('/').split('/').next() == Some(ATTACHMENTS_KEY);
                match value {
                    Some(value) if !reserved => render(value),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // Arrays and objects render as JSON
        _ => value.to_string(),
    }
}
