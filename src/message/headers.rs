//! Header-block parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w\-]+):\s*(.*)$").expect("header pattern is valid")
});

/// Ordered, case-preserving `name → raw value` mapping.
///
/// A repeated name keeps its first position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHeaders {
    entries: Vec<(String, String)>,
}

impl ParsedHeaders {
    /// Extract `Name: value` lines from a header block.
    ///
    /// Lines that don't have that shape are skipped.
    pub fn parse(block: &str) -> Self {
        let mut headers = Self::default();
        for line in block.lines() {
            if let Some(caps) = HEADER_LINE.captures(line) {
                headers.insert(&caps[1], &caps[2]);
            }
        }
        headers
    }

    fn insert(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Exact-case lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Exact-case lookup that treats an empty value as absent.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// A copy without the named headers, or `None` if nothing remains.
    pub fn without(&self, excluded: &[&str]) -> Option<Self> {
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|(n, _)| !excluded.contains(&n.as_str()))
            .cloned()
            .collect();
        (!entries.is_empty()).then_some(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for ParsedHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::default();
        for (name, value) in iter {
            let (name, value): (String, String) = (name.into(), value.into());
            headers.insert(&name, &value);
        }
        headers
    }
}

impl Serialize for ParsedHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParsedHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = ParsedHeaders;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers = ParsedHeaders::default();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    headers.insert(&name, &value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}
