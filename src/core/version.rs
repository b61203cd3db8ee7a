//! Purpose: Derive the release version tag embedded in extracted artifact names.
//! Exports: `VersionTag`, `parse_properties`.
//! Role: Scopes extraction and cleanup so artifacts of different releases never collide.
//! Invariants: A tag only contains digits and `.`, or is exactly `unknown`.
//! Invariants: Reading metadata never fails the caller; problems degrade to `unknown`.
use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use tracing::warn;

use crate::core::resource::ResourceSource;

pub const UNKNOWN_VERSION: &str = "unknown";

const METADATA_FILES: [&str; 2] = ["version.properties", "VERSION"];

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn unknown() -> Self {
        Self(UNKNOWN_VERSION.to_string())
    }

    /// Normalizes a raw version string, dropping anything but digits and dots.
    pub fn new(raw: &str) -> Self {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|ch| ch.is_ascii_digit() || *ch == '.')
            .collect();
        if cleaned.is_empty() {
            Self::unknown()
        } else {
            Self(cleaned)
        }
    }

    /// Reads `<namespace>/version.properties`, then `<namespace>/VERSION`.
    pub fn from_resources(resources: &dyn ResourceSource, namespace: &str) -> Self {
        let namespace = namespace.trim_matches('/');
        for file in METADATA_FILES {
            let path = if namespace.is_empty() {
                file.to_string()
            } else {
                format!("{namespace}/{file}")
            };
            if !resources.exists(&path) {
                continue;
            }
            let mut text = String::new();
            let read = resources
                .open(&path)
                .and_then(|mut reader| reader.read_to_string(&mut text));
            if let Err(err) = read {
                warn!(path = %path, error = %err, "could not read version metadata");
                return Self::unknown();
            }
            return parse_properties(&text)
                .get("version")
                .map(|raw| Self::new(raw))
                .unwrap_or_else(Self::unknown);
        }
        Self::unknown()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_VERSION
    }

    pub fn major(&self) -> u32 {
        self.component(0).unwrap_or(1)
    }

    pub fn minor(&self) -> u32 {
        self.component(1).unwrap_or(0)
    }

    fn component(&self, index: usize) -> Option<u32> {
        self.0.split('.').nth(index)?.parse().ok()
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal `.properties` reader: `key=value` or `key: value`, `#`/`!` comments.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line.find(['=', ':']);
        let (key, value) = match split {
            Some(index) => (&line[..index], &line[index + 1..]),
            None => (line, ""),
        };
        values.insert(key.trim().to_string(), value.trim().to_string());
    }
    values
}
