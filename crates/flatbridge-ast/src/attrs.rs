//! `key=value` attributes carried by the `/*--abi(...)--*/` marker.

use crate::error::{BridgeError, Result};

/// Ordered attribute list. Keys may repeat (`optional_param=a,optional_param=b`);
/// bare keys are flags with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    /// Parse the text between the marker's parentheses.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => {
                    let value = value.trim();
                    if value.is_empty() {
                        return Err(BridgeError::malformed(
                            format!("attribute `{}` has an empty value", key.trim()),
                            text,
                        ));
                    }
                    (key.trim(), value)
                }
                None => (part, ""),
            };
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(BridgeError::malformed(
                    format!("invalid attribute key `{key}`"),
                    text,
                ));
            }
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(Self { entries })
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for a repeatable key.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Integer-valued attribute such as `added=3`.
    pub fn get_version(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value.parse::<u32>().map(Some).map_err(|_| {
                BridgeError::malformed(
                    format!("`{key}` must be a non-negative integer"),
                    format!("{key}={value}"),
                )
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
