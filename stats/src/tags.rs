use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered key/value labels attached to a metric sample.
///
/// Order is preserved exactly as supplied. Duplicate keys are kept; avoiding
/// them is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    pairs: Vec<(String, String)>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn extend(&mut self, other: &Tags) {
        self.pairs.extend(other.pairs.iter().cloned());
    }

    /// Returns a new set holding `self` followed by `other`.
    pub fn concat(&self, other: &Tags) -> Tags {
        let mut merged = self.clone();
        merged.extend(other);
        merged
    }

    /// Parses a `key:value` tag. A tag without a colon becomes a bare key.
    pub fn parse_pair(raw: &str) -> (String, String) {
        match raw.split_once(':') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (raw.trim().to_string(), String::new()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn render_pair(key: &str, value: &str) -> String {
        if value.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", key, value)
        }
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .iter()
            .map(|(k, v)| Self::render_pair(k, v))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

impl<K, V> FromIterator<(K, V)> for Tags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Serialize for Tags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rendered: Vec<String> = self
            .iter()
            .map(|(k, v)| Self::render_pair(k, v))
            .collect();
        rendered.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        Ok(raw.iter().map(|tag| Self::parse_pair(tag)).collect())
    }
}
