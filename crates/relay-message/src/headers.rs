//! Case-insensitive, ordered, multi-value header collection

use crate::{Error, Result};
use smallvec::SmallVec;

/// Values stored for one header (most headers carry a single value)
pub type HeaderValues = SmallVec<[String; 1]>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    /// Spelling used on the most recent `set`
    name: String,
    key: String,
    values: HeaderValues,
}

/// Ordered header store with case-insensitive lookups
///
/// Each name keeps the spelling of the most recent [`HeaderBag::set`];
/// [`HeaderBag::add`] appends values without touching it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: Vec<HeaderEntry>,
}

fn validate_name(name: &str) -> Result<()> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| Error::InvalidHeader(format!("invalid header name '{}'", name)))
}

fn clean_values<I, V>(name: &str, values: I) -> Result<HeaderValues>
where
    I: IntoIterator<Item = V>,
    V: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| {
            let value = value.as_ref().trim();
            http::HeaderValue::from_bytes(value.as_bytes())
                .map(|_| value.to_string())
                .map_err(|_| Error::InvalidHeader(format!("invalid value for header '{}'", name)))
        })
        .collect()
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = name.to_ascii_lowercase();
        self.entries.iter().position(|e| e.key == key)
    }

    /// Replace all values of `name`; an empty list removes the header
    ///
    /// `name`'s exact spelling becomes the one reported by [`HeaderBag::iter`].
    pub fn set<I, V>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        validate_name(name)?;
        let values = clean_values(name, values)?;

        self.remove(name);
        if !values.is_empty() {
            self.entries.push(HeaderEntry {
                name: name.to_string(),
                key: name.to_ascii_lowercase(),
                values,
            });
        }
        Ok(())
    }

    /// Append values to an existing header
    pub fn add<I, V>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let values = clean_values(name, values)?;
        let idx = self
            .position(name)
            .ok_or_else(|| Error::InvalidHeader(format!("header '{}' is not set", name)))?;
        self.entries[idx].values.extend(values);
        Ok(())
    }

    /// Remove a header; returns whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// All values of a header (empty when absent)
    pub fn get(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|idx| self.entries[idx].values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of a header
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Values joined with `,`
    pub fn line(&self, name: &str) -> String {
        self.get(name).join(",")
    }

    /// Iterate `(display name, values)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header lines as sent on the wire, one per value
    ///
    /// An empty value renders as `Name;` so it survives transports that
    /// drop `Name:` lines.
    pub fn wire_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            for value in &entry.values {
                if value.is_empty() {
                    lines.push(format!("{};", entry.name));
                } else {
                    lines.push(format!("{}: {}", entry.name, value));
                }
            }
        }
        lines
    }
}
