//! Box identifiers: the unit of label generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token naming one physical box.
///
/// The pipeline never interprets the value; it is only encoded into the
/// matrix code (optionally behind a URL prefix) and printed as the box number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The string encoded into the matrix code.
    ///
    /// With a prefix such as `https://app.example.org/qr/` the code resolves
    /// to a scannable link; without one the bare identifier is encoded.
    pub fn payload(&self, prefix: Option<&str>) -> String {
        match prefix {
            Some(p) if !p.is_empty() => format!("{p}{}", self.0),
            _ => self.0.clone(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert any list of strings into identifiers, keeping order.
pub fn identifiers<I, S>(values: I) -> Vec<Identifier>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(|v| Identifier::new(v)).collect()
}
