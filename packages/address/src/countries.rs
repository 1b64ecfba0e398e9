//! Country names recognized on the last mailing line.

use std::collections::BTreeSet;

/// Sentinel the county writes when the mailing country is not known.
pub const UNKNOWN_SENTINEL: &str = "UNKNOWN";

/// Countries seen in the county data as a bare last line.
pub const DEFAULT_COUNTRIES: &[&str] = &["JAPAN"];

/// Case-insensitive set of country names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownCountries {
    names: BTreeSet<String>,
}

impl Default for KnownCountries {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRIES.iter().copied())
    }
}

impl KnownCountries {
    /// Builds a set from the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_uppercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Adds more names to the set.
    #[must_use]
    pub fn extended<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names.extend(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_uppercase())
                .filter(|n| !n.is_empty()),
        );
        self
    }

    /// Whether `name` is a known country (ignoring case and padding).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.trim().to_uppercase())
    }

    /// Whether a last mailing line names a country or is the unknown
    /// sentinel.
    #[must_use]
    pub fn is_country_line(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(UNKNOWN_SENTINEL) || self.contains(line)
    }

    /// Number of names in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
