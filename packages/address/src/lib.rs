#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mailing-address parsing for county parcel ownership rows.
//!
//! County extracts store the mailing address as four loosely structured
//! lines plus an owner name. The last non-blank line decides how the rest
//! are read:
//! - `"SOUTH LAKE TAHOE CA 96150"`: city/state/zip, street on the line above
//! - `"JAPAN"`: a bare country name, every line shifts into place
//! - `"VANCOUVER BC CANADA V6B 1A1"`: a foreign locality on line 2
//!
//! Parsing is a total function: every record produces a
//! [`NormalizedOwnership`]. Records that fit none of the known shapes get a
//! best-effort result and a [`ParseAmbiguity`] diagnostic instead of an
//! error.

pub mod countries;
pub mod patterns;
pub mod rules;
pub mod street;

use parcel_sync_parcel_models::{NormalizedOwnership, RawAddressRecord};

pub use countries::KnownCountries;
pub use rules::RuleId;

use crate::rules::{RULES, RuleInput};

/// A record that did not fit any known address shape cleanly.
///
/// Never aborts parsing; carried alongside the best-effort result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseAmbiguity {
    /// Line 4 is neither a country nor a city/state/zip line.
    #[error("unparsed last mailing line: {line:?}")]
    UnparsedLastLine {
        /// The unparsed line.
        line: String,
    },
    /// Line 2 is not a domestic city line and not a recognized foreign
    /// locality; it was kept as the country.
    #[error("unrecognized foreign address: {line:?}")]
    UnrecognizedForeignAddress {
        /// The unparsed line.
        line: String,
    },
    /// The street line has no house number; the `"None"` placeholder was
    /// written.
    #[error("no house number in street line: {line:?}")]
    NoStreetNumber {
        /// The street line.
        line: String,
    },
}

/// The result of parsing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Normalized fields.
    pub ownership: NormalizedOwnership,
    /// Rule that produced the result.
    pub rule: RuleId,
    /// Set when the record only partially fit the chosen rule.
    pub ambiguity: Option<ParseAmbiguity>,
}

/// Parses mailing-address lines into normalized ownership fields.
///
/// Holds no mutable state; the same input always yields the same output.
#[derive(Debug, Clone, Default)]
pub struct AddressParser {
    countries: KnownCountries,
}

impl AddressParser {
    /// Creates a parser that accepts the given country names on line 4.
    #[must_use]
    pub const fn new(countries: KnownCountries) -> Self {
        Self { countries }
    }

    /// Country names this parser recognizes.
    #[must_use]
    pub const fn countries(&self) -> &KnownCountries {
        &self.countries
    }

    /// Parses a record, returning only the normalized fields.
    #[must_use]
    pub fn parse(&self, record: &RawAddressRecord) -> NormalizedOwnership {
        self.parse_with_outcome(record).ownership
    }

    /// Parses the five source fields directly.
    #[must_use]
    pub fn parse_fields(
        &self,
        line1: &str,
        line2: &str,
        line3: &str,
        line4: &str,
        owner: &str,
    ) -> NormalizedOwnership {
        self.parse(&RawAddressRecord {
            owner: owner.to_string(),
            line1: line1.to_string(),
            line2: line2.to_string(),
            line3: line3.to_string(),
            line4: line4.to_string(),
        })
    }

    /// Parses a record and reports which rule fired.
    #[must_use]
    pub fn parse_with_outcome(&self, record: &RawAddressRecord) -> ParseOutcome {
        let input = RuleInput {
            record,
            countries: &self.countries,
        };

        for rule in &RULES {
            if rule.matches(&input) {
                let outcome = rule.apply(&input);
                log::trace!("rule {} matched", outcome.rule);
                return outcome;
            }
        }

        // The final rule's guard is unconditional; this is never reached.
        ParseOutcome {
            ownership: NormalizedOwnership::owner_only(record.owner.trim()),
            rule: RuleId::Line2Unrecognized,
            ambiguity: None,
        }
    }
}
