//! The ordered rule table.
//!
//! Rules are evaluated top to bottom and the first rule whose guard holds
//! produces the result. Guards only look at which lines are blank and
//! whether a line matches a pattern, so each rule can be exercised on its
//! own.

use parcel_sync_parcel_models::{NormalizedOwnership, RawAddressRecord, is_blank};
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::countries::KnownCountries;
use crate::patterns::{brazil, canada, city_state_zip};
use crate::street::{CityLine, StreetSelection, select_street};
use crate::{ParseAmbiguity, ParseOutcome};

/// Owner fragment used for federally owned parcels.
pub const FEDERAL_OWNER: &str = "UNITED STATES OF AMERICA";

/// Identifies the rule that produced a result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum RuleId {
    /// Line 4 is a country name or the unknown sentinel.
    Line4Country,
    /// Line 4 holds city/state/zip.
    Line4CityStateZip,
    /// Line 4 is present but matches nothing.
    Line4Unparsed,
    /// Line 3 holds city/state/zip.
    Line3CityStateZip,
    /// Line 3 is present but not a domestic city line; read as a country.
    Line3Foreign,
    /// Federally owned parcel.
    FederalOwner,
    /// No owner at all.
    BlankOwner,
    /// Owner with no mailing lines.
    OwnerOnly,
    /// Owner and a single street line.
    StreetOnly,
    /// Line 2 holds city/state/zip.
    Line2CityStateZip,
    /// Line 2 is a Canadian locality.
    Line2Canada,
    /// Line 2 is a Brazilian locality.
    Line2Brazil,
    /// Line 2 matches none of the known shapes.
    Line2Unrecognized,
}

/// What a rule sees.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// The record being parsed.
    pub record: &'a RawAddressRecord,
    /// Country names accepted on line 4.
    pub countries: &'a KnownCountries,
}

/// One `(guard, transform)` entry of the table.
pub struct Rule {
    /// Rule identifier.
    pub id: RuleId,
    guard: fn(&RuleInput<'_>) -> bool,
    apply: fn(&RuleInput<'_>) -> (NormalizedOwnership, Option<ParseAmbiguity>),
}

impl Rule {
    /// Whether this rule applies to `input`.
    #[must_use]
    pub fn matches(&self, input: &RuleInput<'_>) -> bool {
        (self.guard)(input)
    }

    /// Runs the transform. Only meaningful when [`Self::matches`] holds.
    #[must_use]
    pub fn apply(&self, input: &RuleInput<'_>) -> ParseOutcome {
        let (ownership, ambiguity) = (self.apply)(input);
        ParseOutcome {
            ownership,
            rule: self.id,
            ambiguity,
        }
    }
}

/// The rule table, in priority order. The last rule always matches.
pub static RULES: [Rule; 13] = [
    Rule {
        id: RuleId::Line4Country,
        guard: |i| !is_blank(&i.record.line4) && i.countries.is_country_line(&i.record.line4),
        apply: line4_country,
    },
    Rule {
        id: RuleId::Line4CityStateZip,
        guard: |i| !is_blank(&i.record.line4) && city_state_zip(&i.record.line4).is_some(),
        apply: line4_city_state_zip,
    },
    Rule {
        id: RuleId::Line4Unparsed,
        guard: |i| !is_blank(&i.record.line4),
        apply: |i| {
            (
                NormalizedOwnership::owner_only(field(&i.record.owner)),
                Some(ParseAmbiguity::UnparsedLastLine {
                    line: i.record.line4.clone(),
                }),
            )
        },
    },
    Rule {
        id: RuleId::Line3CityStateZip,
        guard: |i| !is_blank(&i.record.line3) && city_state_zip(&i.record.line3).is_some(),
        apply: line3_city_state_zip,
    },
    Rule {
        id: RuleId::Line3Foreign,
        guard: |i| !is_blank(&i.record.line3),
        apply: |i| {
            let r = i.record;
            (
                NormalizedOwnership {
                    owner: field(&r.owner),
                    address: field(&r.line1),
                    city: field(&r.line2),
                    country: field(&r.line3),
                    ..NormalizedOwnership::default()
                },
                None,
            )
        },
    },
    Rule {
        id: RuleId::FederalOwner,
        guard: |i| i.record.owner.trim() == FEDERAL_OWNER && !is_blank(&i.record.line1),
        apply: federal_owner,
    },
    Rule {
        id: RuleId::BlankOwner,
        guard: |i| is_blank(&i.record.owner),
        apply: |_| (NormalizedOwnership::default(), None),
    },
    Rule {
        id: RuleId::OwnerOnly,
        guard: |i| is_blank(&i.record.line1),
        apply: |i| (NormalizedOwnership::owner_only(field(&i.record.owner)), None),
    },
    Rule {
        id: RuleId::StreetOnly,
        guard: |i| is_blank(&i.record.line2),
        apply: |i| {
            (
                NormalizedOwnership {
                    owner: field(&i.record.owner),
                    address: field(&i.record.line1),
                    ..NormalizedOwnership::default()
                },
                None,
            )
        },
    },
    Rule {
        id: RuleId::Line2CityStateZip,
        guard: |i| city_state_zip(&i.record.line2).is_some(),
        apply: line2_city_state_zip,
    },
    Rule {
        id: RuleId::Line2Canada,
        guard: |i| i.record.line2.contains("CANADA") && canada(&i.record.line2).is_some(),
        apply: |i| line2_foreign(i, canada),
    },
    Rule {
        id: RuleId::Line2Brazil,
        guard: |i| i.record.line2.contains("BRAZIL") && brazil(&i.record.line2).is_some(),
        apply: |i| line2_foreign(i, brazil),
    },
    Rule {
        id: RuleId::Line2Unrecognized,
        guard: |_| true,
        apply: |i| {
            let r = i.record;
            (
                NormalizedOwnership {
                    owner: field(&r.owner),
                    address: field(&r.line1),
                    country: field(&r.line2),
                    ..NormalizedOwnership::default()
                },
                Some(ParseAmbiguity::UnrecognizedForeignAddress {
                    line: r.line2.clone(),
                }),
            )
        },
    },
];

/// Returns the rule with the given id.
#[must_use]
pub fn rule(id: RuleId) -> &'static Rule {
    // Table order matches enum order.
    &RULES[id as usize]
}

/// Blank sentinel values become empty strings; everything else is kept.
fn field(value: &str) -> String {
    if is_blank(value) {
        String::new()
    } else {
        value.to_string()
    }
}

/// Space-joins the non-blank parts.
fn join_owner(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops a single leading space.
fn strip_leading_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

fn street_ambiguity(selection: &StreetSelection, line: &str) -> Option<ParseAmbiguity> {
    matches!(selection, StreetSelection::Missing).then(|| ParseAmbiguity::NoStreetNumber {
        line: line.to_string(),
    })
}

fn line4_country(i: &RuleInput<'_>) -> (NormalizedOwnership, Option<ParseAmbiguity>) {
    let r = i.record;
    (
        NormalizedOwnership {
            owner: field(&r.owner),
            address: field(&r.line1),
            city: field(&r.line2),
            state: field(&r.line3),
            zip: String::new(),
            country: field(&r.line4),
        },
        None,
    )
}

fn line4_city_state_zip(i: &RuleInput<'_>) -> (NormalizedOwnership, Option<ParseAmbiguity>) {
    let r = i.record;
    let Some(csz) = city_state_zip(&r.line4) else {
        return (NormalizedOwnership::owner_only(field(&r.owner)), None);
    };
    let selection = select_street(&r.line3, CityLine::Four);
    let ambiguity = street_ambiguity(&selection, &r.line3);
    (
        NormalizedOwnership {
            owner: join_owner(&[&r.owner, &r.line1, &r.line2]),
            address: selection.into_address(),
            city: csz.city,
            state: csz.state,
            zip: csz.zip,
            country: String::new(),
        },
        ambiguity,
    )
}

fn line3_city_state_zip(i: &RuleInput<'_>) -> (NormalizedOwnership, Option<ParseAmbiguity>) {
    let r = i.record;
    let Some(csz) = city_state_zip(&r.line3) else {
        return (NormalizedOwnership::owner_only(field(&r.owner)), None);
    };
    let street = strip_leading_space(&r.line2);
    let selection = select_street(street, CityLine::Three);
    let ambiguity = street_ambiguity(&selection, street);
    (
        NormalizedOwnership {
            owner: join_owner(&[&r.owner, &r.line1]),
            address: selection.into_address(),
            city: csz.city,
            state: csz.state,
            zip: csz.zip,
            country: String::new(),
        },
        ambiguity,
    )
}

fn federal_owner(i: &RuleInput<'_>) -> (NormalizedOwnership, Option<ParseAmbiguity>) {
    let r = i.record;
    let csz = city_state_zip(&r.line2);
    (
        NormalizedOwnership {
            owner: FEDERAL_OWNER.to_string(),
            address: field(&r.line1),
            city: csz.as_ref().map(|c| c.city.clone()).unwrap_or_default(),
            state: csz.as_ref().map(|c| c.state.clone()).unwrap_or_default(),
            zip: csz.map(|c| c.zip).unwrap_or_default(),
            country: String::new(),
        },
        None,
    )
}

fn line2_city_state_zip(i: &RuleInput<'_>) -> (NormalizedOwnership, Option<ParseAmbiguity>) {
    let r = i.record;
    let Some(csz) = city_state_zip(&r.line2) else {
        return (NormalizedOwnership::owner_only(field(&r.owner)), None);
    };
    let street = strip_leading_space(&r.line1);
    (
        NormalizedOwnership {
            owner: field(&r.owner),
            address: select_street(street, CityLine::Two).into_address(),
            city: csz.city,
            state: csz.state,
            zip: csz.zip,
            country: String::new(),
        },
        None,
    )
}

fn line2_foreign(
    i: &RuleInput<'_>,
    pattern: fn(&str) -> Option<crate::patterns::ForeignLocality>,
) -> (NormalizedOwnership, Option<ParseAmbiguity>) {
    let r = i.record;
    let Some(locality) = pattern(&r.line2) else {
        return (NormalizedOwnership::owner_only(field(&r.owner)), None);
    };
    (
        NormalizedOwnership {
            owner: field(&r.owner),
            address: field(strip_leading_space(&r.line1)),
            city: locality.city,
            state: locality.state,
            zip: locality.zip,
            country: locality.country,
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator as _;

    use super::*;

    fn record(owner: &str, lines: [&str; 4]) -> RawAddressRecord {
        RawAddressRecord {
            owner: owner.to_string(),
            line1: lines[0].to_string(),
            line2: lines[1].to_string(),
            line3: lines[2].to_string(),
            line4: lines[3].to_string(),
        }
    }

    fn input<'a>(record: &'a RawAddressRecord, countries: &'a KnownCountries) -> RuleInput<'a> {
        RuleInput { record, countries }
    }

    #[test]
    fn table_order_matches_rule_ids() {
        for (idx, id) in RuleId::iter().enumerate() {
            assert_eq!(RULES[idx].id, id);
            assert_eq!(rule(id).id, id);
        }
    }

    #[test]
    fn last_rule_always_matches() {
        let countries = KnownCountries::default();
        let r = record(" ", [" ", " ", " ", " "]);
        assert!(RULES[RULES.len() - 1].matches(&input(&r, &countries)));
    }

    #[test]
    fn line4_guards_ignore_lower_lines() {
        let countries = KnownCountries::default();
        let r = record("DOE JANE", [" ", " ", " ", "SOMEWHERE"]);
        let i = input(&r, &countries);
        assert!(!rule(RuleId::Line4Country).matches(&i));
        assert!(!rule(RuleId::Line4CityStateZip).matches(&i));
        assert!(rule(RuleId::Line4Unparsed).matches(&i));
    }

    #[test]
    fn federal_owner_requires_street_line() {
        let countries = KnownCountries::default();
        let r = record(FEDERAL_OWNER, [" ", " ", " ", " "]);
        assert!(!rule(RuleId::FederalOwner).matches(&input(&r, &countries)));

        let r = record(FEDERAL_OWNER, ["35 COLLEGE DR", " ", " ", " "]);
        assert!(rule(RuleId::FederalOwner).matches(&input(&r, &countries)));
    }

    #[test]
    fn canada_guard_needs_pattern_match() {
        let countries = KnownCountries::default();
        let r = record("LEE", ["1 RUE", "MONTREAL CANADA", " ", " "]);
        assert!(!rule(RuleId::Line2Canada).matches(&input(&r, &countries)));

        let r = record("LEE", ["1 RUE", "MONTREAL QC CANADA H2X 1Y4", " ", " "]);
        assert!(rule(RuleId::Line2Canada).matches(&input(&r, &countries)));
    }

    #[test]
    fn owner_join_skips_blank_parts() {
        assert_eq!(join_owner(&["SMITH JOHN", " ", "TRUST"]), "SMITH JOHN TRUST");
        assert_eq!(join_owner(&[" ", " "]), "");
    }

    #[test]
    fn strips_only_one_leading_space() {
        assert_eq!(strip_leading_space("  PO BOX 1"), " PO BOX 1");
        assert_eq!(strip_leading_space("PO BOX 1"), "PO BOX 1");
    }
}
