//! Street / PO-box selection for the line above the city-state-zip line.
//!
//! Which PO-box spellings are recognized and what happens when no house
//! number can be found depends on which mailing line carried the
//! city/state/zip, so each variant is spelled out in [`CityLine`].

use crate::patterns::{street_after_number, trailing_po_box};

/// Placeholder written when a street line has no recognizable house number.
pub const NO_STREET_SENTINEL: &str = "None";

/// Which mailing line held the city, state, and zip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CityLine {
    /// `mail_addr4`; the street candidate is `mail_addr3`.
    Four,
    /// `mail_addr3`; the street candidate is `mail_addr2`.
    Three,
    /// `mail_addr2`; the street candidate is `mail_addr1`.
    Two,
}

impl CityLine {
    const fn po_prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Four => &["PO", "P O"],
            Self::Three => &["PO", "P O", "P.O."],
            Self::Two => &["PO", "P.O.", "P O", "P  O"],
        }
    }

    const fn po_box_spellings(self) -> &'static [&'static str] {
        match self {
            Self::Four => &["PO BOX", "P O BOX", "P.O. BOX"],
            Self::Three | Self::Two => &["PO BOX", "P O BOX"],
        }
    }
}

/// How the street value was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreetSelection {
    /// The candidate line was kept as written.
    Literal(String),
    /// The street text after the house number.
    Numbered(String),
    /// Only the PO box portion of the line.
    PoBox(String),
    /// Nothing usable; [`NO_STREET_SENTINEL`] was written.
    Missing,
}

impl StreetSelection {
    /// The value written to the address field.
    #[must_use]
    pub fn into_address(self) -> String {
        match self {
            Self::Literal(s) | Self::Numbered(s) | Self::PoBox(s) => s,
            Self::Missing => NO_STREET_SENTINEL.to_string(),
        }
    }
}

/// Chooses the address value from the street candidate `text`.
#[must_use]
pub fn select_street(text: &str, city_line: CityLine) -> StreetSelection {
    if city_line
        .po_prefixes()
        .iter()
        .any(|prefix| text.starts_with(prefix))
    {
        return StreetSelection::Literal(text.to_string());
    }

    if city_line
        .po_box_spellings()
        .iter()
        .any(|spelling| text.contains(spelling))
    {
        if city_line == CityLine::Two {
            return trailing_po_box(text).map_or_else(
                || StreetSelection::Literal(text.to_string()),
                StreetSelection::PoBox,
            );
        }
        return StreetSelection::Literal(text.to_string());
    }

    match city_line {
        CityLine::Four => {
            street_after_number(text).map_or(StreetSelection::Missing, StreetSelection::Numbered)
        }
        // Spelled-out house numbers ("ONE MARKET PLAZA") stay as written.
        CityLine::Three => {
            if text.starts_with("ONE ") || text.starts_with("TWO ") {
                return StreetSelection::Literal(text.to_string());
            }
            street_after_number(text).map_or(StreetSelection::Missing, StreetSelection::Numbered)
        }
        CityLine::Two => {
            if text.starts_with("ONE") {
                return StreetSelection::Literal(text.to_string());
            }
            street_after_number(text).map_or_else(
                || StreetSelection::Literal(text.to_string()),
                StreetSelection::Numbered,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn po_prefix_kept_verbatim() {
        for line in [CityLine::Four, CityLine::Three, CityLine::Two] {
            assert_eq!(
                select_street("PO BOX 550", line),
                StreetSelection::Literal("PO BOX 550".to_string())
            );
        }
    }

    #[test]
    fn dotted_prefix_depends_on_city_line() {
        assert_eq!(
            select_street("P.O. DRAWER 9", CityLine::Three),
            StreetSelection::Literal("P.O. DRAWER 9".to_string())
        );
        // Line 4 does not know the dotted prefix and the text has no number.
        assert_eq!(select_street("P.O. DRAWER", CityLine::Four), StreetSelection::Missing);
    }

    #[test]
    fn embedded_po_box_kept_for_upper_lines() {
        assert_eq!(
            select_street("C/O BANK PO BOX 12", CityLine::Four),
            StreetSelection::Literal("C/O BANK PO BOX 12".to_string())
        );
        assert_eq!(
            select_street("TRUST DEPT P O BOX 9", CityLine::Three),
            StreetSelection::Literal("TRUST DEPT P O BOX 9".to_string())
        );
    }

    #[test]
    fn embedded_po_box_extracted_on_line_one() {
        assert_eq!(
            select_street("ATTN TAX DEPT PO BOX 1234", CityLine::Two),
            StreetSelection::PoBox("PO BOX 1234".to_string())
        );
    }

    #[test]
    fn embedded_po_box_falls_back_to_line_when_unextractable() {
        assert_eq!(
            select_street("x PO BOX 5", CityLine::Two),
            StreetSelection::Literal("x PO BOX 5".to_string())
        );
    }

    #[test]
    fn spelled_numbers_on_line_three() {
        assert_eq!(
            select_street("TWO RIVERS DR", CityLine::Three),
            StreetSelection::Literal("TWO RIVERS DR".to_string())
        );
        assert_eq!(select_street("TWO RIVERS DR", CityLine::Four), StreetSelection::Missing);
    }

    #[test]
    fn numbered_street_loses_house_number() {
        assert_eq!(
            select_street("123 MAIN ST", CityLine::Four),
            StreetSelection::Numbered("MAIN ST".to_string())
        );
        assert_eq!(
            select_street("2201 KELLER RD", CityLine::Two),
            StreetSelection::Numbered("KELLER RD".to_string())
        );
    }

    #[test]
    fn missing_number_writes_sentinel_except_on_line_one() {
        assert_eq!(
            select_street("RANCH HOUSE", CityLine::Three).into_address(),
            NO_STREET_SENTINEL
        );
        assert_eq!(
            select_street("RANCH HOUSE", CityLine::Two).into_address(),
            "RANCH HOUSE"
        );
    }

    #[test]
    fn line_one_spelled_number_beats_house_number() {
        assert_eq!(
            select_street("ONE 2ND ST", CityLine::Two),
            StreetSelection::Literal("ONE 2ND ST".to_string())
        );
    }
}
