//! Compiled mailing-line patterns.
//!
//! All matching is case-sensitive and unanchored: the first (leftmost)
//! match wins and nothing is retried with an alternate pattern.

use regex::Regex;
use std::sync::LazyLock;

/// `<city> <1-2 letter state> <zip...>`, where the zip part starts with a
/// digit.
static CITY_STATE_ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+?)\s([A-Z]{1,2})\s(\d.*)").expect("valid regex"));

/// `<city> <province> CANADA <postal code>`.
static CANADA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+?)\s([A-Z]{1,2})\s(CANADA)\s(.*)").expect("valid regex"));

/// `<city> BRAZIL <postal code>`.
static BRAZIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+?)\s(BRAZIL)\s(.*)").expect("valid regex"));

/// A house number of 1-5 digits followed by the street text.
static STREET_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,5})(\D+.+)").expect("valid regex"));

/// A PO box preceded by other text, e.g. `"C/O JANE DOE PO BOX 12"`.
static TRAILING_PO_BOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^x]+)\W(P\s*O BOX\W*[0-9]{1,6})").expect("valid regex"));

/// City, state, and zip captured from one mailing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityStateZip {
    /// City text before the state code.
    pub city: String,
    /// One or two letter state code.
    pub state: String,
    /// Zip code and anything after it.
    pub zip: String,
}

/// A foreign address captured by one of the country patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignLocality {
    /// City text.
    pub city: String,
    /// Province code, empty when the country has none in the pattern.
    pub state: String,
    /// Postal code.
    pub zip: String,
    /// Country name as written.
    pub country: String,
}

/// Matches the city/state/zip pattern.
#[must_use]
pub fn city_state_zip(line: &str) -> Option<CityStateZip> {
    let caps = CITY_STATE_ZIP_RE.captures(line)?;
    Some(CityStateZip {
        city: caps[1].to_string(),
        state: caps[2].to_string(),
        zip: caps[3].to_string(),
    })
}

/// Matches `<city> <province> CANADA <postal code>`.
#[must_use]
pub fn canada(line: &str) -> Option<ForeignLocality> {
    let caps = CANADA_RE.captures(line)?;
    Some(ForeignLocality {
        city: caps[1].to_string(),
        state: caps[2].to_string(),
        zip: caps[4].to_string(),
        country: caps[3].to_string(),
    })
}

/// Matches `<city> BRAZIL <postal code>`.
#[must_use]
pub fn brazil(line: &str) -> Option<ForeignLocality> {
    let caps = BRAZIL_RE.captures(line)?;
    Some(ForeignLocality {
        city: caps[1].to_string(),
        state: String::new(),
        zip: caps[3].to_string(),
        country: caps[2].to_string(),
    })
}

/// Returns the street text following the first house number, trimmed.
///
/// Anything before the house number (care-of names, unit labels) is
/// dropped along with the number itself.
#[must_use]
pub fn street_after_number(text: &str) -> Option<String> {
    let caps = STREET_NUMBER_RE.captures(text)?;
    let street = caps[2].trim();
    if street.is_empty() {
        return None;
    }
    Some(street.to_string())
}

/// Extracts just the PO box from a line that has other text before it.
#[must_use]
pub fn trailing_po_box(text: &str) -> Option<String> {
    TRAILING_PO_BOX_RE
        .captures(text)
        .map(|caps| caps[2].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multi_word_city() {
        assert_eq!(
            city_state_zip("SOUTH LAKE TAHOE CA 96150"),
            Some(CityStateZip {
                city: "SOUTH LAKE TAHOE".to_string(),
                state: "CA".to_string(),
                zip: "96150".to_string(),
            })
        );
    }

    #[test]
    fn keeps_zip_plus_four_and_trailing_text() {
        let csz = city_state_zip("RENO NV 89501-1234 USA").unwrap();
        assert_eq!(csz.city, "RENO");
        assert_eq!(csz.state, "NV");
        assert_eq!(csz.zip, "89501-1234 USA");
    }

    #[test]
    fn zip_must_start_with_digit() {
        assert_eq!(city_state_zip("TOKYO JP ABC"), None);
        assert_eq!(city_state_zip("JAPAN"), None);
    }

    #[test]
    fn state_code_is_case_sensitive() {
        assert_eq!(city_state_zip("reno nv 89501"), None);
    }

    #[test]
    fn matches_canada() {
        let loc = canada("VANCOUVER BC CANADA V6B 1A1").unwrap();
        assert_eq!(loc.city, "VANCOUVER");
        assert_eq!(loc.state, "BC");
        assert_eq!(loc.country, "CANADA");
        assert_eq!(loc.zip, "V6B 1A1");
    }

    #[test]
    fn matches_brazil() {
        let loc = brazil("SAO PAULO BRAZIL 01310-100").unwrap();
        assert_eq!(loc.city, "SAO PAULO");
        assert_eq!(loc.state, "");
        assert_eq!(loc.country, "BRAZIL");
        assert_eq!(loc.zip, "01310-100");
    }

    #[test]
    fn strips_house_number() {
        assert_eq!(street_after_number("123 MAIN ST"), Some("MAIN ST".to_string()));
    }

    #[test]
    fn drops_text_before_house_number() {
        assert_eq!(
            street_after_number("C/O JANE DOE 4500 LAKE TAHOE BLVD"),
            Some("LAKE TAHOE BLVD".to_string())
        );
    }

    #[test]
    fn no_house_number_is_no_match() {
        assert_eq!(street_after_number("ONE MARKET PLAZA"), None);
        assert_eq!(street_after_number("123"), None);
    }

    #[test]
    fn extracts_po_box_after_name() {
        assert_eq!(
            trailing_po_box("ATTN TAX DEPT PO BOX 1234"),
            Some("PO BOX 1234".to_string())
        );
        assert_eq!(
            trailing_po_box("C/O SMITH, P O BOX 77"),
            Some("P O BOX 77".to_string())
        );
    }

    #[test]
    fn po_box_pattern_rejects_text_with_lowercase_x() {
        assert_eq!(trailing_po_box("xx PO BOX 12"), None);
    }
}
