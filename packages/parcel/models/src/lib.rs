#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parcel ownership record types.
//!
//! A county parcel extract carries the owner name and up to four free-text
//! mailing-address lines per parcel. Those are read into a
//! [`RawAddressRecord`], normalized into a [`NormalizedOwnership`], and
//! written back to the staging dataset as an [`OwnershipUpdate`] together
//! with the derived legacy join key.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Source column holding the owner name fragment.
pub const OWNER_NAME_COLUMN: &str = "owner_name";

/// Source columns holding the four mailing-address lines, in line order.
pub const MAIL_ADDRESS_COLUMNS: [&str; 4] = ["mail_addr1", "mail_addr2", "mail_addr3", "mail_addr4"];

/// Source column holding the county parcel identifier.
pub const PARCEL_ID_COLUMN: &str = "prcl_id";

/// Field the source extract ships with that must be dropped before append.
pub const SOURCE_OBJECT_ID_FIELD: &str = "OBJECTID";

/// Returns `true` when a mailing line is missing or holds only whitespace.
///
/// The county data uses a single space as its "empty" sentinel.
#[must_use]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// One parcel ownership row as received from the county extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAddressRecord {
    /// Owner name fragment (`owner_name`).
    pub owner: String,
    /// `mail_addr1`.
    pub line1: String,
    /// `mail_addr2`.
    pub line2: String,
    /// `mail_addr3`.
    pub line3: String,
    /// `mail_addr4`.
    pub line4: String,
}

impl RawAddressRecord {
    /// Builds a record from nullable column values. `NULL` becomes an empty
    /// string, which is treated the same as the blank sentinel.
    #[must_use]
    pub fn from_columns(
        owner: Option<String>,
        line1: Option<String>,
        line2: Option<String>,
        line3: Option<String>,
        line4: Option<String>,
    ) -> Self {
        Self {
            owner: owner.unwrap_or_default(),
            line1: line1.unwrap_or_default(),
            line2: line2.unwrap_or_default(),
            line3: line3.unwrap_or_default(),
            line4: line4.unwrap_or_default(),
        }
    }
}

/// Normalized ownership fields. Every field defaults to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedOwnership {
    /// Owner name(s).
    pub owner: String,
    /// Street address or PO box.
    pub address: String,
    /// City.
    pub city: String,
    /// State or province code.
    pub state: String,
    /// ZIP or postal code (plus anything trailing it).
    pub zip: String,
    /// Country name. Empty for domestic addresses.
    pub country: String,
}

impl NormalizedOwnership {
    /// A record carrying only the owner name.
    #[must_use]
    pub fn owner_only(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }
}

/// A staged source row: its row handle, parcel identifier, and raw address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceParcelRow {
    /// Opaque row handle in the staging dataset.
    pub row_id: i64,
    /// County parcel identifier (`prcl_id`).
    pub parcel_id: Option<String>,
    /// Owner and mailing-address columns.
    pub address: RawAddressRecord,
}

/// The values written back to one staged row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipUpdate {
    /// Row handle from [`SourceParcelRow::row_id`].
    pub row_id: i64,
    /// Parsed ownership fields.
    pub ownership: NormalizedOwnership,
    /// Derived legacy parcel join key. `None` when the row has no parcel id.
    pub join_key: Option<String>,
}

/// Column data type for added fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// Variable-length text.
    Text,
    /// 64-bit integer.
    Long,
    /// Double precision float.
    Double,
    /// Timestamp.
    Date,
}

/// A field to add to a dataset: `(name, type, alias, length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Column name.
    pub name: &'static str,
    /// Column type.
    pub field_type: FieldType,
    /// Display alias.
    pub alias: &'static str,
    /// Maximum length for text fields.
    pub length: u32,
}

impl FieldDefinition {
    const fn text(name: &'static str, alias: &'static str, length: u32) -> Self {
        Self {
            name,
            field_type: FieldType::Text,
            alias,
            length,
        }
    }
}

/// Output fields added to the staged extract before parsing.
pub const OWNERSHIP_FIELDS: [FieldDefinition; 7] = [
    FieldDefinition::text("owner", "owner", 255),
    FieldDefinition::text("owner_address", "address", 100),
    FieldDefinition::text("owner_city", "owner_city", 50),
    FieldDefinition::text("owner_state", "owner_state", 25),
    FieldDefinition::text("owner_zip", "owner_zip", 50),
    FieldDefinition::text("owner_country", "owner_country", 50),
    FieldDefinition::text("prcl_id_join", "prcl_id_join", 50),
];
