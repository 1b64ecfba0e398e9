#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-row transformation of a staged parcel extract.
//!
//! Each [`SourceParcelRow`] is parsed into normalized ownership fields and
//! given its legacy join key. Rows are independent: a row that does not
//! parse cleanly still produces an update, and nothing here touches the
//! dataset itself.

pub mod join_key;
pub mod progress;

use std::collections::BTreeMap;
use std::sync::Arc;

use parcel_sync_address::{AddressParser, RuleId};
use parcel_sync_parcel_models::{OwnershipUpdate, SourceParcelRow};

use crate::join_key::{JoinKey, derive_join_key};
use crate::progress::ProgressCallback;

/// How many rows to process between progress updates.
const PROGRESS_STEP: u64 = 1_000;

/// Counters from one transform run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSummary {
    /// Rows transformed.
    pub rows: u64,
    /// Rows whose address only partially fit the chosen rule.
    pub ambiguous: u64,
    /// Rows with no parcel id.
    pub missing_parcel_ids: u64,
    /// Rows whose parcel id was too short to derive a key from.
    pub short_parcel_ids: u64,
    /// How often each rule fired.
    pub rule_counts: BTreeMap<RuleId, u64>,
}

/// Parses every row and derives its join key.
#[must_use]
pub fn transform_rows(
    parser: &AddressParser,
    rows: &[SourceParcelRow],
    progress: &Arc<dyn ProgressCallback>,
) -> (Vec<OwnershipUpdate>, TransformSummary) {
    let mut summary = TransformSummary::default();
    let mut updates = Vec::with_capacity(rows.len());

    progress.set_total(rows.len() as u64);

    for row in rows {
        let label = row.parcel_id.as_deref().unwrap_or("<no parcel id>");
        log::debug!("Working on {label}");

        let outcome = parser.parse_with_outcome(&row.address);
        if let Some(ambiguity) = &outcome.ambiguity {
            summary.ambiguous += 1;
            log::warn!("{label}: {ambiguity}");
        }
        *summary.rule_counts.entry(outcome.rule).or_default() += 1;

        let join_key = match row.parcel_id.as_deref() {
            Some(id) => match derive_join_key(id) {
                JoinKey::Derived(key) => Some(key),
                JoinKey::PassedThrough(key) => {
                    summary.short_parcel_ids += 1;
                    log::warn!("{label}: parcel id shorter than 8 characters, kept as join key");
                    Some(key)
                }
            },
            None => {
                summary.missing_parcel_ids += 1;
                None
            }
        };

        updates.push(OwnershipUpdate {
            row_id: row.row_id,
            ownership: outcome.ownership,
            join_key,
        });

        summary.rows += 1;
        if summary.rows.is_multiple_of(PROGRESS_STEP) {
            progress.inc(PROGRESS_STEP);
        }
    }

    progress.inc(summary.rows % PROGRESS_STEP);
    progress.finish(format!("Parsed {} ownership records", summary.rows));

    (updates, summary)
}
