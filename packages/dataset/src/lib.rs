#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parcel dataset storage.
//!
//! A run works on two tables: a staging table that receives the raw
//! extract and is annotated in place, and the destination table that is
//! replaced wholesale once annotation is done. [`DatasetGateway`] is the
//! narrow surface the sync pipeline needs; [`parcel_db::ParcelDb`] is the
//! `DuckDB` implementation.

pub mod parcel_db;

use std::path::Path;

use chrono::{DateTime, Utc};
use parcel_sync_parcel_models::{FieldDefinition, OwnershipUpdate, SourceParcelRow};

pub use parcel_db::{DatasetConfig, ParcelDb};

/// Errors from dataset operations.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The database file does not exist and was not to be created.
    #[error("Database {0} does not exist")]
    MissingDatabase(String),

    /// A table the operation needs does not exist.
    #[error("Table {0} does not exist")]
    MissingTable(String),

    /// Staging and destination share no columns, so nothing can be appended.
    #[error("No columns in common between {staging} and {destination}")]
    NoCommonColumns {
        /// Staging table name.
        staging: String,
        /// Destination table name.
        destination: String,
    },
}

/// Storage operations used by a sync run.
///
/// "Staging" is the freshly extracted copy being prepared; "destination"
/// is the dataset consumers read.
pub trait DatasetGateway: Send {
    /// Latest non-null value of the destination's timestamp column, or
    /// `None` if it has no rows with one.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the query fails.
    fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, DatasetError>;

    /// Replaces the staging table with `layer` read from the file
    /// geodatabase at `gdb_path`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the geodatabase cannot be read.
    fn stage_extract(&mut self, gdb_path: &Path, layer: &str) -> Result<(), DatasetError>;

    /// Rows in the staging table.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the query fails.
    fn row_count(&self) -> Result<u64, DatasetError>;

    /// Drops a staging column. Dropping a column that is not there is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the statement fails.
    fn delete_field(&mut self, name: &str) -> Result<(), DatasetError>;

    /// Adds columns to the staging table, skipping any that already exist.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if a statement fails.
    fn add_fields(&mut self, fields: &[FieldDefinition]) -> Result<(), DatasetError>;

    /// Reads the ownership source columns of every staged row.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the query fails.
    fn read_rows(&self) -> Result<Vec<SourceParcelRow>, DatasetError>;

    /// Writes parsed ownership fields back onto staged rows. Returns the
    /// number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the write fails.
    fn write_updates(&mut self, updates: &[OwnershipUpdate]) -> Result<u64, DatasetError>;

    /// Deletes every destination row.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the statement fails.
    fn truncate_destination(&mut self) -> Result<(), DatasetError>;

    /// Appends the staging table to the destination without checking that
    /// the schemas match: columns are paired by name and anything present
    /// on only one side is left out. Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the tables share no columns or the
    /// insert fails.
    fn append_to_destination(&mut self) -> Result<u64, DatasetError>;

    /// Drops the staging table.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the statement fails.
    fn discard_staging(&mut self) -> Result<(), DatasetError>;
}

/// Quotes an SQL identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes an SQL string literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
