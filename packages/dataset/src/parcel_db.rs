//! `DuckDB`-backed parcel datasets.
//!
//! The destination table lives in a `DuckDB` file. Extracts are read from
//! the file geodatabase through the `spatial` extension (`ST_Read`), which
//! is only loaded when something is staged.

use std::path::Path;

use chrono::{DateTime, Utc};
use duckdb::{AccessMode, Connection};
use parcel_sync_parcel_models::{
    FieldDefinition, FieldType, MAIL_ADDRESS_COLUMNS, OWNER_NAME_COLUMN, OWNERSHIP_FIELDS,
    OwnershipUpdate, PARCEL_ID_COLUMN, RawAddressRecord, SourceParcelRow,
};

use crate::{DatasetError, DatasetGateway, quote_ident, quote_literal};

/// Rows per INSERT chunk when loading parsed updates.
const CHUNK_SIZE: usize = 2_000;

/// Temporary table parsed updates are loaded into before being joined
/// onto the staging table.
const UPDATES_TABLE: &str = "ownership_updates";

fn default_staging_table() -> String {
    "parcel_staging".to_string()
}

fn default_timestamp_column() -> String {
    "poly_creat".to_string()
}

/// Table names for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    /// Table consumers read.
    pub destination_table: String,
    /// Table the extract is prepared in.
    pub staging_table: String,
    /// Destination column holding each parcel's creation time.
    pub timestamp_column: String,
}

impl DatasetConfig {
    #[must_use]
    pub fn new(destination_table: impl Into<String>) -> Self {
        Self {
            destination_table: destination_table.into(),
            staging_table: default_staging_table(),
            timestamp_column: default_timestamp_column(),
        }
    }

    #[must_use]
    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }
}

/// Parcel datasets in one `DuckDB` database.
pub struct ParcelDb {
    conn: Connection,
    config: DatasetConfig,
    spatial_loaded: bool,
}

impl ParcelDb {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the parent directory cannot be created
    /// or the connection fails.
    pub fn open(path: &Path, config: DatasetConfig) -> Result<Self, DatasetError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| DatasetError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        log::info!("Opening parcel database {}", path.display());
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn, config))
    }

    /// Opens an existing database without write access. Nothing is created
    /// on disk.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::MissingDatabase`] if `path` does not exist,
    /// or [`DatasetError::DuckDb`] if the connection fails.
    pub fn open_read_only(path: &Path, config: DatasetConfig) -> Result<Self, DatasetError> {
        if !path.is_file() {
            return Err(DatasetError::MissingDatabase(path.display().to_string()));
        }

        log::info!("Opening parcel database {} read-only", path.display());
        let flags = duckdb::Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, flags)?;
        Ok(Self::from_connection(conn, config))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub const fn from_connection(conn: Connection, config: DatasetConfig) -> Self {
        Self {
            conn,
            config,
            spatial_loaded: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DatasetConfig {
        &self.config
    }

    fn staging(&self) -> String {
        quote_ident(&self.config.staging_table)
    }

    fn destination(&self) -> String {
        quote_ident(&self.config.destination_table)
    }

    fn ensure_spatial(&mut self) -> Result<(), DatasetError> {
        if !self.spatial_loaded {
            self.conn.execute_batch("INSTALL spatial; LOAD spatial;")?;
            self.spatial_loaded = true;
        }
        Ok(())
    }

    /// Column names of `table` in declaration order. Empty if the table
    /// does not exist.
    fn columns(&self, table: &str) -> Result<Vec<String>, DatasetError> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let rows = stmt.query_map([table], |row| row.get::<_, String>(0))?;
        let mut columns = Vec::new();
        for column in rows {
            columns.push(column?);
        }
        Ok(columns)
    }

    fn require_table(&self, table: &str) -> Result<Vec<String>, DatasetError> {
        let columns = self.columns(table)?;
        if columns.is_empty() {
            return Err(DatasetError::MissingTable(table.to_string()));
        }
        Ok(columns)
    }
}

fn sql_type(field: &FieldDefinition) -> &'static str {
    match field.field_type {
        FieldType::Text => "VARCHAR",
        FieldType::Long => "BIGINT",
        FieldType::Double => "DOUBLE",
        FieldType::Date => "TIMESTAMP",
    }
}

/// Values of one update in [`OWNERSHIP_FIELDS`] order.
fn field_values(update: &OwnershipUpdate) -> [Option<&str>; 7] {
    let o = &update.ownership;
    [
        Some(o.owner.as_str()),
        Some(o.address.as_str()),
        Some(o.city.as_str()),
        Some(o.state.as_str()),
        Some(o.zip.as_str()),
        Some(o.country.as_str()),
        update.join_key.as_deref(),
    ]
}

impl DatasetGateway for ParcelDb {
    fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, DatasetError> {
        let column = quote_ident(&self.config.timestamp_column);
        let sql = format!(
            "SELECT epoch_ms({column}) FROM {} WHERE {column} IS NOT NULL
             ORDER BY {column} DESC LIMIT 1",
            self.destination()
        );

        let millis = match self.conn.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
            Ok(v) => v,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(DatasetError::DuckDb(e)),
        };

        Ok(DateTime::from_timestamp_millis(millis))
    }

    fn stage_extract(&mut self, gdb_path: &Path, layer: &str) -> Result<(), DatasetError> {
        self.ensure_spatial()?;

        log::info!(
            "Staging layer {layer} from {} into {}",
            gdb_path.display(),
            self.config.staging_table
        );
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM ST_Read({}, layer = {})",
            self.staging(),
            quote_literal(&gdb_path.to_string_lossy()),
            quote_literal(layer),
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn row_count(&self) -> Result<u64, DatasetError> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", self.staging()), [], |row| {
                    row.get(0)
                })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn delete_field(&mut self, name: &str) -> Result<(), DatasetError> {
        log::info!("Deleting field {name}");
        self.conn.execute_batch(&format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            self.staging(),
            quote_ident(name)
        ))?;
        Ok(())
    }

    fn add_fields(&mut self, fields: &[FieldDefinition]) -> Result<(), DatasetError> {
        let staging = self.staging();
        for field in fields {
            log::info!("Adding field {} ({}, {})", field.name, field.field_type, field.length);
            let column = quote_ident(field.name);
            self.conn.execute_batch(&format!(
                "ALTER TABLE {staging} ADD COLUMN IF NOT EXISTS {column} {};
                 COMMENT ON COLUMN {staging}.{column} IS {};",
                sql_type(field),
                quote_literal(field.alias),
            ))?;
        }
        Ok(())
    }

    fn read_rows(&self) -> Result<Vec<SourceParcelRow>, DatasetError> {
        let text = |name: &str| format!("CAST({} AS VARCHAR)", quote_ident(name));
        let sql = format!(
            "SELECT rowid, {}, {}, {}, {}, {}, {} FROM {} ORDER BY rowid",
            text(PARCEL_ID_COLUMN),
            text(OWNER_NAME_COLUMN),
            text(MAIL_ADDRESS_COLUMNS[0]),
            text(MAIL_ADDRESS_COLUMNS[1]),
            text(MAIL_ADDRESS_COLUMNS[2]),
            text(MAIL_ADDRESS_COLUMNS[3]),
            self.staging(),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(SourceParcelRow {
                row_id: row.get(0)?,
                parcel_id: row.get(1)?,
                address: RawAddressRecord::from_columns(
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        log::info!("Read {} rows from {}", out.len(), self.config.staging_table);
        Ok(out)
    }

    fn write_updates(&mut self, updates: &[OwnershipUpdate]) -> Result<u64, DatasetError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let column_defs = OWNERSHIP_FIELDS
            .iter()
            .map(|f| format!("{} {}", quote_ident(f.name), sql_type(f)))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE {UPDATES_TABLE} (row_id BIGINT, {column_defs})"
        ))?;

        let placeholders = format!("(?{})", ", ?".repeat(OWNERSHIP_FIELDS.len()));
        for chunk in updates.chunks(CHUNK_SIZE) {
            let mut sql = format!("INSERT INTO {UPDATES_TABLE} VALUES ");
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&placeholders);
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let mut param_idx = 1usize;
            for update in chunk {
                stmt.raw_bind_parameter(param_idx, update.row_id)?;
                for (offset, value) in field_values(update).into_iter().enumerate() {
                    stmt.raw_bind_parameter(param_idx + 1 + offset, value)?;
                }
                param_idx += 1 + OWNERSHIP_FIELDS.len();
            }
            stmt.raw_execute()?;
        }

        let staging = self.staging();
        let assignments = OWNERSHIP_FIELDS
            .iter()
            .map(|f| {
                let column = quote_ident(f.name);
                format!("{column} = u.{column}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let updated = self.conn.execute(
            &format!(
                "UPDATE {staging} SET {assignments}
                 FROM {UPDATES_TABLE} AS u WHERE {staging}.rowid = u.row_id"
            ),
            [],
        )?;

        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {UPDATES_TABLE}"))?;

        log::info!("Wrote ownership fields to {updated} rows");
        Ok(u64::try_from(updated).unwrap_or(0))
    }

    fn truncate_destination(&mut self) -> Result<(), DatasetError> {
        log::info!("Truncating {}", self.config.destination_table);
        self.require_table(&self.config.destination_table)?;
        self.conn
            .execute_batch(&format!("TRUNCATE {}", self.destination()))?;
        Ok(())
    }

    fn append_to_destination(&mut self) -> Result<u64, DatasetError> {
        let destination_columns = self.require_table(&self.config.destination_table)?;
        let staging_columns = self.require_table(&self.config.staging_table)?;

        let mut targets = Vec::new();
        let mut sources = Vec::new();
        for column in &destination_columns {
            if let Some(source) = staging_columns
                .iter()
                .find(|s| s.eq_ignore_ascii_case(column))
            {
                targets.push(quote_ident(column));
                sources.push(quote_ident(source));
            }
        }

        if targets.is_empty() {
            return Err(DatasetError::NoCommonColumns {
                staging: self.config.staging_table.clone(),
                destination: self.config.destination_table.clone(),
            });
        }

        let skipped = staging_columns.len() - sources.len();
        if skipped > 0 {
            log::debug!("{skipped} staging columns have no destination counterpart");
        }

        log::info!(
            "Appending {} into {}",
            self.config.staging_table,
            self.config.destination_table
        );
        let appended = self.conn.execute(
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.destination(),
                targets.join(", "),
                sources.join(", "),
                self.staging(),
            ),
            [],
        )?;
        Ok(u64::try_from(appended).unwrap_or(0))
    }

    fn discard_staging(&mut self) -> Result<(), DatasetError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", self.staging()))?;
        Ok(())
    }
}
