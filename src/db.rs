use crate::classifier;
use crate::entities::SwiftCode;
use crate::error::{StoreError, StoreResult};
use crate::reconciliation::SwiftCodeSink;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "SELECT swift_code, bank_name, country_iso2, country_name,
                address, is_headquarter, hq_swift_code
         FROM swift_codes";

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "journal mode set");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS swift_codes (
            swift_code TEXT PRIMARY KEY,
            bank_name TEXT NOT NULL,
            country_iso2 TEXT NOT NULL,
            country_name TEXT NOT NULL,
            address TEXT NOT NULL,
            is_headquarter INTEGER NOT NULL,
            hq_swift_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_hq_swift_code ON swift_codes(hq_swift_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_country_iso2 ON swift_codes(UPPER(country_iso2))",
        [],
    )?;

    Ok(())
}

fn row_to_swift_code(row: &Row<'_>) -> rusqlite::Result<SwiftCode> {
    Ok(SwiftCode {
        swift_code: row.get(0)?,
        bank_name: row.get(1)?,
        country_iso2: row.get(2)?,
        country_name: row.get(3)?,
        address: row.get(4)?,
        is_headquarter: row.get(5)?,
        hq_swift_code: row.get(6)?,
    })
}

// ============================================================================
// BULK WRITE
// ============================================================================

/// Upsert a whole batch in one SQL transaction.
///
/// Either every record lands or none does. Returns the number of distinct
/// codes written.
pub fn save_swift_codes(conn: &Connection, records: &[SwiftCode]) -> StoreResult<usize> {
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO swift_codes (
                swift_code, bank_name, country_iso2, country_name,
                address, is_headquarter, hq_swift_code
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(swift_code) DO UPDATE SET
                bank_name = excluded.bank_name,
                country_iso2 = excluded.country_iso2,
                country_name = excluded.country_name,
                address = excluded.address,
                is_headquarter = excluded.is_headquarter,
                hq_swift_code = excluded.hq_swift_code",
        )?;

        for record in records {
            stmt.execute(params![
                record.swift_code,
                record.bank_name,
                record.country_iso2,
                record.country_name,
                record.address,
                record.is_headquarter,
                record.hq_swift_code,
            ])?;
        }
    }

    tx.commit()?;

    // Upserts collapse repeated codes into one row each
    let written: HashSet<&str> = records.iter().map(|r| r.swift_code.as_str()).collect();
    info!(rows = records.len(), codes = written.len(), "bulk save committed");

    Ok(written.len())
}

impl SwiftCodeSink for Connection {
    fn save_all(&mut self, records: &[SwiftCode]) -> StoreResult<usize> {
        save_swift_codes(self, records)
    }
}

// ============================================================================
// LOOKUPS
// ============================================================================

/// Exact primary-key lookup
pub fn find_by_code(conn: &Connection, swift_code: &str) -> StoreResult<Option<SwiftCode>> {
    let sql = format!("{SELECT_COLUMNS} WHERE swift_code = ?1");

    let record = conn
        .query_row(&sql, [swift_code], row_to_swift_code)
        .optional()?;

    Ok(record)
}

/// All branches pointing at a headquarters code
pub fn find_by_hq_code(conn: &Connection, hq_swift_code: &str) -> StoreResult<Vec<SwiftCode>> {
    let sql = format!("{SELECT_COLUMNS} WHERE hq_swift_code = ?1 ORDER BY swift_code");
    let mut stmt = conn.prepare(&sql)?;

    let records = stmt
        .query_map([hq_swift_code], row_to_swift_code)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// All codes for a country, ISO2 compared case-insensitively
pub fn find_by_country(conn: &Connection, country_iso2: &str) -> StoreResult<Vec<SwiftCode>> {
    let sql = format!(
        "{SELECT_COLUMNS} WHERE UPPER(country_iso2) = UPPER(?1) ORDER BY swift_code"
    );
    let mut stmt = conn.prepare(&sql)?;

    let records = stmt
        .query_map([country_iso2], row_to_swift_code)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn count_swift_codes(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM swift_codes", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// SINGLE-RECORD MUTATION
// ============================================================================

/// Insert one new record.
///
/// The headquarters flag is recomputed from the code. A new branch picks up
/// an existing headquarters with the same prefix; a new headquarters adopts
/// existing branches that have none yet.
pub fn insert_swift_code(conn: &Connection, record: &SwiftCode) -> StoreResult<SwiftCode> {
    let mut record = SwiftCode::new(
        record.swift_code.clone(),
        record.bank_name.clone(),
        record.country_iso2.clone(),
        record.country_name.clone(),
        record.address.clone(),
    );
    let prefix = classifier::institution_prefix(&record.swift_code).map(str::to_string);

    let tx = conn.unchecked_transaction()?;

    if record.is_branch() {
        if let Some(prefix) = &prefix {
            record.hq_swift_code = tx
                .query_row(
                    "SELECT swift_code FROM swift_codes
                     WHERE is_headquarter = 1 AND substr(swift_code, 1, 8) = ?1
                     ORDER BY rowid DESC LIMIT 1",
                    [prefix],
                    |row| row.get(0),
                )
                .optional()?;
        }
    }

    let result = tx.execute(
        "INSERT INTO swift_codes (
            swift_code, bank_name, country_iso2, country_name,
            address, is_headquarter, hq_swift_code
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.swift_code,
            record.bank_name,
            record.country_iso2,
            record.country_name,
            record.address,
            record.is_headquarter,
            record.hq_swift_code,
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::Duplicate(record.swift_code));
        }
        Err(e) => return Err(e.into()),
    }

    if record.is_headquarter {
        if let Some(prefix) = &prefix {
            let adopted = tx.execute(
                "UPDATE swift_codes SET hq_swift_code = ?1
                 WHERE is_headquarter = 0
                   AND hq_swift_code IS NULL
                   AND substr(swift_code, 1, 8) = ?2",
                params![record.swift_code, prefix],
            )?;
            debug!(hq = %record.swift_code, adopted, "linked existing branches");
        }
    }

    tx.commit()?;
    Ok(record)
}

/// Returns whether a record was removed
pub fn delete_swift_code(conn: &Connection, swift_code: &str) -> StoreResult<bool> {
    let removed = conn.execute("DELETE FROM swift_codes WHERE swift_code = ?1", [swift_code])?;

    Ok(removed > 0)
}

// ============================================================================
// TESTS
// ============================================================================
