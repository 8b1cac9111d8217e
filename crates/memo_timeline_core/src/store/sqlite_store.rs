//! SQLite-backed collection store.
//!
//! # Responsibility
//! - Persist records as ordered named text fields.
//! - Serve the `CollectionStore` contract for the CLI and integration tests.
//!
//! # Invariants
//! - Each field write is one `UPDATE` statement; partial writes cannot happen.
//! - Record creation inserts the record and its fields in one transaction.

use crate::db::{open_db, open_db_in_memory};
use crate::model::memo::RecordId;
use crate::model::timeline::{RecordContext, RecordRef};
use crate::store::{derive_snippet, CollectionStore, StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;

/// Collection store over one SQLite connection.
///
/// The connection is guarded by a mutex; SQLite statements are short, so the
/// guard is held only for the duration of one statement or transaction.
pub struct SqliteCollectionStore {
    conn: Mutex<Connection>,
}

impl SqliteCollectionStore {
    /// Opens (and migrates) a collection file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a fresh in-memory collection.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection that already went through `db::open_*`.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Creates a record with ordered `(name, value)` fields.
    pub fn create_record(
        &self,
        deck_name: Option<&str>,
        fields: &[(&str, &str)],
    ) -> StoreResult<RecordId> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO records (deck_name) VALUES (?1);",
            params![deck_name],
        )?;
        let record_id = tx.last_insert_rowid();
        for (ord, (name, value)) in fields.iter().enumerate() {
            let ord = i64::try_from(ord)
                .map_err(|_| StoreError::InvalidData("too many fields".to_string()))?;
            tx.execute(
                "INSERT INTO record_fields (record_id, ord, name, value)
                 VALUES (?1, ?2, ?3, ?4);",
                params![record_id, ord, name, value],
            )?;
        }
        tx.commit()?;
        Ok(record_id)
    }

    /// Deletes a record and its fields.
    pub fn delete_record(&self, record_id: RecordId) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM records WHERE id = ?1;", [record_id])?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound(record_id));
        }
        Ok(())
    }
}

impl CollectionStore for SqliteCollectionStore {
    fn query_records_with_field(&self, field: &str) -> StoreResult<Vec<RecordId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT record_id
             FROM record_fields
             WHERE name = ?1
               AND length(trim(value)) > 0
             ORDER BY record_id ASC;",
        )?;
        let mut rows = stmt.query([field])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn read_field(&self, record_id: RecordId, field: &str) -> StoreResult<String> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM record_fields WHERE record_id = ?1 AND name = ?2;",
                params![record_id, field],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(value) => Ok(value),
            None if record_exists(&conn, record_id)? => Err(StoreError::FieldMissing {
                record_id,
                field: field.to_string(),
            }),
            None => Err(StoreError::RecordNotFound(record_id)),
        }
    }

    fn write_field(&self, record_id: RecordId, field: &str, raw: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE record_fields SET value = ?3 WHERE record_id = ?1 AND name = ?2;",
                params![record_id, field, raw],
            )
            .map_err(|err| StoreError::WriteRejected {
                record_id,
                reason: err.to_string(),
            })?;
        if changed == 1 {
            return Ok(());
        }
        if record_exists(&conn, record_id)? {
            Err(StoreError::FieldMissing {
                record_id,
                field: field.to_string(),
            })
        } else {
            Err(StoreError::RecordNotFound(record_id))
        }
    }

    fn resolve_record(&self, record_id: RecordId) -> StoreResult<RecordRef> {
        let conn = self.conn.lock();
        if record_exists(&conn, record_id)? {
            Ok(RecordRef::for_record(record_id))
        } else {
            Err(StoreError::RecordNotFound(record_id))
        }
    }

    fn record_context(&self, record_id: RecordId) -> StoreResult<Option<RecordContext>> {
        let conn = self.conn.lock();
        let deck_name: Option<Option<String>> = conn
            .query_row(
                "SELECT deck_name FROM records WHERE id = ?1;",
                [record_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(deck_name) = deck_name else {
            return Err(StoreError::RecordNotFound(record_id));
        };
        let first_field: Option<String> = conn
            .query_row(
                "SELECT value FROM record_fields WHERE record_id = ?1 ORDER BY ord ASC LIMIT 1;",
                [record_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(Some(RecordContext {
            deck_name,
            snippet: first_field.as_deref().and_then(derive_snippet),
        }))
    }
}

fn record_exists(conn: &Connection, record_id: RecordId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1);",
        [record_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
