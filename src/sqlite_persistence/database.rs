//! Opening, creating and migrating the SDK database.

use super::sdk_schema::SDK_VERSIONED_SCHEMAS;
use super::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Connection shared by every store living in the SDK database.
///
/// Each write runs in its own transaction while holding the lock, so writers
/// never interleave.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open the SDK database at `db_path`, creating it with the latest schema when
/// missing and migrating it forward otherwise.
pub fn open_sdk_database<P: AsRef<Path>>(db_path: P) -> Result<SharedConnection> {
    let path = db_path.as_ref();
    let is_new_db = !path.exists();

    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open SDK database at {:?}", path))?;

    if is_new_db {
        info!("Creating new SDK database at {:?}", path);
        latest_schema()?.create(&conn)?;
    } else {
        let raw_version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .context("Failed to read database version")?;
        let db_version = raw_version - BASE_DB_VERSION as i64;
        if db_version < 1 {
            bail!(
                "SDK database version {} is invalid (expected >= 1)",
                db_version
            );
        }

        let version_index = SDK_VERSIONED_SCHEMAS
            .iter()
            .position(|s| s.version == db_version as usize)
            .with_context(|| format!("Unknown SDK database version {}", db_version))?;
        SDK_VERSIONED_SCHEMAS[version_index]
            .validate(&conn)
            .with_context(|| {
                format!(
                    "SDK database schema validation failed for version {}",
                    db_version
                )
            })?;

        let latest_version = latest_schema()?.version;
        if (db_version as usize) < latest_version {
            info!(
                "Migrating SDK database from version {} to {}",
                db_version, latest_version
            );
            migrate(&mut conn, db_version as usize)?;
        }
    }

    Ok(Arc::new(Mutex::new(conn)))
}

/// Open a fresh in-memory SDK database with the latest schema.
pub fn open_in_memory_sdk_database() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    latest_schema()?.create(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn latest_schema() -> Result<&'static super::VersionedSchema> {
    SDK_VERSIONED_SCHEMAS
        .last()
        .context("No SDK schemas defined")
}

fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
    let tx = conn.transaction()?;
    let mut latest_from = from_version;
    for schema in SDK_VERSIONED_SCHEMAS
        .iter()
        .filter(|s| s.version > from_version)
    {
        info!(
            "Running SDK database migration from version {} to {}",
            latest_from, schema.version
        );
        if let Some(migration_fn) = schema.migration {
            migration_fn(&tx).with_context(|| {
                format!("Failed to run migration to version {}", schema.version)
            })?;
        }
        latest_from = schema.version;
    }
    tx.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
        [],
    )?;
    tx.commit()?;
    Ok(())
}
