pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode};
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the store at the given path, with all extensions
/// loaded, schema initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    load_sqlite_vec();

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets interactive reads proceed while maintenance writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    ensure_intact(&conn)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory store with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// A store opened by [`open_or_recover`].
pub struct OpenedDatabase {
    pub conn: Connection,
    /// Where the corrupted file was moved, if recovery happened.
    pub recovered_from: Option<PathBuf>,
}

/// Open the store; if it is corrupt, move it aside and build an empty one.
///
/// The damaged file (plus any `-wal`/`-shm` siblings) is renamed to
/// `<name>.corrupt-<timestamp>` so it can be inspected or re-ingested later.
/// Non-corruption failures (permissions, missing directories) are returned as-is.
pub fn open_or_recover(path: impl AsRef<Path>) -> Result<OpenedDatabase> {
    let path = path.as_ref();
    match open_database(path) {
        Ok(conn) => Ok(OpenedDatabase {
            conn,
            recovered_from: None,
        }),
        Err(err) if is_corruption(&err) => {
            tracing::error!(path = %path.display(), error = %err, "database is corrupt, rebuilding");
            let backup = quarantine(path)?;
            let conn = open_database(path).context("failed to rebuild database")?;
            tracing::warn!(backup = %backup.display(), "corrupted store preserved; re-ingest from bulk sources");
            Ok(OpenedDatabase {
                conn,
                recovered_from: Some(backup),
            })
        }
        Err(err) => Err(err),
    }
}

/// Error raised when `PRAGMA quick_check` reports damage.
#[derive(Debug, thiserror::Error)]
#[error("integrity check failed: {0}")]
pub struct IntegrityError(pub String);

fn ensure_intact(conn: &Connection) -> Result<()> {
    let verdict: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(IntegrityError(verdict).into());
    }
    Ok(())
}

/// Whether an open failure means the file itself is damaged.
pub fn is_corruption(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if cause.downcast_ref::<IntegrityError>().is_some() {
            return true;
        }
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
        )
    })
}

fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "memory.db".into());
    let backup = path.with_file_name(format!("{file_name}.corrupt-{stamp}"));

    std::fs::rename(path, &backup)
        .with_context(|| format!("failed to move corrupt database to {}", backup.display()))?;

    for suffix in ["-wal", "-shm"] {
        let sibling = path.with_file_name(format!("{file_name}{suffix}"));
        if sibling.exists() {
            let target = backup.with_file_name(format!(
                "{}{suffix}",
                backup.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ));
            std::fs::rename(&sibling, &target).with_context(|| {
                format!("failed to move {} aside", sibling.display())
            })?;
        }
    }

    Ok(backup)
}

/// Database health report used by `doctor` and `stats`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub embedding_model: Option<String>,
    pub memory_count: u64,
    pub edge_count: u64,
    pub log_count: u64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Run diagnostics against an open store. Never loads the embedding model.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let sqlite_vec_version: String = conn.query_row("SELECT vec_version()", [], |r| r.get(0))?;
    let embedding_model = migrations::get_embedding_model(conn)?;

    let count = |table: &str| -> Result<u64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        Ok(n as u64)
    };

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    Ok(HealthReport {
        schema_version,
        sqlite_vec_version,
        embedding_model,
        memory_count: count("memories")?,
        edge_count: count("edges")?,
        log_count: count("memory_log")?,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_database_is_migrated() {
        let conn = open_memory_database().unwrap();
        assert_eq!(
            migrations::get_schema_version(&conn).unwrap(),
            migrations::CURRENT_SCHEMA_VERSION
        );
    }

    #[test]
    fn health_report_on_empty_store() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.memory_count, 0);
        assert_eq!(report.edge_count, 0);
        assert!(!report.sqlite_vec_version.is_empty());
    }

    #[test]
    fn integrity_error_counts_as_corruption() {
        let err: anyhow::Error = IntegrityError("page 3 is never used".into()).into();
        assert!(is_corruption(&err));
        let err = anyhow::anyhow!("permission denied");
        assert!(!is_corruption(&err));
    }
}
