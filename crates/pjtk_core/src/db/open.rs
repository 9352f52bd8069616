//! Connection bootstrap for file and in-memory databases.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a 5 s busy timeout.
//! - Returned connections are migrated to the latest schema.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the tracker database at `path`.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    prepare(&path.display().to_string(), Connection::open(path))
}

/// Opens a private in-memory database, mostly for tests.
pub fn open_db_in_memory() -> DbResult<Connection> {
    prepare(":memory:", Connection::open_in_memory())
}

fn prepare(target: &str, opened: rusqlite::Result<Connection>) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = opened.map_err(DbError::from).and_then(|mut conn| {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let applied = apply_migrations(&mut conn)?;
        Ok((conn, applied))
    });

    let elapsed_ms = started_at.elapsed().as_millis();
    match result {
        Ok((conn, applied)) => {
            info!(
                "event=db_open module=db status=ok target={target} migrations={applied} duration_ms={elapsed_ms}"
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error target={target} duration_ms={elapsed_ms} error={err}"
            );
            Err(err)
        }
    }
}
