//! Ordered schema steps for the tracker database.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one; a step is never edited
//!   once released.
//! - `PRAGMA user_version` always equals the last applied step.
//! - Pending steps commit together or not at all.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, name, sql)` for every schema step, oldest first.
const STEPS: [(u32, &str, &str); 5] = [
    (1, "init", include_str!("0001_init.sql")),
    (2, "reports", include_str!("0002_reports.sql")),
    (3, "spatial", include_str!("0003_spatial.sql")),
    (4, "activity", include_str!("0004_activity.sql")),
    (5, "project_fts", include_str!("0005_project_fts.sql")),
];

/// Newest schema version this build can produce.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

pub fn current_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}

/// Applies every step newer than the stamped version and returns how many ran.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let found = current_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::UnsupportedSchemaVersion { found, supported });
    }

    let pending: Vec<_> = STEPS.iter().filter(|(version, ..)| *version > found).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for &&(version, name, sql) in &pending {
        tx.execute_batch(sql)
            .and_then(|()| tx.pragma_update(None, "user_version", version))
            .map_err(|source| DbError::Migration {
                version,
                name,
                source,
            })?;
    }
    tx.commit()?;
    info!(
        "event=db_migrate module=db status=ok from={found} to={supported} steps={}",
        pending.len()
    );
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_numbered_consecutively() {
        for (index, (version, name, sql)) in STEPS.iter().enumerate() {
            assert_eq!(*version as usize, index + 1, "step {name}");
            assert!(!sql.trim().is_empty(), "step {name} is empty");
        }
    }

    #[test]
    fn second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(apply_migrations(&mut conn).unwrap(), STEPS.len());
        assert_eq!(apply_migrations(&mut conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }
}
