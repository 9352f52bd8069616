//! Repository contracts and their SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access traits.
//! - Keep SQL details behind the core persistence boundary.
//! - Run multi-row invariants (families, report currency, milestone
//!   completion) inside immediate transactions.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to transport errors.

use crate::db::DbError;
use crate::model::project::ProjectValidationError;
use chrono::NaiveDate;
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use uuid::Uuid;

pub mod family_repo;
pub mod filter;
pub mod lookup_repo;
pub mod milestone_repo;
pub mod notice_repo;
pub mod point_repo;
pub mod project_repo;
pub mod report_repo;
pub mod user_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every table family.
#[derive(Debug)]
pub enum RepoError {
    Validation(ProjectValidationError),
    Db(DbError),
    NotFound(String),
    /// A uniqueness rule would be broken.
    Conflict(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Conflict(what) => write!(f, "conflict: {what}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ProjectValidationError> for RepoError {
    fn from(value: ProjectValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

const NESTED_SAVEPOINT: &str = "pjtk_nested";

/// An immediate write transaction, or a savepoint when one is already open.
///
/// Dropping the scope without `commit` rolls its writes back, so repository
/// writes issued inside an outer unit of work commit or fail with it.
pub(crate) struct WriteScope<'conn> {
    conn: &'conn Connection,
    nested: bool,
    done: bool,
}

impl<'conn> WriteScope<'conn> {
    pub(crate) fn begin(conn: &'conn Connection) -> rusqlite::Result<Self> {
        let nested = !conn.is_autocommit();
        if nested {
            conn.execute_batch(&format!("SAVEPOINT {NESTED_SAVEPOINT};"))?;
        } else {
            conn.execute_batch("BEGIN IMMEDIATE;")?;
        }
        Ok(Self {
            conn,
            nested,
            done: false,
        })
    }

    pub(crate) fn commit(mut self) -> rusqlite::Result<()> {
        self.done = true;
        if self.nested {
            self.conn
                .execute_batch(&format!("RELEASE {NESTED_SAVEPOINT};"))
        } else {
            self.conn.execute_batch("COMMIT;")
        }
    }
}

impl Deref for WriteScope<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let undo = if self.nested {
            format!("ROLLBACK TO {NESTED_SAVEPOINT}; RELEASE {NESTED_SAVEPOINT};")
        } else {
            "ROLLBACK;".to_string()
        };
        if let Err(err) = self.conn.execute_batch(&undo) {
            log::warn!("event=write_rollback module=repo status=error error={err}");
        }
    }
}

/// Runs `work` as one unit: every repository write inside commits together
/// or not at all.
pub(crate) fn atomically<T, E>(
    conn: &Connection,
    work: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<RepoError>,
{
    let scope = WriteScope::begin(conn).map_err(RepoError::from)?;
    let value = work()?;
    scope.commit().map_err(RepoError::from)?;
    Ok(value)
}

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn date_to_db(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(value: &str, column: &str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation
                && (inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn nested_scope_joins_the_outer_unit() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        let result: Result<(), RepoError> = atomically(&conn, || {
            let inner = WriteScope::begin(&conn)?;
            inner.execute("INSERT INTO t VALUES (1);", [])?;
            inner.commit()?;
            Err(RepoError::NotFound("later step".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(counted(&conn), 0);
        assert!(conn.is_autocommit());

        {
            let dropped = WriteScope::begin(&conn).unwrap();
            dropped.execute("INSERT INTO t VALUES (2);", []).unwrap();
        }
        assert_eq!(counted(&conn), 0);

        atomically(&conn, || -> RepoResult<()> {
            let inner = WriteScope::begin(&conn)?;
            inner.execute("INSERT INTO t VALUES (3);", [])?;
            inner.commit()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(counted(&conn), 1);
    }
}
