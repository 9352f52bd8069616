//! Per-user notice inbox.

use super::{RepoError, RepoResult};
use crate::model::notice::{MessageLevel, Notice};
use rusqlite::{params, Connection, Row};

pub trait NoticeRepository {
    /// Newest first; unread only unless `include_read`.
    fn notices_for(&self, username: &str, include_read: bool) -> RepoResult<Vec<Notice>>;
    fn mark_read(&self, username: &str, message_id: i64, now: i64) -> RepoResult<()>;
}

pub struct SqliteNoticeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoticeRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NoticeRepository for SqliteNoticeRepository<'_> {
    fn notices_for(&self, username: &str, include_read: bool) -> RepoResult<Vec<Notice>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                msg.id AS message_id,
                mr.username AS username,
                p.prj_cd AS prj_cd,
                p.slug AS slug,
                m.label AS milestone,
                msg.msg AS msg,
                msg.level AS level,
                msg.created_at AS created_at,
                mr.read_at AS read_at
             FROM message_recipients mr
             JOIN messages msg ON msg.id = mr.message_id
             JOIN project_milestones pm ON pm.id = msg.project_milestone_id
             JOIN milestones m ON m.id = pm.milestone_id
             JOIN projects p ON p.uuid = pm.project_uuid
             WHERE mr.username = ?1
               AND (?2 = 1 OR mr.read_at IS NULL)
             ORDER BY msg.created_at DESC, msg.id DESC;",
        )?;
        let mut rows = stmt.query(params![username, i64::from(include_read)])?;
        let mut notices = Vec::new();
        while let Some(row) = rows.next()? {
            notices.push(parse_notice_row(row)?);
        }
        Ok(notices)
    }

    fn mark_read(&self, username: &str, message_id: i64, now: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE message_recipients
             SET read_at = COALESCE(read_at, ?3)
             WHERE username = ?1 AND message_id = ?2;",
            params![username, message_id, now],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!(
                "message {message_id} for {username}"
            )));
        }
        Ok(())
    }
}

fn parse_notice_row(row: &Row<'_>) -> RepoResult<Notice> {
    let level_text: String = row.get("level")?;
    let level = MessageLevel::parse(&level_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid level `{level_text}` in messages.level"))
    })?;
    Ok(Notice {
        message_id: row.get("message_id")?,
        username: row.get("username")?,
        prj_cd: row.get("prj_cd")?,
        slug: row.get("slug")?,
        milestone: row.get("milestone")?,
        msg: row.get("msg")?,
        level,
        created_at: row.get("created_at")?,
        read_at: row.get("read_at")?,
    })
}
