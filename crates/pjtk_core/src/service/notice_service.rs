//! Notice inbox use-cases.

use super::ServiceResult;
use crate::model::notice::Notice;
use crate::repo::notice_repo::{NoticeRepository, SqliteNoticeRepository};
use crate::repo::now_millis;
use rusqlite::Connection;

pub struct NoticeService<N: NoticeRepository> {
    notices: N,
}

impl<'conn> NoticeService<SqliteNoticeRepository<'conn>> {
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(SqliteNoticeRepository::new(conn))
    }
}

impl<N: NoticeRepository> NoticeService<N> {
    pub fn new(notices: N) -> Self {
        Self { notices }
    }

    /// Newest first. Read notices are included only when `all` is set.
    pub fn my_messages(&self, username: &str, all: bool) -> ServiceResult<Vec<Notice>> {
        Ok(self.notices.notices_for(username, all)?)
    }

    /// Stamps the notice read for `username`. Re-marking keeps the first stamp.
    pub fn mark_message_as_read(&self, username: &str, message_id: i64) -> ServiceResult<()> {
        self.notices.mark_read(username, message_id, now_millis())?;
        Ok(())
    }
}
