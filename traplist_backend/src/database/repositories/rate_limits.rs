use crate::database::models::RateLimitRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteRateLimitRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::RateLimitRepository for SqliteRateLimitRepository<'conn> {
    fn get(&self, key: &str) -> Result<Option<RateLimitRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT key, user_id, action, window_start, count
                FROM rate_limits
                WHERE key = ?1
                "#,
                params![key],
                |row| {
                    Ok(RateLimitRecord {
                        key: row.get(0)?,
                        user_id: row.get(1)?,
                        action: row.get(2)?,
                        window_start: row.get(3)?,
                        count: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    fn upsert(&self, record: &RateLimitRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO rate_limits (key, user_id, action, window_start, count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET count = excluded.count
            "#,
            params![
                record.key,
                record.user_id,
                record.action,
                record.window_start,
                record.count,
            ],
        )?;
        Ok(())
    }
}
