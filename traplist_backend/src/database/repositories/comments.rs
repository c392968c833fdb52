use super::{placeholders, RootPageKey};
use crate::database::models::{CommentRecord, CommentStatus};
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

pub(super) struct SqliteCommentRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const COMMENT_COLUMNS: &str = "id, item_id, author_id, body, created_at, last_activity_at, \
     parent_id, thread_id, depth, reply_count, like_count, dislike_count, score, status";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get(0)?,
        item_id: row.get(1)?,
        author_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
        last_activity_at: row.get(5)?,
        parent_id: row.get(6)?,
        thread_id: row.get(7)?,
        depth: row.get(8)?,
        reply_count: row.get(9)?,
        like_count: row.get(10)?,
        dislike_count: row.get(11)?,
        score: row.get(12)?,
        status: row.get(13)?,
    })
}

impl<'conn> super::CommentRepository for SqliteCommentRepository<'conn> {
    fn create(&self, record: &CommentRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO comments (id, item_id, author_id, body, created_at, last_activity_at,
                                  parent_id, thread_id, depth, reply_count, like_count,
                                  dislike_count, score, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                record.id,
                record.item_id,
                record.author_id,
                record.body,
                record.created_at,
                record.last_activity_at,
                record.parent_id,
                record.thread_id,
                record.depth,
                record.reply_count,
                record.like_count,
                record.dislike_count,
                record.score,
                record.status,
            ],
        )?;
        Ok(())
    }

    fn get(&self, item_id: &str, id: &str) -> Result<Option<CommentRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1 AND item_id = ?2"),
                params![id, item_id],
                map_comment,
            )
            .optional()?)
    }

    fn update_body(&self, id: &str, body: &str, status: CommentStatus, at: &str) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE comments
            SET body = ?2, status = ?3, last_activity_at = ?4
            WHERE id = ?1
            "#,
            params![id, body, status, at],
        )?;
        Ok(())
    }

    fn set_status(&self, id: &str, status: CommentStatus, at: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE comments SET status = ?2, last_activity_at = ?3 WHERE id = ?1",
            params![id, status, at],
        )?;
        Ok(())
    }

    fn record_reply(&self, root_id: &str, at: &str) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE comments
            SET reply_count = reply_count + 1, last_activity_at = ?2
            WHERE id = ?1 AND depth = 0
            "#,
            params![root_id, at],
        )?;
        Ok(())
    }

    fn touch_activity(&self, id: &str, at: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE comments SET last_activity_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    }

    fn apply_vote_delta(&self, id: &str, like_delta: i64, dislike_delta: i64) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE comments
            SET like_count = like_count + ?2,
                dislike_count = dislike_count + ?3,
                score = score + (?2 - ?3)
            WHERE id = ?1
            "#,
            params![id, like_delta, dislike_delta],
        )?;
        Ok(())
    }

    fn list_roots(
        &self,
        item_id: &str,
        limit: usize,
        after: Option<&RootPageKey>,
    ) -> Result<Vec<CommentRecord>> {
        let mut comments = Vec::new();
        match after {
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    r#"
                    SELECT {COMMENT_COLUMNS}
                    FROM comments
                    WHERE item_id = ?1 AND depth = 0 AND status != 'hidden'
                    ORDER BY score DESC, created_at ASC, id ASC
                    LIMIT ?2
                    "#
                ))?;
                let rows = stmt.query_map(params![item_id, limit as i64], map_comment)?;
                for row in rows {
                    comments.push(row?);
                }
            }
            Some(key) => {
                let mut stmt = self.conn.prepare(&format!(
                    r#"
                    SELECT {COMMENT_COLUMNS}
                    FROM comments
                    WHERE item_id = ?1 AND depth = 0 AND status != 'hidden'
                      AND (score < ?2
                           OR (score = ?2 AND created_at > ?3)
                           OR (score = ?2 AND created_at = ?3 AND id > ?4))
                    ORDER BY score DESC, created_at ASC, id ASC
                    LIMIT ?5
                    "#
                ))?;
                let rows = stmt.query_map(
                    params![item_id, key.score, key.created_at, key.id, limit as i64],
                    map_comment,
                )?;
                for row in rows {
                    comments.push(row?);
                }
            }
        }
        Ok(comments)
    }

    fn list_replies(&self, item_id: &str, thread_ids: &[String]) -> Result<Vec<CommentRecord>> {
        if thread_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE item_id = ?1 AND depth = 1 AND status != 'hidden'
              AND thread_id IN ({})
            ORDER BY created_at ASC, id ASC
            "#,
            placeholders(2, thread_ids.len())
        );
        let mut bind: Vec<Value> = Vec::with_capacity(thread_ids.len() + 1);
        bind.push(Value::Text(item_id.to_string()));
        bind.extend(thread_ids.iter().cloned().map(Value::Text));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), map_comment)?;
        let mut replies = Vec::new();
        for row in rows {
            replies.push(row?);
        }
        Ok(replies)
    }
}
