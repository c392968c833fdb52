use super::placeholders;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

pub(super) struct SqliteVoteRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::VoteRepository for SqliteVoteRepository<'conn> {
    fn get(&self, comment_id: &str, user_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM comment_votes WHERE comment_id = ?1 AND user_id = ?2",
                params![comment_id, user_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn upsert(&self, comment_id: &str, user_id: &str, value: i64, at: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO comment_votes (comment_id, user_id, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(comment_id, user_id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![comment_id, user_id, value, at],
        )?;
        Ok(())
    }

    fn delete(&self, comment_id: &str, user_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM comment_votes WHERE comment_id = ?1 AND user_id = ?2",
            params![comment_id, user_id],
        )?;
        Ok(())
    }

    fn list_for_user(&self, user_id: &str, comment_ids: &[String]) -> Result<Vec<(String, i64)>> {
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT comment_id, value FROM comment_votes WHERE user_id = ?1 AND comment_id IN ({})",
            placeholders(2, comment_ids.len())
        );
        let mut bind: Vec<Value> = Vec::with_capacity(comment_ids.len() + 1);
        bind.push(Value::Text(user_id.to_string()));
        bind.extend(comment_ids.iter().cloned().map(Value::Text));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut votes = Vec::new();
        for row in rows {
            votes.push(row?);
        }
        Ok(votes)
    }
}
