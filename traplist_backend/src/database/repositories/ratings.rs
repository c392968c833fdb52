use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteRatingRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::RatingRepository for SqliteRatingRepository<'conn> {
    fn get(&self, item_id: &str, user_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM item_ratings WHERE item_id = ?1 AND user_id = ?2",
                params![item_id, user_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn upsert(&self, item_id: &str, user_id: &str, value: i64, at: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO item_ratings (item_id, user_id, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(item_id, user_id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![item_id, user_id, value, at],
        )?;
        Ok(())
    }

    fn list_values(&self, item_id: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM item_ratings WHERE item_id = ?1")?;
        let rows = stmt.query_map(params![item_id], |row| row.get::<_, i64>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}
