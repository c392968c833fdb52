use crate::database::models::{ItemRecord, ItemStatus};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteItemRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const ITEM_COLUMNS: &str = "id, name, creators, item_type, categories, date, status, \
     comment_count, rating_average, rating_count, created_at";

fn json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn map_item(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
    Ok(ItemRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        creators: json_list(row.get(2)?),
        item_type: row.get(3)?,
        categories: json_list(row.get(4)?),
        date: row.get(5)?,
        status: row.get(6)?,
        comment_count: row.get(7)?,
        rating_average: row.get(8)?,
        rating_count: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl<'conn> super::ItemRepository for SqliteItemRepository<'conn> {
    fn create(&self, record: &ItemRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO items (id, name, creators, item_type, categories, date, status,
                               comment_count, rating_average, rating_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.id,
                record.name,
                serde_json::to_string(&record.creators)?,
                record.item_type,
                serde_json::to_string(&record.categories)?,
                record.date,
                record.status,
                record.comment_count,
                record.rating_average,
                record.rating_count,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ItemRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id],
                map_item,
            )
            .optional()?)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_by_status(
        &self,
        status: ItemStatus,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM items
            WHERE status = ?1
              AND (?2 IS NULL OR date >= ?2)
              AND (?3 IS NULL OR date <= ?3)
            ORDER BY date ASC, id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![status, date_from, date_to], map_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn adjust_comment_count(&self, id: &str, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET comment_count = MAX(comment_count + ?2, 0) WHERE id = ?1",
            params![id, delta],
        )?;
        Ok(())
    }

    fn set_rating(&self, id: &str, average: f64, count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET rating_average = ?2, rating_count = ?3 WHERE id = ?1",
            params![id, average, count],
        )?;
        Ok(())
    }

    fn set_status(&self, id: &str, status: ItemStatus) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE items SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;
        Ok(changed > 0)
    }
}
