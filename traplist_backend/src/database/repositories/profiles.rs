use super::placeholders;
use crate::database::models::ProfileRecord;
use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

pub(super) struct SqliteProfileRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRecord> {
    Ok(ProfileRecord {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        photo_url: row.get(2)?,
        is_anonymous: row.get::<_, i64>(3)? != 0,
        updated_at: row.get(4)?,
    })
}

impl<'conn> super::ProfileRepository for SqliteProfileRepository<'conn> {
    fn upsert(&self, record: &ProfileRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO profiles (user_id, display_name, photo_url, is_anonymous, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                photo_url = excluded.photo_url,
                is_anonymous = excluded.is_anonymous,
                updated_at = excluded.updated_at
            "#,
            params![
                record.user_id,
                record.display_name,
                record.photo_url,
                if record.is_anonymous { 1 } else { 0 },
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT user_id, display_name, photo_url, is_anonymous, updated_at
                FROM profiles
                WHERE user_id = ?1
                "#,
                params![user_id],
                map_profile,
            )
            .optional()?)
    }

    fn get_many(&self, user_ids: &[String]) -> Result<Vec<ProfileRecord>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT user_id, display_name, photo_url, is_anonymous, updated_at
            FROM profiles
            WHERE user_id IN ({})
            "#,
            placeholders(1, user_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(user_ids.iter()), map_profile)?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }
}
