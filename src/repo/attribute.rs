use rusqlite::Connection;
use anyhow::{Context, Result};
use std::collections::HashMap;

/// Stage attributes keyed by stage number
pub type StageAttributes = HashMap<i64, HashMap<String, String>>;

/// Key/value results extracted from stage output
pub struct AttributeRepo;

impl AttributeRepo {
    /// Store attributes for one stage, replacing values of keys already present
    pub fn put_all(
        conn: &Connection,
        pair_id: i64,
        stage_number: i64,
        attributes: &HashMap<String, String>,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO job_attributes (pair_id, stage_number, attr_key, attr_value)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (key, value) in attributes {
            stmt.execute(rusqlite::params![pair_id, stage_number, key, value])
                .with_context(|| {
                    format!(
                        "Failed to store attribute '{}' for stage {} of pair {}",
                        key, stage_number, pair_id
                    )
                })?;
        }
        Ok(())
    }

    pub fn get_for_pair(conn: &Connection, pair_id: i64) -> Result<StageAttributes> {
        let mut stmt = conn.prepare(
            "SELECT stage_number, attr_key, attr_value FROM job_attributes WHERE pair_id = ?1",
        )?;
        let rows = stmt.query_map([pair_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut attributes = StageAttributes::new();
        for row in rows {
            let (stage, key, value) = row?;
            attributes.entry(stage).or_default().insert(key, value);
        }
        Ok(attributes)
    }

}
