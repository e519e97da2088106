use rusqlite::Connection;
use anyhow::{Context, Result};

/// Additional benchmark inputs of a pair, numbered from 1
pub struct InputRepo;

impl InputRepo {
    pub fn insert_all(conn: &Connection, pair_id: i64, bench_ids: &[i64]) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO jobpair_inputs (pair_id, input_number, bench_id) VALUES (?1, ?2, ?3)",
        )?;
        for (index, bench_id) in bench_ids.iter().enumerate() {
            stmt.execute(rusqlite::params![pair_id, index as i64 + 1, bench_id])
                .with_context(|| format!("Failed to add input {} for pair {}", index + 1, pair_id))?;
        }
        Ok(())
    }

    pub fn list_bench_ids(conn: &Connection, pair_id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT bench_id FROM jobpair_inputs WHERE pair_id = ?1 ORDER BY input_number",
        )?;
        let rows = stmt.query_map([pair_id], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Filesystem paths of the inputs in input-number order.
    /// Inputs whose benchmark has been deleted or has no path are skipped.
    pub fn list_paths(conn: &Connection, pair_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT b.path FROM jobpair_inputs i
             JOIN benchmarks b ON b.id = i.bench_id
             WHERE i.pair_id = ?1 AND b.path IS NOT NULL
             ORDER BY i.input_number",
        )?;
        let rows = stmt.query_map([pair_id], |row| row.get(0))?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }
}
