use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use std::ops::Deref;

/// A set of writes that commit together or not at all
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it
/// back, so an early `?` return can never leave half of the writes behind.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub fn begin(conn: &'conn Connection) -> Result<Self> {
        let tx = conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        Ok(Self { tx })
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().context("Failed to commit transaction")
    }

    /// Run `work` inside a unit of work, committing only if it succeeds
    pub fn run<T>(conn: &'conn Connection, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let uow = Self::begin(conn)?;
        let value = work(&*uow)?;
        uow.commit()?;
        Ok(value)
    }
}

impl Deref for UnitOfWork<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v INTEGER NOT NULL)", []).unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_commit_persists_all_writes() {
        let conn = setup();
        UnitOfWork::run(&conn, |tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO t (v) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_failure_rolls_back_earlier_writes() {
        let conn = setup();
        let result: Result<()> = UnitOfWork::run(&conn, |tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO t (v) VALUES (NULL)", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let conn = setup();
        {
            let uow = UnitOfWork::begin(&conn).unwrap();
            uow.execute("INSERT INTO t (v) VALUES (1)", []).unwrap();
        }
        assert_eq!(count(&conn), 0);
    }
}
