//! Pending turn repository: append-only journal in `pending_turns`, read in
//! sequence order, trimmed by sequence number or cleared in one statement.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use super::parse_timestamp;
use crate::errors::Result;
use crate::types::PendingTurn;

/// Pending turn repository.
pub struct PendingTurnRepo;

impl PendingTurnRepo {
    /// Append one entry. Returns its sequence number.
    pub fn append(conn: &Connection, text: &str, created_at: DateTime<Utc>) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO pending_turns (text, created_at) VALUES (?1, ?2)",
            params![text, created_at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All entries in append order.
    pub fn list(conn: &Connection) -> Result<Vec<PendingTurn>> {
        let mut stmt =
            conn.prepare("SELECT seq, text, created_at FROM pending_turns ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            let raw_created: String = row.get(2)?;
            Ok(PendingTurn {
                seq: row.get(0)?,
                text: row.get(1)?,
                created_at: parse_timestamp(2, &raw_created)?,
            })
        })?;
        let mut turns = Vec::new();
        for row in rows {
            turns.push(row?);
        }
        Ok(turns)
    }

    /// Delete the entries with the given sequence numbers in one transaction.
    /// Unknown numbers are ignored. Returns how many were removed.
    pub fn remove(conn: &Connection, seqs: &[i64]) -> Result<usize> {
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM pending_turns WHERE seq = ?1")?;
            for seq in seqs {
                removed += stmt.execute([seq])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM pending_turns", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn append_preserves_order() {
        let conn = setup();
        let a = PendingTurnRepo::append(&conn, "first", Utc::now()).unwrap();
        let b = PendingTurnRepo::append(&conn, "second", Utc::now()).unwrap();
        assert!(b > a);
        let texts: Vec<String> = PendingTurnRepo::list(&conn)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn clear_is_idempotent() {
        let conn = setup();
        let _ = PendingTurnRepo::append(&conn, "x", Utc::now()).unwrap();
        assert_eq!(PendingTurnRepo::clear(&conn).unwrap(), 1);
        assert_eq!(PendingTurnRepo::clear(&conn).unwrap(), 0);
        assert!(PendingTurnRepo::list(&conn).unwrap().is_empty());
    }

    #[test]
    fn remove_deletes_only_named_entries() {
        let conn = setup();
        let a = PendingTurnRepo::append(&conn, "a", Utc::now()).unwrap();
        let _ = PendingTurnRepo::append(&conn, "b", Utc::now()).unwrap();
        let c = PendingTurnRepo::append(&conn, "c", Utc::now()).unwrap();

        assert_eq!(PendingTurnRepo::remove(&conn, &[a, c, 999]).unwrap(), 2);
        let texts: Vec<String> = PendingTurnRepo::list(&conn)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["b"]);
        assert_eq!(PendingTurnRepo::remove(&conn, &[a]).unwrap(), 0);
        assert_eq!(PendingTurnRepo::remove(&conn, &[]).unwrap(), 0);

        // AUTOINCREMENT: a removed tail number is never handed out again.
        assert!(PendingTurnRepo::append(&conn, "d", Utc::now()).unwrap() > c);
    }

    #[test]
    fn duplicate_text_is_kept() {
        let conn = setup();
        let _ = PendingTurnRepo::append(&conn, "same", Utc::now()).unwrap();
        let a = PendingTurnRepo::append(&conn, "same", Utc::now()).unwrap();
        assert_eq!(PendingTurnRepo::list(&conn).unwrap().len(), 2);
        assert_eq!(PendingTurnRepo::remove(&conn, &[a]).unwrap(), 1);
        assert_eq!(PendingTurnRepo::list(&conn).unwrap()[0].text, "same");
    }
}
