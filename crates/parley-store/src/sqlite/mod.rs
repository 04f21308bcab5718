//! `SQLite` backend: connection pool, schema migrations, and stateless
//! repositories over the two persisted tables.

pub mod connection;
pub mod migrations;
pub mod repositories;

use std::path::Path;

use tracing::info;

use crate::errors::Result;
use connection::{ConnectionConfig, ConnectionPool};

/// Open (or create) the database file at `path` and bring its schema up to date.
///
/// Missing parent directories are created.
pub fn open_file(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let pool = connection::new_file(path, config)?;
    let conn = pool.get()?;
    let applied = migrations::run_migrations(&conn)?;
    info!(path = %path.display(), applied, "database opened");
    Ok(pool)
}

/// Open a fresh in-memory database with the current schema.
pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = connection::new_in_memory()?;
    let conn = pool.get()?;
    let _ = migrations::run_migrations(&conn)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("parley.db");
        let pool = open_file(&path, &ConnectionConfig::default()).unwrap();
        assert!(path.exists());
        let conn = pool.get().unwrap();
        assert_eq!(
            migrations::current_version(&conn).unwrap(),
            migrations::latest_version()
        );
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");
        drop(open_file(&path, &ConnectionConfig::default()).unwrap());
        let pool = open_file(&path, &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(migrations::current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn in_memory_has_schema() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(migrations::current_version(&conn).unwrap(), 1);
    }
}
