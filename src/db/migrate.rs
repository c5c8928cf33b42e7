//! Numbered SQL migrations.
//!
//! Every `NNN_name.sql` file in the migrations directory is applied once, in
//! version order, inside its own transaction. Applied versions are recorded in
//! `schema_migrations`.

use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use crate::error::{DocAnalyzerError, Result};

const MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

#[derive(Debug)]
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

impl Migration {
    /// Read one migration file. Files without a `.sql` extension are skipped.
    fn from_path(path: &Path) -> Result<Option<Self>> {
        if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
            return Ok(None);
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| invalid(format!("Invalid migration filename: {}", path.display())))?
            .to_string();

        let prefix = name.split('_').next().unwrap_or_default();
        let version = prefix
            .parse::<u32>()
            .map_err(|_| invalid(format!("Invalid migration version in {}: {:?}", name, prefix)))?;

        let sql = fs::read_to_string(path)?;
        Ok(Some(Self { version, name, sql }))
    }

    fn apply(&self, conn: &mut Connection) -> Result<()> {
        let tx = conn.transaction()?;
        tx.execute_batch(&self.sql).map_err(|e| {
            DocAnalyzerError::StorageUnavailable(format!("Migration {} failed: {}", self.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![self.version, self.name],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn invalid(message: String) -> DocAnalyzerError {
    DocAnalyzerError::Config(message)
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATIONS_TABLE)?;
    Ok(())
}

/// Names of applied migrations, oldest first
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

fn applied_versions(conn: &Connection) -> Result<BTreeSet<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<std::result::Result<BTreeSet<_>, rusqlite::Error>>()?;
    Ok(versions)
}

/// All migrations in `migrations_dir`, sorted by version
fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let entries = fs::read_dir(migrations_dir).map_err(|e| {
        invalid(format!(
            "Cannot read migrations directory {}: {}",
            migrations_dir.display(),
            e
        ))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        if let Some(migration) = Migration::from_path(&entry?.path())? {
            migrations.push(migration);
        }
    }
    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(invalid(format!(
            "Migrations {} and {} share version {}",
            pair[0].name, pair[1].name, pair[0].version
        )));
    }

    Ok(migrations)
}

/// Apply every migration not yet recorded; returns how many ran.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<usize> {
    ensure_migrations_table(conn)?;

    let done = applied_versions(conn)?;
    let pending: Vec<Migration> = load_migrations(migrations_dir)?
        .into_iter()
        .filter(|m| !done.contains(&m.version))
        .collect();

    if pending.is_empty() {
        log::debug!("Schema up to date ({} migrations applied)", done.len());
        return Ok(0);
    }

    for migration in &pending {
        log::info!("Applying migration {} (version {})", migration.name, migration.version);
        migration.apply(conn)?;
    }

    log::info!("Applied {} migration(s)", pending.len());
    Ok(pending.len())
}
