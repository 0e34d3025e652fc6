//! Persistent store for script and setting records (§3.1, §3.2, §3.4, §4.6).
//!
//! Every call opens its own short-lived connection so no component ever holds the
//! database open across an I/O wait belonging to another component (§5).

use std::{path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use strum::{Display, EnumString};

use crate::{constants::LAST_OUTPUT_MAX_CHARS, error::CatalogError};

/// How a script's executable file should be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ScriptType {
    /// Run via an interpreter (e.g. `python3 -u <path>`).
    Interpreter,
    /// Run via the shell (`bash <path>`).
    Shell,
}

/// Terminal/transient run status of a script (§4.1 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ScriptStatus {
    Idle,
    Running,
    Success,
    Failed,
    Stopped,
}

/// A script record as stored in the catalog (§3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub script_type: ScriptType,
    pub arguments: Option<String>,
    pub cron: Option<String>,
    pub enabled: bool,
    pub run_on_startup: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: ScriptStatus,
    pub last_output: Option<String>,
}

/// Fields accepted when creating a new script record.
#[derive(Debug, Clone)]
pub struct NewScript {
    pub name: String,
    pub path: String,
    pub script_type: ScriptType,
    pub arguments: Option<String>,
    pub cron: Option<String>,
    pub enabled: bool,
    pub run_on_startup: bool,
    pub description: Option<String>,
}

/// Partial update applied to an existing script record (§6 `PUT /scripts/{id}`).
#[derive(Debug, Clone, Default)]
pub struct ScriptUpdate {
    pub name: Option<String>,
    pub arguments: Option<Option<String>>,
    pub cron: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub run_on_startup: Option<bool>,
    pub description: Option<Option<String>>,
}

/// Adapter over the persistent store backing scripts and settings.
pub struct Catalog {
    db_path: String,
}

impl Catalog {
    /// Opens (creating if necessary) the catalog database at `db_path` and applies the
    /// additive schema migration (§4.6 point 1).
    pub fn open(db_path: impl Into<String>) -> Result<Self, CatalogError> {
        let db_path = db_path.into();
        if let Some(parent) = Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let catalog = Self { db_path };
        catalog.migrate()?;
        Ok(catalog)
    }

    fn connect(&self) -> Result<Connection, CatalogError> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn migrate(&self) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS scripts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                path            TEXT NOT NULL UNIQUE,
                type            TEXT NOT NULL,
                arguments       TEXT,
                cron            TEXT,
                enabled         INTEGER NOT NULL DEFAULT 0,
                run_on_startup  INTEGER NOT NULL DEFAULT 0,
                description     TEXT,
                created_at      TEXT NOT NULL,
                last_run        TEXT,
                last_status     TEXT NOT NULL DEFAULT 'idle',
                last_output     TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        // Best-effort additive migrations for older database files; ignore failures
        // since the column may already exist (§4.6 point 1).
        let _ = conn.execute("ALTER TABLE scripts ADD COLUMN description TEXT", []);
        Ok(())
    }

    /// Inserts a new script record, enforcing the unique-path invariant (§3.1).
    pub fn insert_script(&self, new: NewScript) -> Result<Script, CatalogError> {
        let conn = self.connect()?;
        if path_exists(&conn, &new.path)? {
            return Err(CatalogError::DuplicatePath(new.path));
        }
        let now = Utc::now();
        conn.execute(
            "INSERT INTO scripts (name, path, type, arguments, cron, enabled, run_on_startup, description, created_at, last_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'idle')",
            params![
                new.name,
                new.path,
                new.script_type.to_string(),
                new.arguments,
                new.cron,
                new.enabled as i64,
                new.run_on_startup as i64,
                new.description,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.get_script(id)
    }

    /// Fetches a script by id.
    pub fn get_script(&self, id: i64) -> Result<Script, CatalogError> {
        let conn = self.connect()?;
        conn.query_row(SELECT_SCRIPT, params![id], row_to_script)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Fetches a script by its unique name.
    pub fn get_script_by_name(&self, name: &str) -> Result<Script, CatalogError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, name, path, type, arguments, cron, enabled, run_on_startup, description, created_at, last_run, last_status, last_output FROM scripts WHERE name = ?1",
            params![name],
            row_to_script,
        )
        .optional()?
        .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Lists every script record.
    pub fn list_scripts(&self) -> Result<Vec<Script>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, path, type, arguments, cron, enabled, run_on_startup, description, created_at, last_run, last_status, last_output FROM scripts ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], row_to_script)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Applies a partial update to a script record (§6 `PUT /scripts/{id}`).
    pub fn update_script(&self, id: i64, update: ScriptUpdate) -> Result<Script, CatalogError> {
        let current = self.get_script(id)?;
        let conn = self.connect()?;
        let name = update.name.unwrap_or(current.name);
        let arguments = update.arguments.unwrap_or(current.arguments);
        let cron = update.cron.unwrap_or(current.cron);
        let enabled = update.enabled.unwrap_or(current.enabled);
        let run_on_startup = update.run_on_startup.unwrap_or(current.run_on_startup);
        let description = update.description.unwrap_or(current.description);
        conn.execute(
            "UPDATE scripts SET name = ?1, arguments = ?2, cron = ?3, enabled = ?4, run_on_startup = ?5, description = ?6 WHERE id = ?7",
            params![
                name,
                arguments,
                cron,
                enabled as i64,
                run_on_startup as i64,
                description,
                id,
            ],
        )?;
        self.get_script(id)
    }

    /// Deletes a script record, returning it so the caller can remove its script file
    /// and log file and unregister its scheduled job (§3.3 lifecycle, §6 `DELETE /scripts/{id}`).
    pub fn delete_script(&self, id: i64) -> Result<Script, CatalogError> {
        let script = self.get_script(id)?;
        let conn = self.connect()?;
        conn.execute("DELETE FROM scripts WHERE id = ?1", params![id])?;
        Ok(script)
    }

    /// Records a launch: stamps `last_run` and flips `last_status` to running.
    pub fn mark_started(&self, id: i64) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE scripts SET last_run = ?1, last_status = 'running' WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Records the terminal outcome of a run (§4.1, §8 property 4).
    pub fn record_completion(
        &self,
        id: i64,
        status: ScriptStatus,
        output_tail: &str,
    ) -> Result<(), CatalogError> {
        let trimmed = tail_chars(output_tail, LAST_OUTPUT_MAX_CHARS);
        let conn = self.connect()?;
        conn.execute(
            "UPDATE scripts SET last_status = ?1, last_output = ?2 WHERE id = ?3",
            params![status.to_string(), trimmed, id],
        )?;
        Ok(())
    }

    /// Resets every `running` script to `idle` at startup (§4.6 point 6).
    pub fn reset_stale_running(&self) -> Result<usize, CatalogError> {
        let conn = self.connect()?;
        let count = conn.execute(
            "UPDATE scripts SET last_status = 'idle' WHERE last_status = 'running'",
            [],
        )?;
        Ok(count)
    }

    /// Returns every script whose path is already known (disk-sync dedup, §4.6 point 7).
    pub fn known_paths(&self) -> Result<Vec<String>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path FROM scripts")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns scripts that are daemons (`cron = @daemon`) currently marked running,
    /// the set the health checker cross-references against live children (§4.4).
    pub fn running_daemons(&self) -> Result<Vec<Script>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE cron = '{}' AND last_status = 'running'",
            SELECT_SCRIPTS_BASE, crate::constants::DAEMON_CRON_SENTINEL
        ))?;
        let rows = stmt
            .query_map([], row_to_script)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reads a setting value (§3.2).
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes a setting value, overwriting any previous value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Returns `true` if the named boolean setting is present and equal to `"true"`.
    pub fn setting_is_true(&self, key: &str) -> Result<bool, CatalogError> {
        Ok(self.get_setting(key)?.as_deref() == Some("true"))
    }
}

fn path_exists(conn: &Connection, path: &str) -> Result<bool, CatalogError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM scripts WHERE path = ?1",
            params![path],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

fn tail_chars(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    input
        .chars()
        .skip(char_count - max_chars)
        .collect::<String>()
}

const SELECT_SCRIPTS_BASE: &str = "SELECT id, name, path, type, arguments, cron, enabled, run_on_startup, description, created_at, last_run, last_status, last_output FROM scripts";
const SELECT_SCRIPT: &str = "SELECT id, name, path, type, arguments, cron, enabled, run_on_startup, description, created_at, last_run, last_status, last_output FROM scripts WHERE id = ?1";

fn row_to_script(row: &rusqlite::Row) -> rusqlite::Result<Script> {
    let type_str: String = row.get(3)?;
    let status_str: String = row.get(11)?;
    let created_at: String = row.get(9)?;
    let last_run: Option<String> = row.get(10)?;

    Ok(Script {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        script_type: ScriptType::from_str(&type_str).unwrap_or(ScriptType::Shell),
        arguments: row.get(4)?,
        cron: row.get(5)?,
        enabled: row.get::<_, i64>(6)? != 0,
        run_on_startup: row.get::<_, i64>(7)? != 0,
        description: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_run: last_run.and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        last_status: ScriptStatus::from_str(&status_str).unwrap_or(ScriptStatus::Idle),
        last_output: row.get(12)?,
    })
}
