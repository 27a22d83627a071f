use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::store::{ChangeCursor, Collection, RemoteStore, WATCHED_COLLECTIONS};

/// Local row store with the same `{id, data}` shape as the hosted tables. Several portal
/// sessions can share one database file; per-collection revision counters drive change polling.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("sqlite store lock poisoned"))?;
        f(&guard)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS coaches (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS revisions (
            collection TEXT PRIMARY KEY,
            rev INTEGER NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn bump_revision(conn: &Connection, collection: Collection) -> Result<()> {
    conn.execute(
        "INSERT INTO revisions (collection, rev) VALUES (?1, 1)
         ON CONFLICT(collection) DO UPDATE SET rev = rev + 1",
        params![collection.table()],
    )
    .with_context(|| format!("bump revision for {}", collection.table()))?;
    Ok(())
}

fn entity_table(collection: Collection) -> Result<&'static str> {
    match collection {
        Collection::Players | Collection::Coaches | Collection::Teams => Ok(collection.table()),
        Collection::Settings => Err(anyhow!("settings are key/value, not entity rows")),
    }
}

impl RemoteStore for SqliteStore {
    fn check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .context("sqlite store not usable")?;
            Ok(())
        })
    }

    fn fetch(&self, collection: Collection) -> Result<Vec<Value>> {
        let table = entity_table(collection)?;
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT id, data FROM {table} ORDER BY rowid"))
                .with_context(|| format!("prepare fetch {table}"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .with_context(|| format!("query {table}"))?;
            let mut out = Vec::new();
            for raw in rows {
                let raw = raw.with_context(|| format!("read {table} row"))?;
                out.push(serde_json::from_str(&raw).with_context(|| format!("{table} row json"))?);
            }
            Ok(out)
        })
    }

    fn upsert(&self, collection: Collection, id: &str, data: &Value) -> Result<()> {
        let table = entity_table(collection)?;
        let json = serde_json::to_string(data).context("serialize row")?;
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, data, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data,
                                                   updated_at = excluded.updated_at"
                ),
                params![id, json, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("upsert {table} {id}"))?;
            bump_revision(conn, collection)
        })
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let table = entity_table(collection)?;
        self.with_conn(|conn| {
            conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])
                .with_context(|| format!("delete {table} {id}"))?;
            bump_revision(conn, collection)
        })
    }

    fn fetch_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read setting {key}"))
        })
    }

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("write setting {key}"))?;
            bump_revision(conn, Collection::Settings)
        })
    }

    fn poll_changes(&self, cursor: &mut ChangeCursor) -> Result<Vec<Collection>> {
        let first_poll = cursor.markers.is_empty();
        let mut changed = Vec::new();
        self.with_conn(|conn| {
            for collection in WATCHED_COLLECTIONS {
                let rev: i64 = conn
                    .query_row(
                        "SELECT rev FROM revisions WHERE collection = ?1",
                        params![collection.table()],
                        |row| row.get(0),
                    )
                    .optional()
                    .context("read revision")?
                    .unwrap_or(0);
                let marker = rev.to_string();
                let previous = cursor.markers.insert(collection, marker.clone());
                if !first_poll && previous.as_deref() != Some(marker.as_str()) {
                    changed.push(collection);
                }
            }
            Ok(())
        })?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_replaces_existing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(Collection::Teams, "t1", &json!({"id": "t1", "name": "Reds"}))
            .unwrap();
        store
            .upsert(Collection::Teams, "t1", &json!({"id": "t1", "name": "Blues"}))
            .unwrap();
        let rows = store.fetch(Collection::Teams).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Blues");
    }

    #[test]
    fn poll_reports_only_changed_collections() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut cursor = ChangeCursor::default();
        assert!(store.poll_changes(&mut cursor).unwrap().is_empty());
        store.upsert_setting("team_logo", "x").unwrap();
        assert_eq!(
            store.poll_changes(&mut cursor).unwrap(),
            vec![Collection::Settings]
        );
        assert!(store.poll_changes(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn settings_are_not_entity_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.fetch(Collection::Settings).is_err());
        assert_eq!(store.fetch_setting("missing").unwrap(), None);
    }
}
