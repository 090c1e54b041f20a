//! SQLite-backed event and option storage.

use crate::application::ports::{EventStore, OptionStore, StoreError};
use crate::domain::event::{
    Category, CategoryCounts, Event, EventFilter, RiskLevel, StoredEvent, SubtypeCount,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long a statement waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_COLUMNS: &str =
    "id, created_at, ip, user_agent, path, status, category, subtype, risk_level";

/// Thread-safe SQLite store holding the event table and the option table.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                path TEXT NOT NULL,
                status INTEGER NOT NULL,
                category TEXT NOT NULL,
                subtype TEXT NOT NULL,
                risk_level TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
            CREATE INDEX IF NOT EXISTS idx_events_category ON events(category);
            CREATE INDEX IF NOT EXISTS idx_events_subtype ON events(subtype);
            CREATE INDEX IF NOT EXISTS idx_events_status ON events(status);
            CREATE INDEX IF NOT EXISTS idx_events_risk_level ON events(risk_level);

            CREATE TABLE IF NOT EXISTS options (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection lock poisoned")
    }
}

/// Fixed-width UTC timestamp, so text order equals time order.
fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let created_at: String = row.get(1)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(StoredEvent {
        id: row.get(0)?,
        event: Event {
            created_at,
            ip: row.get(2)?,
            user_agent: row.get(3)?,
            path: row.get(4)?,
            status: row.get(5)?,
            category: decode_column::<Category>(row, 6)?,
            subtype: row.get(7)?,
            risk_level: decode_column::<RiskLevel>(row, 8)?,
        },
    })
}

/// LIKE pattern matching `text` anywhere, with wildcards in `text` escaped.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

impl EventStore for SqliteStore {
    fn insert(&self, event: &Event) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO events (created_at, ip, user_agent, path, status, category, subtype, risk_level)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                encode_time(event.created_at),
                event.ip,
                event.user_agent,
                event.path,
                event.status,
                event.category.as_str(),
                event.subtype,
                event.risk_level.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &EventFilter, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let mut sql = format!("SELECT {} FROM events WHERE 1=1", EVENT_COLUMNS);
        let mut args: Vec<Value> = Vec::new();

        if let Some(category) = filter.category {
            sql.push_str(" AND category = ?");
            args.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(status) = filter.effective_status() {
            sql.push_str(" AND status = ?");
            args.push(Value::Integer(i64::from(status)));
        }
        if let Some(text) = filter.effective_text() {
            sql.push_str(
                r" AND (user_agent LIKE ? ESCAPE '\' OR path LIKE ? ESCAPE '\'
                   OR ip LIKE ? ESCAPE '\' OR subtype LIKE ? ESCAPE '\')",
            );
            let pattern = contains_pattern(text);
            for _ in 0..4 {
                args.push(Value::Text(pattern.clone()));
            }
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(args), read_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn count_by_category(&self) -> Result<CategoryCounts, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM events GROUP BY category")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = CategoryCounts::default();
        for (category, count) in rows {
            match category.parse::<Category>() {
                Ok(Category::Search) => counts.search = count_to_u64(count),
                Ok(Category::Risk) => counts.risk = count_to_u64(count),
                Err(e) => tracing::warn!(error = %e, "Skipping unknown category in counts"),
            }
        }
        Ok(counts)
    }

    fn count_search_by_subtype(&self) -> Result<Vec<SubtypeCount>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT subtype, COUNT(*) AS cnt FROM events WHERE category = ?
             GROUP BY subtype ORDER BY cnt DESC, subtype ASC",
        )?;
        let counts = stmt
            .query_map([Category::Search.as_str()], |row| {
                Ok(SubtypeCount {
                    subtype: row.get(0)?,
                    count: count_to_u64(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn().execute(
            "DELETE FROM events WHERE created_at < ?",
            [encode_time(cutoff)],
        )?;
        Ok(deleted)
    }

    fn truncate_all(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        // Rolled back on drop if any statement fails
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM events", [])?;
        // Also restart ids, like TRUNCATE does.
        tx.execute("DELETE FROM sqlite_sequence WHERE name = 'events'", [])?;
        tx.commit()?;
        Ok(())
    }
}

impl OptionStore for SqliteStore {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()
            .query_row("SELECT value FROM options WHERE name = ?", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO options (name, value) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classify::{Classification, RiskTag};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn search(created_at: DateTime<Utc>, bot: &'static str) -> Event {
        Event::new(
            Classification::Search(bot),
            created_at,
            "66.249.66.1",
            "Mozilla/5.0 (compatible; Googlebot/2.1)",
            "/",
            200,
        )
    }

    fn risk(created_at: DateTime<Utc>, path: &str, status: u16) -> Event {
        Event::new(
            Classification::Risk(RiskLevel::High, RiskTag::ProbePath),
            created_at,
            "203.0.113.7",
            "curl/7.88",
            path,
            status,
        )
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let event = risk(at(1), "/.env", 200);

        let id = store.insert(&event).unwrap();
        assert!(id > 0);

        let events = store.query(&EventFilter::all(), 10).unwrap();
        assert_eq!(events, vec![StoredEvent { id, event }]);
    }

    #[test]
    fn test_query_newest_first_with_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&search(at(1), "Googlebot")).unwrap();
        store.insert(&search(at(3), "bingbot")).unwrap();
        store.insert(&search(at(2), "Slurp")).unwrap();

        let events = store.query(&EventFilter::all(), 2).unwrap();
        let subtypes: Vec<_> = events.iter().map(|e| e.event.subtype.as_str()).collect();
        assert_eq!(subtypes, vec!["bingbot", "Slurp"]);
    }

    #[test]
    fn test_same_timestamp_orders_by_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.insert(&search(at(1), "Googlebot")).unwrap();
        let second = store.insert(&search(at(1), "bingbot")).unwrap();

        let ids: Vec<_> = store
            .query(&EventFilter::all(), 10)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&search(at(1), "Googlebot")).unwrap();
        store.insert(&risk(at(2), "/wp-login.php", 403)).unwrap();
        store.insert(&risk(at(3), "/.env", 200)).unwrap();

        let risks = store
            .query(&EventFilter::all().with_category(Category::Risk), 10)
            .unwrap();
        assert_eq!(risks.len(), 2);

        let forbidden = store
            .query(&EventFilter::all().with_status(403), 10)
            .unwrap();
        assert_eq!(forbidden.len(), 1);
        assert_eq!(forbidden[0].event.path, "/wp-login.php");

        let any_status = store.query(&EventFilter::all().with_status(0), 10).unwrap();
        assert_eq!(any_status.len(), 3);

        let by_text = store
            .query(&EventFilter::all().with_text("LOGIN"), 10)
            .unwrap();
        assert_eq!(by_text.len(), 1);

        let by_ip = store
            .query(&EventFilter::all().with_text("66.249"), 10)
            .unwrap();
        assert_eq!(by_ip.len(), 1);
        assert_eq!(by_ip[0].event.category, Category::Search);
    }

    #[test]
    fn test_text_wildcards_are_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&risk(at(1), "/a_b", 200)).unwrap();
        store.insert(&risk(at(2), "/axb", 200)).unwrap();

        let events = store
            .query(&EventFilter::all().with_text("a_b"), 10)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.path, "/a_b");

        assert!(store
            .query(&EventFilter::all().with_text("100%"), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_counts() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&search(at(1), "Googlebot")).unwrap();
        store.insert(&search(at(2), "Googlebot")).unwrap();
        store.insert(&search(at(3), "bingbot")).unwrap();
        store.insert(&risk(at(4), "/.env", 200)).unwrap();

        assert_eq!(
            store.count_by_category().unwrap(),
            CategoryCounts { search: 3, risk: 1 }
        );
        assert_eq!(
            store.count_search_by_subtype().unwrap(),
            vec![
                SubtypeCount {
                    subtype: "Googlebot".to_string(),
                    count: 2
                },
                SubtypeCount {
                    subtype: "bingbot".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_delete_older_than_is_strict() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&search(at(1), "Googlebot")).unwrap();
        store.insert(&search(at(2), "Googlebot")).unwrap();
        store.insert(&search(at(3), "Googlebot")).unwrap();

        assert_eq!(store.delete_older_than(at(2)).unwrap(), 1);
        assert_eq!(store.query(&EventFilter::all(), 10).unwrap().len(), 2);
        assert_eq!(store.delete_older_than(at(2)).unwrap(), 0);
    }

    #[test]
    fn test_truncate_restarts_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&search(at(1), "Googlebot")).unwrap();
        store.insert(&search(at(2), "Googlebot")).unwrap();

        store.truncate_all().unwrap();
        assert_eq!(store.count_by_category().unwrap().total(), 0);
        assert_eq!(store.insert(&search(at(3), "Googlebot")).unwrap(), 1);
    }

    #[test]
    fn test_failed_truncate_does_not_hold_a_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");
        let store = SqliteStore::open(&path).unwrap();
        store
            .conn()
            .busy_timeout(Duration::from_millis(50))
            .unwrap();
        store.insert(&search(at(1), "Googlebot")).unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE;").unwrap();
        assert!(store.truncate_all().is_err());
        assert!(store.conn().is_autocommit());
        other.execute_batch("COMMIT;").unwrap();

        store.insert(&search(at(2), "bingbot")).unwrap();
        let visible: i64 = other
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(visible, 2);
    }

    #[test]
    fn test_options_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("maintenance_last_run", "100").unwrap();
        store.set("maintenance_last_run", "200").unwrap();
        assert_eq!(
            store.get("maintenance_last_run").unwrap().as_deref(),
            Some("200")
        );
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO events (created_at, ip, user_agent, path, status, category, subtype, risk_level)
                 VALUES ('yesterday', '', '', '/', 200, 'search', 'Googlebot', '')",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.query(&EventFilter::all(), 10),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_contains_pattern_escapes() {
        assert_eq!(contains_pattern("a%b_c\\"), "%a\\%b\\_c\\\\%");
    }
}
