use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::utils::AppError;

const DB_SCHEMA_VERSION: i64 = 1;

/// Single SQLite connection shared by all workers.
///
/// Every query runs on tokio's blocking pool so request handlers never block
/// an actix worker while SQLite does file I/O.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens `sqlite://path`, a bare path, or `:memory:` and creates the tables.
    pub async fn open(url: &str) -> Result<Self, AppError> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
            .to_string();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, AppError> {
            if path == ":memory:" {
                return Ok(Connection::open_in_memory()?);
            }

            if let Some(parent) = Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Persistence(format!("cannot create {}: {}", parent.display(), e))
                    })?;
                }
            }

            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(conn)
        })
        .await
        .map_err(|e| AppError::Persistence(format!("database worker failed: {}", e)))??;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn call<F, R>(&self, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut Connection) -> Result<R, AppError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                AppError::Persistence("database connection lock poisoned".to_string())
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AppError::Persistence(format!("database worker failed: {}", e)))?
    }

    /// Health check
    pub async fn ping(&self) -> Result<(), AppError> {
        self.call(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), AppError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        log::info!("🔧 Creating database tables...");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                age INTEGER NOT NULL CHECK(age >= 0),
                gender TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                height_cm REAL,
                weight_kg REAL,
                lifestyle_score REAL,
                smoking_status TEXT,
                exercise_frequency TEXT,
                diet_type TEXT,
                medical_conditions TEXT NOT NULL DEFAULT '[]',
                insurance_risk_score REAL,
                diabetes_risk_score REAL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                CHECK ((insurance_risk_score IS NULL) = (diabetes_risk_score IS NULL))
            );

            CREATE TABLE IF NOT EXISTS sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                records_affected INTEGER NOT NULL,
                error_kind TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sync_log_started_at ON sync_log(started_at);
            ",
        )?;
        conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION)?;
        log::info!("✅ Database tables ready");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_pings() {
        let db = Database::open(":memory:").await.unwrap();
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn creates_file_database_with_parent_dirs() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("records.db");
        let url = format!("sqlite://{}", path.display());

        let db = Database::open(&url).await.unwrap();
        db.ping().await.unwrap();
        assert!(path.exists());

        // Reopening an initialized file keeps the schema version.
        drop(db);
        let db = Database::open(&url).await.unwrap();
        let version = db
            .call(|conn| {
                Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, i64>(0))?)
            })
            .await
            .unwrap();
        assert_eq!(version, DB_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn scores_must_be_both_present_or_both_absent() {
        let db = Database::open(":memory:").await.unwrap();
        let result = db
            .call(|conn| {
                conn.execute(
                    "INSERT INTO user_records
                         (user_id, name, age, gender, insurance_risk_score, created_at, updated_at)
                     VALUES ('u1', 'Ana', 30, 'female', 10.0, 0, 0)",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
    }
}
