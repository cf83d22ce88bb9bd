//! SQLite-backed store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{
    CatalogRecord, ImportRequest, ImportStatus, ImportStore, Layer, LayerStore, NewCatalogRecord,
    NewImport, NewLayer, RecordStore, StoreError, User, UserStore,
};

const IMPORT_COLUMNS: &str =
    "id, category, user_id, layer_id, status, created_at, updated_at, finished_at";

const RECORD_COLUMNS: &str = "id, page_id, title, unique_id, description, source_uri, upload_url, \
     image_url, public, map_type, status, import_id, owner_id, layer_id, created_at, updated_at";

const LAYER_COLUMNS: &str = "id, name, user_id, source_uri, created_at, updated_at";

/// SQLite-backed store for imports, maps, layers and users.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Maps unique-constraint violations to `Conflict`.
fn write_err(e: rusqlite::Error, what: impl Into<String>) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(what.into())
        }
        _ => db_err(e),
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, value: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

impl SqliteStore {
    /// Create a new SQLite store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS layers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                user_id INTEGER NOT NULL,
                source_uri TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- References are checked by import validation, not by the schema
            CREATE TABLE IF NOT EXISTS imports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                layer_id INTEGER,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_imports_user ON imports(user_id);

            -- One row per Commons page; page_id uniqueness makes concurrent
            -- imports of overlapping categories safe.
            CREATE TABLE IF NOT EXISTS maps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                page_id INTEGER NOT NULL UNIQUE,
                title TEXT NOT NULL,
                unique_id TEXT NOT NULL,
                description TEXT NOT NULL,
                source_uri TEXT NOT NULL,
                upload_url TEXT NOT NULL,
                image_url TEXT NOT NULL,
                public INTEGER NOT NULL DEFAULT 1,
                map_type TEXT NOT NULL,
                status TEXT NOT NULL,
                import_id INTEGER,
                import_seq INTEGER,
                owner_id INTEGER NOT NULL,
                layer_id INTEGER,
                layer_position INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_maps_import ON maps(import_id, import_seq);
            CREATE INDEX IF NOT EXISTS idx_maps_layer ON maps(layer_id, layer_position);

            -- Collaborators
            CREATE TABLE IF NOT EXISTS map_users (
                map_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                PRIMARY KEY (map_id, user_id)
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_import(row: &rusqlite::Row) -> rusqlite::Result<ImportRequest> {
        let status_str: String = row.get(4)?;
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;
        let finished_at_str: Option<String> = row.get(7)?;

        Ok(ImportRequest {
            id: row.get(0)?,
            category: row.get(1)?,
            user_id: row.get(2)?,
            layer_id: row.get(3)?,
            status: parse_column(4, &status_str)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            finished_at: finished_at_str.as_deref().map(parse_timestamp),
        })
    }

    /// Convert a row to CatalogRecord (without collaborators).
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<CatalogRecord> {
        let page_id: i64 = row.get(1)?;
        let map_type_str: String = row.get(9)?;
        let status_str: String = row.get(10)?;
        let created_at_str: String = row.get(14)?;
        let updated_at_str: String = row.get(15)?;

        Ok(CatalogRecord {
            id: row.get(0)?,
            page_id: page_id as u64,
            title: row.get(2)?,
            unique_id: row.get(3)?,
            description: row.get(4)?,
            source_uri: row.get(5)?,
            upload_url: row.get(6)?,
            image_url: row.get(7)?,
            public: row.get(8)?,
            map_type: parse_column(9, &map_type_str)?,
            status: parse_column(10, &status_str)?,
            import_id: row.get(11)?,
            owner_id: row.get(12)?,
            collaborators: Vec::new(), // Loaded separately
            layer_id: row.get(13)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn row_to_layer(row: &rusqlite::Row) -> rusqlite::Result<Layer> {
        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        Ok(Layer {
            id: row.get(0)?,
            name: row.get(1)?,
            user_id: row.get(2)?,
            source_uri: row.get(3)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at_str: String = row.get(2)?;

        Ok(User {
            id: row.get(0)?,
            login: row.get(1)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn load_collaborators(conn: &Connection, map_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT user_id FROM map_users WHERE map_id = ? ORDER BY rowid")
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![map_id], |row| row.get(0))
            .map_err(db_err)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row.map_err(db_err)?);
        }
        Ok(users)
    }

    fn fetch_import(conn: &Connection, id: i64) -> Result<Option<ImportRequest>, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM imports WHERE id = ?", IMPORT_COLUMNS),
            params![id],
            Self::row_to_import,
        )
        .optional()
        .map_err(db_err)
    }

    fn fetch_record(conn: &Connection, id: i64) -> Result<Option<CatalogRecord>, StoreError> {
        let record = conn
            .query_row(
                &format!("SELECT {} FROM maps WHERE id = ?", RECORD_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()
            .map_err(db_err)?;

        match record {
            Some(mut record) => {
                record.collaborators = Self::load_collaborators(conn, record.id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn next_import_seq(conn: &Connection, import_id: i64) -> Result<i64, StoreError> {
        conn.query_row(
            "SELECT COALESCE(MAX(import_seq), 0) + 1 FROM maps WHERE import_id = ?",
            params![import_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}

impl ImportStore for SqliteStore {
    fn create_import(&self, request: NewImport) -> Result<ImportRequest, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();
        let status = ImportStatus::Ready;

        conn.execute(
            "INSERT INTO imports (category, user_id, layer_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                request.category,
                request.user_id,
                request.layer_id,
                status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        Ok(ImportRequest {
            id: conn.last_insert_rowid(),
            category: request.category,
            user_id: request.user_id,
            layer_id: request.layer_id,
            status,
            created_at: now,
            updated_at: now,
            finished_at: None,
        })
    }

    fn get_import(&self, id: i64) -> Result<Option<ImportRequest>, StoreError> {
        let conn = self.lock()?;
        Self::fetch_import(&conn, id)
    }

    fn update_import_status(
        &self,
        id: i64,
        status: ImportStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<ImportRequest, StoreError> {
        let conn = self.lock()?;

        let current = Self::fetch_import(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("import {}", id)))?;

        if !current.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                import_id: id,
                from: current.status,
                to: status,
            });
        }

        let now = Utc::now();
        conn.execute(
            "UPDATE imports SET status = ?, updated_at = ?, finished_at = COALESCE(?, finished_at) WHERE id = ?",
            params![
                status.as_str(),
                now.to_rfc3339(),
                finished_at.map(|t| t.to_rfc3339()),
                id,
            ],
        )
        .map_err(db_err)?;

        Ok(ImportRequest {
            status,
            updated_at: now,
            finished_at: finished_at.or(current.finished_at),
            ..current
        })
    }

    fn set_import_layer(&self, id: i64, layer_id: i64) -> Result<ImportRequest, StoreError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE imports SET layer_id = ?, updated_at = ? WHERE id = ?",
                params![layer_id, Utc::now().to_rfc3339(), id],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("import {}", id)));
        }

        Self::fetch_import(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("import {}", id)))
    }

    fn import_records(&self, id: i64) -> Result<Vec<CatalogRecord>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM maps WHERE import_id = ? ORDER BY import_seq ASC, id ASC",
                RECORD_COLUMNS
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![id], Self::row_to_record)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let mut record = row.map_err(db_err)?;
            record.collaborators = Self::load_collaborators(&conn, record.id)?;
            records.push(record);
        }
        Ok(records)
    }
}

impl RecordStore for SqliteStore {
    fn find_record_by_page_id(&self, page_id: u64) -> Result<Option<CatalogRecord>, StoreError> {
        let conn = self.lock()?;

        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM maps WHERE page_id = ?",
                params![page_id as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        match id {
            Some(id) => Self::fetch_record(&conn, id),
            None => Ok(None),
        }
    }

    fn create_record(&self, record: NewCatalogRecord) -> Result<CatalogRecord, StoreError> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction().map_err(db_err)?;
        let seq = Self::next_import_seq(&tx, record.import_id)?;

        tx.execute(
            "INSERT INTO maps (page_id, title, unique_id, description, source_uri, upload_url, image_url, public, map_type, status, import_id, import_seq, owner_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.page_id as i64,
                record.title,
                record.unique_id,
                record.description,
                record.source_uri,
                record.upload_url,
                record.image_url,
                record.public,
                record.map_type.as_str(),
                record.status.as_str(),
                record.import_id,
                seq,
                record.owner_id,
                now,
                now,
            ],
        )
        .map_err(|e| write_err(e, format!("map with page_id {} already exists", record.page_id)))?;

        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT OR IGNORE INTO map_users (map_id, user_id) VALUES (?, ?)",
            params![id, record.owner_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Self::fetch_record(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("map {}", id)))
    }

    fn relink_record(&self, record_id: i64, import_id: i64) -> Result<CatalogRecord, StoreError> {
        let conn = self.lock()?;

        let current = Self::fetch_record(&conn, record_id)?
            .ok_or_else(|| StoreError::NotFound(format!("map {}", record_id)))?;

        if current.import_id == Some(import_id) {
            return Ok(current);
        }

        let seq = Self::next_import_seq(&conn, import_id)?;
        let now = Utc::now();

        conn.execute(
            "UPDATE maps SET import_id = ?, import_seq = ?, updated_at = ? WHERE id = ?",
            params![import_id, seq, now.to_rfc3339(), record_id],
        )
        .map_err(db_err)?;

        Ok(CatalogRecord {
            import_id: Some(import_id),
            updated_at: now,
            ..current
        })
    }

    fn count_records(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM maps", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as u64)
    }
}

impl LayerStore for SqliteStore {
    fn find_layer_by_name(&self, name: &str) -> Result<Option<Layer>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM layers WHERE name = ?", LAYER_COLUMNS),
            params![name],
            Self::row_to_layer,
        )
        .optional()
        .map_err(db_err)
    }

    fn layer_exists(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM layers WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn create_layer(&self, layer: NewLayer) -> Result<Layer, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO layers (name, user_id, source_uri, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![
                layer.name,
                layer.user_id,
                layer.source_uri,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| write_err(e, format!("layer '{}' already exists", layer.name)))?;

        Ok(Layer {
            id: conn.last_insert_rowid(),
            name: layer.name,
            user_id: layer.user_id,
            source_uri: layer.source_uri,
            created_at: now,
            updated_at: now,
        })
    }

    fn layer_members(&self, layer_id: i64) -> Result<Vec<i64>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT id FROM maps WHERE layer_id = ? ORDER BY layer_position ASC, id ASC")
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![layer_id], |row| row.get(0))
            .map_err(db_err)?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(db_err)?);
        }
        Ok(ids)
    }

    fn append_layer_members(&self, layer_id: i64, record_ids: &[i64]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction().map_err(db_err)?;

        let mut position: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(layer_position), 0) FROM maps WHERE layer_id = ?",
                params![layer_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        for record_id in record_ids {
            let current_layer: Option<i64> = tx
                .query_row(
                    "SELECT layer_id FROM maps WHERE id = ?",
                    params![record_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
                .ok_or_else(|| StoreError::NotFound(format!("map {}", record_id)))?;

            if current_layer == Some(layer_id) {
                continue;
            }

            position += 1;
            tx.execute(
                "UPDATE maps SET layer_id = ?, layer_position = ?, updated_at = ? WHERE id = ?",
                params![layer_id, position, now, record_id],
            )
            .map_err(db_err)?;
        }

        tx.execute(
            "UPDATE layers SET updated_at = ? WHERE id = ?",
            params![now, layer_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }
}

impl UserStore for SqliteStore {
    fn create_user(&self, login: &str) -> Result<User, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (login, created_at) VALUES (?, ?)",
            params![login, now.to_rfc3339()],
        )
        .map_err(|e| write_err(e, format!("user '{}' already exists", login)))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            login: login.to_string(),
            created_at: now,
        })
    }

    fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, login, created_at FROM users WHERE login = ?",
            params![login],
            Self::row_to_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn user_exists(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}
