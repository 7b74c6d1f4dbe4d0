use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, params};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// File holding every collection of a [`VectorDb`] directory.
pub const DATABASE_FILE: &str = "vectors.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER
);
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL REFERENCES collections (name),
    id TEXT NOT NULL,
    document TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    source TEXT,
    UNIQUE (collection, id)
);
CREATE INDEX IF NOT EXISTS records_source ON records (collection, source);
";

/// A stored chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Unique within the collection.
    pub id: String,
    /// The chunk text.
    pub document: String,
    /// The chunk embedding.
    pub embedding: Vec<f32>,
    /// Free-form attributes, `source` is used for replacement.
    pub metadata: Map<String, Value>,
}

impl Record {
    /// Returns the `source` metadata, if it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// A query result.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryHit {
    /// The record id.
    pub id: String,
    /// The chunk text.
    pub document: String,
    /// The record metadata.
    pub metadata: Map<String, Value>,
    /// Cosine similarity with the query, higher is closer.
    pub score: f32,
}

/// Returns the cosine similarity of `a` and `b`, or 0 when undefined.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A named set of records. Clones refer to the same collection.
#[derive(Clone)]
pub struct Collection {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl Collection {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the collection name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of records.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns `true` if some record has `source` metadata equal to `source`.
    pub fn has_source(&self, source: &str) -> Result<bool> {
        let found = self.lock().query_row(
            "SELECT EXISTS (SELECT 1 FROM records WHERE collection = ?1 AND source = ?2)",
            params![self.name, source],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Inserts records, replacing those with the same id in place.
    ///
    /// Every embedding must have the dimension of the first record ever
    /// added. Nothing is inserted if one of them does not.
    pub fn add(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        insert_records(&tx, &self.name, &records)?;
        tx.commit()?;
        trace!("added {} records to `{}`", records.len(), self.name);
        Ok(())
    }

    /// Returns the `n_results` records closest to `embedding`.
    ///
    /// Equal scores keep insertion order.
    pub fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>> {
        let conn = self.lock();
        if let Some(expected) = dimension(&conn, &self.name)? {
            if expected != embedding.len() {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT id, document, embedding, metadata FROM records
             WHERE collection = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, document, stored, metadata) = row?;
            let score = cosine_similarity(embedding, &decode(&stored));
            scored.push((score, id, document, metadata));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(n_results)
            .map(|(score, id, document, metadata)| {
                Ok(QueryHit {
                    id,
                    document,
                    metadata: serde_json::from_str(&metadata)?,
                    score,
                })
            })
            .collect()
    }

    /// Removes every record whose `source` metadata is `source`.
    ///
    /// Returns the number of removed records.
    pub fn delete_source(&self, source: &str) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = delete_source(&tx, &self.name, source)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Swaps the records of `source` for `records` in one transaction.
    ///
    /// On error the previous records are left untouched. Returns the
    /// number of removed records.
    pub fn replace_source(&self, source: &str, records: Vec<Record>) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = delete_source(&tx, &self.name, source)?;
        insert_records(&tx, &self.name, &records)?;
        tx.commit()?;
        debug!(
            "replaced {removed} records of {source} with {} in `{}`",
            records.len(),
            self.name
        );
        Ok(removed)
    }
}

fn dimension(conn: &Connection, collection: &str) -> Result<Option<usize>> {
    let dimension: Option<i64> = conn.query_row(
        "SELECT dimension FROM collections WHERE name = ?1",
        params![collection],
        |row| row.get(0),
    )?;
    Ok(dimension.map(|d| d as usize))
}

fn insert_records(conn: &Connection, collection: &str, records: &[Record]) -> Result<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let expected = dimension(conn, collection)?.unwrap_or(first.embedding.len());
    if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
        return Err(Error::DimensionMismatch {
            expected,
            actual: bad.embedding.len(),
        });
    }
    conn.execute(
        "UPDATE collections SET dimension = ?2 WHERE name = ?1",
        params![collection, expected as i64],
    )?;

    // An upsert keeps `seq`, so replaced records keep their rank.
    let mut stmt = conn.prepare(
        "INSERT INTO records (collection, id, document, embedding, metadata, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (collection, id) DO UPDATE SET
             document = excluded.document,
             embedding = excluded.embedding,
             metadata = excluded.metadata,
             source = excluded.source",
    )?;
    for record in records {
        stmt.execute(params![
            collection,
            record.id,
            record.document,
            encode(&record.embedding),
            serde_json::to_string(&record.metadata)?,
            record.source(),
        ])?;
    }
    Ok(())
}

fn delete_source(conn: &Connection, collection: &str, source: &str) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND source = ?2",
        params![collection, source],
    )?;
    conn.execute(
        "UPDATE collections SET dimension = NULL
         WHERE name = ?1 AND NOT EXISTS (SELECT 1 FROM records WHERE collection = ?1)",
        params![collection],
    )?;
    Ok(removed)
}

fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// A set of collections stored in one SQLite database.
pub struct VectorDb {
    conn: Arc<Mutex<Connection>>,
}

impl VectorDb {
    /// Opens or creates the database in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(DATABASE_FILE);
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!("opened {}", path.display());
        Self::initialize(conn)
    }

    /// Creates a database that lives only in memory.
    pub fn in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        // Other processes may be indexing the same directory.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn collection(&self, name: &str) -> Collection {
        Collection {
            conn: self.conn.clone(),
            name: name.to_owned(),
        }
    }

    /// Returns the collection `name`, creating it if needed.
    pub fn get_or_create_collection(&self, name: &str) -> Result<Collection> {
        validate_name(name)?;
        let created = self.lock().execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            params![name],
        )?;
        if created > 0 {
            info!("created collection `{name}`");
        }
        Ok(self.collection(name))
    }

    /// Returns the existing collection `name`.
    pub fn get_collection(&self, name: &str) -> Result<Collection> {
        let exists: bool = self.lock().query_row(
            "SELECT EXISTS (SELECT 1 FROM collections WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::CollectionNotFound(name.to_owned()));
        }
        Ok(self.collection(name))
    }

    /// Returns the collection names, sorted.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCollectionName(name.to_owned()))
    }
}
