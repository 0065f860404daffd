//! Durable storage: collections, documents, chunks, and embedding vectors.
//!
//! One SQLite database file holds the relational tables plus a `vec0`
//! virtual table (sqlite-vec) for the embedding vectors. The vector table
//! is created lazily at the dimension observed on the first insert; a later
//! model change is detected with a probe insert and handled by dropping and
//! recreating the table (prior vectors are lost — operators re-ingest).
//!
//! All access flows through a single [`tokio_rusqlite::Connection`], whose
//! worker thread serializes writers; mutating operations wrap their work in
//! one transaction and roll back on any error. Deletes cascade embeddings →
//! chunks → documents → collection.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::RagError;
use crate::models::{
    Chunk, ChunkType, CollectionInfo, CollectionStats, Document, DocumentInfo, Metadata,
};

/// Row id used by the dimension probe; never visible to queries because it
/// is deleted in the same call.
const PROBE_CHUNK_ID: &str = "dimension_probe";

fn register_sqlite_vec() -> Result<(), RagError> {
    use std::os::raw::c_char;
    use std::sync::atomic::{AtomicI32, Ordering};

    static INIT: Once = Once::new();
    static INIT_RC: AtomicI32 = AtomicI32::new(0);

    INIT.call_once(|| {
        let rc = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                std::mem::transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            rusqlite::ffi::sqlite3_auto_extension(Some(init_fn))
        };
        INIT_RC.store(rc, Ordering::SeqCst);
    });

    let rc = INIT_RC.load(Ordering::SeqCst);
    if rc != 0 {
        return Err(RagError::StorageFault(format!(
            "failed to register sqlite-vec extension (code {rc})"
        )));
    }
    Ok(())
}

/// Encodes a vector as the JSON text form sqlite-vec accepts.
fn vector_json(vector: &[f32]) -> String {
    serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string())
}

/// The shared on-disk store. Open once per process and pass around by
/// reference (or `Arc`); cloning the inner connection is cheap.
pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    /// Opens (creating if missing) the database at `path` and ensures the
    /// relational schema. The vector table is *not* created here — its
    /// dimension is unknown until the first embedding arrives.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        register_sqlite_vec()?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RagError::StorageFault(e.to_string()))?;
            }
        }

        let conn = Connection::open(path.as_ref().to_path_buf()).await?;

        let version: String = conn
            .call(|conn| Ok(conn.query_row("SELECT vec_version()", [], |row| row.get(0))?))
            .await
            .map_err(|e| RagError::StorageFault(format!("sqlite-vec not available: {e}")))?;
        debug!(version, "sqlite-vec loaded");

        let store = Self { conn };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), RagError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS collections (
                        name TEXT PRIMARY KEY,
                        description TEXT NOT NULL DEFAULT '',
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                    );

                    CREATE TABLE IF NOT EXISTS documents (
                        id TEXT PRIMARY KEY,
                        collection_name TEXT NOT NULL,
                        content TEXT NOT NULL,
                        source TEXT,
                        doc_type TEXT,
                        metadata TEXT NOT NULL DEFAULT '{}',
                        chunk_count INTEGER NOT NULL DEFAULT 0,
                        chunking_strategy TEXT,
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                        FOREIGN KEY (collection_name) REFERENCES collections(name)
                    );

                    CREATE TABLE IF NOT EXISTS enhanced_chunks (
                        id TEXT PRIMARY KEY,
                        document_id TEXT NOT NULL,
                        collection_name TEXT NOT NULL,
                        text TEXT NOT NULL,
                        parent_chunk_id TEXT,
                        child_chunk_ids TEXT NOT NULL DEFAULT '[]',
                        section TEXT,
                        subsection TEXT,
                        chunk_type TEXT NOT NULL,
                        start_pos INTEGER,
                        end_pos INTEGER,
                        chunk_index INTEGER,
                        keywords TEXT NOT NULL DEFAULT '[]',
                        metadata TEXT NOT NULL DEFAULT '{}',
                        confidence REAL NOT NULL DEFAULT 0.0,
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                        FOREIGN KEY (document_id) REFERENCES documents(id),
                        FOREIGN KEY (collection_name) REFERENCES collections(name)
                    );

                    CREATE INDEX IF NOT EXISTS idx_chunks_document ON enhanced_chunks(document_id);
                    CREATE INDEX IF NOT EXISTS idx_chunks_collection ON enhanced_chunks(collection_name);
                    CREATE INDEX IF NOT EXISTS idx_chunks_type ON enhanced_chunks(chunk_type);
                    CREATE INDEX IF NOT EXISTS idx_chunks_section ON enhanced_chunks(section);
                    CREATE INDEX IF NOT EXISTS idx_chunks_parent ON enhanced_chunks(parent_chunk_id);
                    CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_name);
                    CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type);
                    "#,
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Creates a collection. Idempotent: an existing collection (and its
    /// description) is left untouched.
    pub async fn create_collection(&self, name: &str, description: &str) -> Result<(), RagError> {
        if name.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "collection name must not be empty".to_string(),
            ));
        }
        let name = name.to_string();
        let description = description.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO collections (name, description) VALUES (?1, ?2)",
                    params![name, description],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Stores a document and all of its chunks in a single transaction.
    ///
    /// Re-ingesting an existing document id replaces the document and its
    /// chunks (and their vectors) wholesale. Embeddings are inserted
    /// separately via [`add_embeddings`](Self::add_embeddings).
    pub async fn add_document(&self, collection: &str, doc: &Document) -> Result<(), RagError> {
        let collection = collection.to_string();
        let doc = doc.clone();

        let known: bool = {
            let name = collection.clone();
            self.conn
                .call(move |conn| {
                    Ok(conn.query_row(
                        "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
                        params![name],
                        |row| row.get(0),
                    )?)
                })
                .await?
        };
        if !known {
            return Err(RagError::InvalidInput(format!(
                "unknown collection '{collection}'"
            )));
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                // wholesale replacement of any previous ingest of this id
                if embeddings_table_exists(&tx)? {
                    tx.execute(
                        "DELETE FROM chunk_embeddings WHERE chunk_id IN (
                            SELECT id FROM enhanced_chunks WHERE document_id = ?1
                        )",
                        params![doc.id],
                    )?;
                }
                tx.execute(
                    "DELETE FROM enhanced_chunks WHERE document_id = ?1",
                    params![doc.id],
                )?;

                let metadata_json =
                    serde_json::to_string(&doc.metadata).unwrap_or_else(|_| "{}".to_string());
                let chunking_strategy = doc
                    .metadata
                    .get("chunking_strategy")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                tx.execute(
                    "INSERT OR REPLACE INTO documents
                        (id, collection_name, content, source, doc_type, metadata,
                         chunk_count, chunking_strategy)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        doc.id,
                        collection,
                        doc.content,
                        doc.source,
                        doc.doc_type,
                        metadata_json,
                        doc.chunks.len() as i64,
                        chunking_strategy,
                    ],
                )?;

                for chunk in &doc.chunks {
                    insert_chunk(&tx, &collection, chunk)?;
                }

                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Stores the embedding vectors carried by `chunks`.
    ///
    /// The vector table's dimension is discovered from the first non-empty
    /// vector; the whole batch is rejected with
    /// [`RagError::DimensionMismatch`] if any vector disagrees. Chunks
    /// without a vector are skipped.
    pub async fn add_embeddings(&self, chunks: &[Chunk]) -> Result<(), RagError> {
        let dimension = chunks
            .iter()
            .map(|c| c.embedding.len())
            .find(|len| *len > 0)
            .ok_or_else(|| {
                RagError::InvalidInput("no valid embeddings found in chunks".to_string())
            })?;

        for chunk in chunks {
            if !chunk.embedding.is_empty() && chunk.embedding.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    got: chunk.embedding.len(),
                    expected: dimension,
                });
            }
        }

        self.ensure_embedding_table(dimension).await?;

        let rows: Vec<(String, String)> = chunks
            .iter()
            .filter(|c| !c.embedding.is_empty())
            .map(|c| (c.id.clone(), vector_json(&c.embedding)))
            .collect();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (chunk_id, vector) in &rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding)
                         VALUES (?1, ?2)",
                        params![chunk_id, vector],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Makes sure the vector table exists at `dimension`.
    ///
    /// An existing table is validated with a probe insert of a zero vector;
    /// if sqlite-vec reports a dimension mismatch, the table is dropped and
    /// recreated at the new dimension. That loses vectors embedded under a
    /// previous model — logged loudly as the operator's cue to re-ingest.
    async fn ensure_embedding_table(&self, dimension: usize) -> Result<(), RagError> {
        let recreated = self
            .conn
            .call(move |conn| {
                if embeddings_table_exists(conn)? {
                    let probe = vector_json(&vec![0.0f32; dimension]);
                    let result = conn.execute(
                        "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding)
                         VALUES (?1, ?2)",
                        params![PROBE_CHUNK_ID, probe],
                    );
                    match result {
                        Ok(_) => {
                            conn.execute(
                                "DELETE FROM chunk_embeddings WHERE chunk_id = ?1",
                                params![PROBE_CHUNK_ID],
                            )?;
                            return Ok(false);
                        }
                        Err(err) if err.to_string().to_lowercase().contains("dimension") => {
                            conn.execute("DROP TABLE chunk_embeddings", [])?;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }

                conn.execute(
                    &format!(
                        "CREATE VIRTUAL TABLE chunk_embeddings USING vec0(
                            chunk_id TEXT PRIMARY KEY,
                            embedding FLOAT[{dimension}]
                        )"
                    ),
                    [],
                )?;
                Ok(true)
            })
            .await?;

        if recreated {
            warn!(
                dimension,
                "embedding table (re)created; vectors from any previous model are gone"
            );
        }
        Ok(())
    }

    /// Returns up to `top_k` chunks ordered by decreasing similarity
    /// (`1 − cosine distance`), with metadata filters applied ahead of the
    /// k cut-off. Unknown filter keys are ignored.
    pub async fn query_similar(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<(Chunk, f64)>, RagError> {
        let collection = collection.to_string();
        let query_json = vector_json(query_vector);

        let mut sql = String::from(
            "SELECT c.id, c.document_id, c.text, c.parent_chunk_id, c.child_chunk_ids,
                    c.section, c.subsection, c.chunk_type, c.start_pos, c.end_pos,
                    c.chunk_index, c.keywords, c.metadata, c.confidence,
                    vec_distance_cosine(vt.embedding, ?1) AS distance
             FROM enhanced_chunks c
             JOIN chunk_embeddings vt ON c.id = vt.chunk_id
             WHERE c.collection_name = ?2",
        );
        let mut bind: Vec<Value> = vec![
            Value::Text(query_json),
            Value::Text(collection),
        ];

        // deterministic clause order regardless of map iteration
        let mut keys: Vec<&String> = filters.keys().collect();
        keys.sort();
        for key in keys {
            let value = &filters[key];
            match key.as_str() {
                "chunk_type" => {
                    bind.push(Value::Text(value.clone()));
                    sql.push_str(&format!(" AND c.chunk_type = ?{}", bind.len()));
                }
                "section" => {
                    bind.push(Value::Text(value.clone()));
                    sql.push_str(&format!(" AND c.section = ?{}", bind.len()));
                }
                "doc_type" => {
                    bind.push(Value::Text(value.clone()));
                    sql.push_str(&format!(
                        " AND c.document_id IN (SELECT id FROM documents WHERE doc_type = ?{})",
                        bind.len()
                    ));
                }
                other => debug!(key = other, "ignoring unknown metadata filter"),
            }
        }

        bind.push(Value::Integer(top_k as i64));
        sql.push_str(&format!(" ORDER BY distance ASC LIMIT ?{}", bind.len()));

        self.conn
            .call(move |conn| {
                if !embeddings_table_exists(conn)? {
                    return Ok(Vec::new());
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(bind), |row| {
                    let chunk = chunk_from_row(row)?;
                    let distance: f64 = row.get(14)?;
                    Ok((chunk, 1.0 - distance))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(RagError::from)
    }

    /// Returns the chunk plus its transitive parent chain, root-first.
    pub async fn get_chunk_with_parents(&self, chunk_id: &str) -> Result<Vec<Chunk>, RagError> {
        let id = chunk_id.to_string();
        let chunks: Vec<Chunk> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "WITH RECURSIVE chunk_hierarchy AS (
                        SELECT id, document_id, text, parent_chunk_id, child_chunk_ids,
                               section, subsection, chunk_type, start_pos, end_pos,
                               chunk_index, keywords, metadata, confidence, 0 AS level
                        FROM enhanced_chunks
                        WHERE id = ?1

                        UNION ALL

                        SELECT c.id, c.document_id, c.text, c.parent_chunk_id, c.child_chunk_ids,
                               c.section, c.subsection, c.chunk_type, c.start_pos, c.end_pos,
                               c.chunk_index, c.keywords, c.metadata, c.confidence, ch.level + 1
                        FROM enhanced_chunks c
                        JOIN chunk_hierarchy ch ON c.id = ch.parent_chunk_id
                    )
                    SELECT * FROM chunk_hierarchy ORDER BY level DESC",
                )?;
                let rows = stmt.query_map(params![id], chunk_from_row)?;
                let mut chunks = Vec::new();
                for row in rows {
                    chunks.push(row?);
                }
                Ok(chunks)
            })
            .await?;

        if chunks.is_empty() {
            return Err(RagError::NotFound(format!("chunk '{chunk_id}'")));
        }
        Ok(chunks)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>, RagError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, description, created_at,
                            (SELECT COUNT(*) FROM documents d
                              WHERE d.collection_name = collections.name),
                            (SELECT COUNT(*) FROM enhanced_chunks c
                              WHERE c.collection_name = collections.name)
                     FROM collections
                     ORDER BY created_at DESC, name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(CollectionInfo {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        created_at: row.get(2)?,
                        document_count: row.get(3)?,
                        chunk_count: row.get(4)?,
                    })
                })?;
                let mut collections = Vec::new();
                for row in rows {
                    collections.push(row?);
                }
                Ok(collections)
            })
            .await
            .map_err(RagError::from)
    }

    pub async fn list_documents(&self, collection: &str) -> Result<Vec<DocumentInfo>, RagError> {
        self.require_collection(collection).await?;
        let collection = collection.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT d.id, COALESCE(d.source, ''), COALESCE(d.doc_type, ''),
                            d.created_at, COUNT(c.id)
                     FROM documents d
                     LEFT JOIN enhanced_chunks c ON d.id = c.document_id
                     WHERE d.collection_name = ?1
                     GROUP BY d.id
                     ORDER BY d.created_at DESC, d.id",
                )?;
                let rows = stmt.query_map(params![collection], |row| {
                    Ok(DocumentInfo {
                        id: row.get(0)?,
                        source: row.get(1)?,
                        doc_type: row.get(2)?,
                        created_at: row.get(3)?,
                        chunk_count: row.get(4)?,
                    })
                })?;
                let mut documents = Vec::new();
                for row in rows {
                    documents.push(row?);
                }
                Ok(documents)
            })
            .await
            .map_err(RagError::from)
    }

    pub async fn collection_stats(&self, collection: &str) -> Result<CollectionStats, RagError> {
        self.require_collection(collection).await?;
        let name = collection.to_string();
        self.conn
            .call(move |conn| {
                let (description, created_at): (String, String) = conn.query_row(
                    "SELECT description, created_at FROM collections WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                let document_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection_name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                let chunk_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM enhanced_chunks WHERE collection_name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;

                let mut chunk_types = HashMap::new();
                let mut stmt = conn.prepare(
                    "SELECT chunk_type, COUNT(*) FROM enhanced_chunks
                     WHERE collection_name = ?1 GROUP BY chunk_type",
                )?;
                let rows = stmt.query_map(params![name], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (kind, count) = row?;
                    chunk_types.insert(kind, count);
                }

                let mut document_types = HashMap::new();
                let mut stmt = conn.prepare(
                    "SELECT COALESCE(doc_type, ''), COUNT(*) FROM documents
                     WHERE collection_name = ?1 GROUP BY doc_type",
                )?;
                let rows = stmt.query_map(params![name], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (kind, count) = row?;
                    document_types.insert(kind, count);
                }

                Ok(CollectionStats {
                    name: name.clone(),
                    description,
                    created_at,
                    document_count,
                    chunk_count,
                    chunk_types,
                    document_types,
                })
            })
            .await
            .map_err(RagError::from)
    }

    /// Deletes a document, its chunks, and their vectors atomically.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), RagError> {
        let id = document_id.to_string();
        let deleted: bool = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Ok(false);
                }

                if embeddings_table_exists(&tx)? {
                    tx.execute(
                        "DELETE FROM chunk_embeddings WHERE chunk_id IN (
                            SELECT id FROM enhanced_chunks WHERE document_id = ?1
                        )",
                        params![id],
                    )?;
                }
                let chunks_deleted = tx.execute(
                    "DELETE FROM enhanced_chunks WHERE document_id = ?1",
                    params![id],
                )?;
                tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;

                tx.commit()?;
                info!(document = %id, chunks = chunks_deleted, "document deleted");
                Ok(true)
            })
            .await?;

        if !deleted {
            return Err(RagError::NotFound(format!("document '{document_id}'")));
        }
        Ok(())
    }

    /// Deletes every document in a collection; the collection row stays.
    pub async fn delete_all_documents(&self, collection: &str) -> Result<u64, RagError> {
        let name = collection.to_string();
        let deleted: Option<u64> = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let doc_count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection_name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                if doc_count == 0 {
                    return Ok(None);
                }

                if embeddings_table_exists(&tx)? {
                    tx.execute(
                        "DELETE FROM chunk_embeddings WHERE chunk_id IN (
                            SELECT id FROM enhanced_chunks WHERE collection_name = ?1
                        )",
                        params![name],
                    )?;
                }
                tx.execute(
                    "DELETE FROM enhanced_chunks WHERE collection_name = ?1",
                    params![name],
                )?;
                tx.execute(
                    "DELETE FROM documents WHERE collection_name = ?1",
                    params![name],
                )?;

                tx.commit()?;
                info!(collection = %name, documents = doc_count, "all documents deleted");
                Ok(Some(doc_count as u64))
            })
            .await?;

        deleted.ok_or_else(|| {
            RagError::NotFound(format!("documents in collection '{collection}'"))
        })
    }

    /// Deletes a collection and everything it owns.
    pub async fn delete_collection(&self, collection: &str) -> Result<(), RagError> {
        let name = collection.to_string();
        let deleted: bool = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                if embeddings_table_exists(&tx)? {
                    tx.execute(
                        "DELETE FROM chunk_embeddings WHERE chunk_id IN (
                            SELECT id FROM enhanced_chunks WHERE collection_name = ?1
                        )",
                        params![name],
                    )?;
                }
                tx.execute(
                    "DELETE FROM enhanced_chunks WHERE collection_name = ?1",
                    params![name],
                )?;
                tx.execute(
                    "DELETE FROM documents WHERE collection_name = ?1",
                    params![name],
                )?;
                let rows = tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;

                tx.commit()?;
                Ok(rows > 0)
            })
            .await?;

        if !deleted {
            return Err(RagError::NotFound(format!("collection '{collection}'")));
        }
        Ok(())
    }

    async fn require_collection(&self, collection: &str) -> Result<(), RagError> {
        let name = collection.to_string();
        let exists: bool = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?)
            })
            .await?;
        if !exists {
            return Err(RagError::NotFound(format!("collection '{collection}'")));
        }
        Ok(())
    }
}

fn embeddings_table_exists(conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master
         WHERE type = 'table' AND name = 'chunk_embeddings'",
        [],
        |row| row.get(0),
    )
}

fn insert_chunk(
    tx: &rusqlite::Transaction<'_>,
    collection: &str,
    chunk: &Chunk,
) -> rusqlite::Result<()> {
    let child_ids_json =
        serde_json::to_string(&chunk.child_chunk_ids).unwrap_or_else(|_| "[]".to_string());
    let keywords_json =
        serde_json::to_string(&chunk.keywords).unwrap_or_else(|_| "[]".to_string());
    let metadata_json =
        serde_json::to_string(&chunk.metadata).unwrap_or_else(|_| "{}".to_string());

    tx.execute(
        "INSERT OR REPLACE INTO enhanced_chunks
            (id, document_id, collection_name, text, parent_chunk_id, child_chunk_ids,
             section, subsection, chunk_type, start_pos, end_pos, chunk_index,
             keywords, metadata, confidence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            chunk.id,
            chunk.document_id,
            collection,
            chunk.text,
            chunk.parent_chunk_id,
            child_ids_json,
            chunk.section,
            chunk.subsection,
            chunk.chunk_type.as_str(),
            chunk.start_pos.map(|p| p as i64),
            chunk.end_pos.map(|p| p as i64),
            chunk.chunk_index as i64,
            keywords_json,
            metadata_json,
            chunk.confidence,
        ],
    )?;
    Ok(())
}

/// Hydrates a chunk from the column order shared by the similarity query
/// and the parent-chain query.
fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let child_ids_json: String = row.get(4)?;
    let chunk_type: String = row.get(7)?;
    let keywords_json: String = row.get(11)?;
    let metadata_json: String = row.get(12)?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        text: row.get(2)?,
        embedding: Vec::new(),
        parent_chunk_id: row.get(3)?,
        child_chunk_ids: serde_json::from_str(&child_ids_json).unwrap_or_default(),
        section: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        subsection: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        chunk_type: ChunkType::from_str(&chunk_type).unwrap_or(ChunkType::Legacy),
        start_pos: row.get::<_, Option<i64>>(8)?.map(|p| p as usize),
        end_pos: row.get::<_, Option<i64>>(9)?.map(|p| p as usize),
        chunk_index: row.get::<_, Option<i64>>(10)?.unwrap_or(0) as usize,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        metadata: serde_json::from_str::<Metadata>(&metadata_json).unwrap_or_default(),
        confidence: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
    })
}
