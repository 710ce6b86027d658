// LanceDB persistence for the vector index
// One fixed slot on disk: a `chunks` table plus a JSON manifest written last


use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{IndexedChunk, VectorIndex};
use crate::embeddings::DocumentChunk;
use crate::{RagError, Result};

const TABLE_NAME: &str = "chunks";
const MANIFEST_FILE: &str = "manifest.json";
const FORMAT_VERSION: u32 = 1;

/// Metadata needed to trust a saved index when it is read back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    /// Identity of the embedding model the stored vectors came from
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// The on-disk slot holding the most recently uploaded document's index
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Whether a complete save is present
    #[inline]
    pub fn exists(&self) -> bool {
        self.manifest_path().is_file()
    }

    /// Read the manifest of the current save
    #[inline]
    pub fn manifest(&self) -> Result<IndexManifest> {
        let manifest_path = self.manifest_path();
        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::NotFound(format!(
                    "No saved index at {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(RagError::Io(e)),
        };

        serde_json::from_str(&content)
            .map_err(|e| RagError::Storage(format!("Corrupt index manifest: {}", e)))
    }

    async fn connect(&self) -> Result<Connection> {
        std::fs::create_dir_all(&self.path)?;
        let uri = connection_uri(&self.path)?;
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Storage(format!("Failed to connect to LanceDB: {}", e)))
    }

    /// Replace whatever is in the slot with `index`.
    ///
    /// The manifest is removed before the table is touched and rewritten
    /// after, so a save interrupted midway reads back as no index at all.
    #[inline]
    pub async fn save(&self, index: &VectorIndex) -> Result<()> {
        debug!(
            "Saving index of {} chunks to {}",
            index.len(),
            self.path.display()
        );

        let connection = self.connect().await?;

        match std::fs::remove_file(self.manifest_path()) {
            Ok(()) => debug!("Removed previous manifest"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RagError::Io(e)),
        }

        drop_table_if_exists(&connection).await?;

        let schema = create_schema(index.dimension())?;
        let record_batch = create_record_batch(index, Arc::clone(&schema))?;

        let table = connection
            .create_empty_table(TABLE_NAME, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| RagError::Storage(format!("Failed to create table: {}", e)))?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Storage(format!("Failed to insert chunks: {}", e)))?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: index.embedding_model().to_string(),
            dimension: index.dimension(),
            chunk_count: index.len(),
            created_at: Utc::now(),
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| RagError::Storage(format!("Failed to serialize manifest: {}", e)))?;
        std::fs::write(self.manifest_path(), manifest_json)?;

        info!(
            "Saved index of {} chunks to {}",
            index.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read the saved index back, refusing it unless it was built with
    /// `embedding_model`
    #[inline]
    pub async fn load(&self, embedding_model: &str) -> Result<VectorIndex> {
        let manifest = self.manifest()?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(RagError::Storage(format!(
                "Unsupported index format version {}",
                manifest.format_version
            )));
        }

        if manifest.embedding_model != embedding_model {
            warn!(
                "Saved index was built with {}, refusing to query it with {}",
                manifest.embedding_model, embedding_model
            );
            return Err(RagError::EmbeddingMismatch {
                expected: manifest.embedding_model,
                found: embedding_model.to_string(),
            });
        }

        let connection = self.connect().await?;
        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Storage(format!("Failed to open table: {}", e)))?;

        let mut stream = table
            .query()
            .limit(manifest.chunk_count.max(1))
            .execute()
            .await
            .map_err(|e| RagError::Storage(format!("Failed to read table: {}", e)))?;

        let mut rows = Vec::with_capacity(manifest.chunk_count);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Storage(format!("Failed to read result stream: {}", e)))?
        {
            rows.extend(parse_batch(&batch)?);
        }

        if rows.len() != manifest.chunk_count {
            return Err(RagError::Storage(format!(
                "Manifest lists {} chunks, table holds {}",
                manifest.chunk_count,
                rows.len()
            )));
        }

        rows.sort_by_key(|(position, _)| *position);
        let entries: Vec<IndexedChunk> = rows.into_iter().map(|(_, entry)| entry).collect();

        let index = VectorIndex::from_entries(&manifest.embedding_model, entries)?;
        if index.dimension() != manifest.dimension {
            return Err(RagError::Storage(format!(
                "Manifest lists {} dimensions, table holds {}",
                manifest.dimension,
                index.dimension()
            )));
        }

        info!(
            "Loaded index of {} chunks from {}",
            index.len(),
            self.path.display()
        );
        Ok(index)
    }
}

async fn drop_table_if_exists(connection: &Connection) -> Result<()> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| RagError::Storage(format!("Failed to list tables: {}", e)))?;

    if table_names.iter().any(|name| name == TABLE_NAME) {
        debug!("Dropping previous chunks table");
        connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| RagError::Storage(format!("Failed to drop table: {}", e)))?;
    }

    Ok(())
}

/// Absolute location handed to LanceDB, so relative slots stay next to their manifest
fn connection_uri(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)?;
    absolute
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::Storage(format!("Index path {} is not valid UTF-8", absolute.display()))
        })
}

fn list_size(vector_dim: usize) -> Result<i32> {
    i32::try_from(vector_dim).map_err(|_| {
        RagError::Storage(format!("Vector dimension {} does not fit the table", vector_dim))
    })
}

fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
    let size = list_size(vector_dim)?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                size,
            ),
            false,
        ),
    ])))
}

fn create_record_batch(index: &VectorIndex, schema: Arc<Schema>) -> Result<RecordBatch> {
    let len = index.len();
    let vector_dim = index.dimension();

    let mut positions = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);

    for (position, entry) in index.entries().iter().enumerate() {
        positions.push(to_u32(position, "position")?);
        contents.push(entry.chunk.content.as_str());
        sources.push(entry.chunk.source.as_str());
        pages.push(entry.chunk.page);
        chunk_indices.push(to_u32(entry.chunk.chunk_index, "chunk_index")?);
        flat_values.extend_from_slice(&entry.vector);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        field,
        list_size(vector_dim)?,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Storage(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(UInt32Array::from(positions)),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(vector_array),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::Storage(format!("Failed to create record batch: {}", e)))
}

fn to_u32(value: usize, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RagError::Storage(format!("{} {} does not fit the table", column, value)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Storage(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Storage(format!("Invalid {} column type", name)))
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<(u32, IndexedChunk)>> {
    let positions = column::<UInt32Array>(batch, "position")?;
    let contents = column::<StringArray>(batch, "content")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = vectors.value(row);
        let vector = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RagError::Storage("Invalid vector value type".to_string()))?
            .values()
            .to_vec();

        let chunk = DocumentChunk {
            content: contents.value(row).to_string(),
            source: sources.value(row).to_string(),
            page: (!pages.is_null(row)).then(|| pages.value(row)),
            chunk_index: chunk_indices.value(row) as usize,
        };

        rows.push((positions.value(row), IndexedChunk { chunk, vector }));
    }

    debug!("Parsed {} rows", rows.len());
    Ok(rows)
}
