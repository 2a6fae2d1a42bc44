//! LanceDB backend: one table per collection, `merge_insert` on `point_id`
//! for idempotent writes, ANN search on `dense`, sparse scoring by scan.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use arrow_array::types::{Float32Type, UInt32Type};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, ListArray, RecordBatch, RecordBatchIterator, StringArray, UInt32Array,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, DistanceType, Table};
use sciqa_core::types::{Point, ScoredPoint, SparseVector};
use sciqa_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::fusion::fuse_points;
use crate::schema::{build_points_schema, DENSE, PAYLOAD, POINT_ID, SPARSE_INDICES, SPARSE_VALUES};
use crate::{prefetch_width, VectorStore};

pub struct LanceStore {
    db: Connection,
    dims: RwLock<HashMap<String, usize>>,
}

fn write_err(collection: &str, e: impl std::fmt::Display) -> Error {
    Error::StoreWrite { collection: collection.to_string(), attempts: 1, message: e.to_string() }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str, collection: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::store_query(collection, format!("column '{name}' missing")))
}

fn list_col<'a>(batch: &'a RecordBatch, name: &str, collection: &str) -> Result<&'a ListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
        .ok_or_else(|| Error::store_query(collection, format!("column '{name}' missing")))
}

fn row_point(batch: &RecordBatch, i: usize, score: f32, collection: &str) -> Result<ScoredPoint> {
    let raw_id = string_col(batch, POINT_ID, collection)?.value(i);
    let id = Uuid::from_str(raw_id).map_err(|e| Error::store_query(collection, format!("bad point id {raw_id}: {e}")))?;
    let payload = serde_json::from_str(string_col(batch, PAYLOAD, collection)?.value(i))?;
    Ok(ScoredPoint { id, score, payload })
}

fn row_sparse(batch: &RecordBatch, i: usize, collection: &str) -> Result<SparseVector> {
    let indices = list_col(batch, SPARSE_INDICES, collection)?;
    let values = list_col(batch, SPARSE_VALUES, collection)?;
    if indices.is_null(i) || values.is_null(i) {
        return Ok(SparseVector::default());
    }
    let idx = indices.value(i);
    let val = values.value(i);
    let idx = idx
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| Error::store_query(collection, "sparse_indices is not u32"))?;
    let val = val
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| Error::store_query(collection, "sparse_values is not f32"))?;
    Ok(SparseVector { indices: idx.values().to_vec(), values: val.values().to_vec() })
}

fn points_to_record_batch(points: &[Point], dim: usize) -> std::result::Result<RecordBatch, arrow_schema::ArrowError> {
    let schema = build_points_schema(dim);
    let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
    let chunk_ids: Vec<String> = points
        .iter()
        .map(|p| p.payload.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string())
        .collect();
    let payloads: Vec<String> = points.iter().map(|p| p.payload.to_string()).collect();
    let dense = points.iter().map(|p| Some(p.dense.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let indices = points.iter().map(|p| Some(p.sparse.indices.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    let values = points.iter().map(|p| Some(p.sparse.values.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(dense, dim as i32)),
            Arc::new(ListArray::from_iter_primitive::<UInt32Type, _, _>(indices)),
            Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(values)),
            Arc::new(StringArray::from(payloads)),
        ],
    )
}

impl LanceStore {
    pub async fn open(uri: &str) -> Result<Self> {
        let db = connect(uri).execute().await.map_err(|e| Error::store_query(uri, e))?;
        info!(uri, "opened lancedb");
        Ok(Self { db, dims: RwLock::new(HashMap::new()) })
    }

    async fn table(&self, name: &str) -> Result<Option<Table>> {
        let names = self.db.table_names().execute().await.map_err(|e| Error::store_query(name, e))?;
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }
        let table = self.db.open_table(name).execute().await.map_err(|e| Error::store_query(name, e))?;
        Ok(Some(table))
    }

    async fn require_table(&self, name: &str) -> Result<Table> {
        self.table(name).await?.ok_or_else(|| Error::NotFound(format!("collection '{name}'")))
    }

    async fn dense_hits(&self, table: &Table, name: &str, query: &[f32], width: usize) -> Result<Vec<ScoredPoint>> {
        let mut stream = table
            .vector_search(query.to_vec())
            .map_err(|e| Error::store_query(name, e))?
            .column(DENSE)
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&[POINT_ID, PAYLOAD]))
            .limit(width)
            .execute()
            .await
            .map_err(|e| Error::store_query(name, e))?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| Error::store_query(name, e))? {
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            for i in 0..batch.num_rows() {
                let score = distances.map_or(0.0, |d| 1.0 - d.value(i));
                hits.push(row_point(&batch, i, score, name)?);
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(width);
        Ok(hits)
    }

    async fn sparse_hits(&self, table: &Table, name: &str, query: &SparseVector, width: usize) -> Result<Vec<ScoredPoint>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut stream = table
            .query()
            .select(Select::columns(&[POINT_ID, SPARSE_INDICES, SPARSE_VALUES, PAYLOAD]))
            .execute()
            .await
            .map_err(|e| Error::store_query(name, e))?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| Error::store_query(name, e))? {
            for i in 0..batch.num_rows() {
                let score = query.dot(&row_sparse(&batch, i, name)?);
                if score > 0.0 {
                    hits.push(row_point(&batch, i, score, name)?);
                }
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(width);
        Ok(hits)
    }

    async fn dim_of(&self, table: &Table, name: &str) -> Result<usize> {
        if let Some(dim) = self.dims.read().await.get(name) {
            return Ok(*dim);
        }
        let schema = table.schema().await.map_err(|e| Error::store_query(name, e))?;
        let dim = match schema.field_with_name(DENSE).map(|f| f.data_type().clone()) {
            Ok(arrow_schema::DataType::FixedSizeList(_, n)) => n as usize,
            _ => return Err(Error::store_query(name, "table has no fixed-size dense column")),
        };
        self.dims.write().await.insert(name.to_string(), dim);
        Ok(dim)
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn ensure_collection(&self, name: &str, dense_dim: usize) -> Result<()> {
        if self.table(name).await?.is_some() {
            debug!(collection = name, "lance table already exists");
            return Ok(());
        }
        let schema = build_points_schema(dense_dim);
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
        self.db
            .create_table(name, Box::new(iter))
            .execute()
            .await
            .map_err(|e| write_err(name, e))?;
        self.dims.write().await.insert(name.to_string(), dense_dim);
        info!(collection = name, dense_dim, "created lance table");
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let table = self.require_table(name).await?;
        let dim = self.dim_of(&table, name).await?;
        if let Some(bad) = points.iter().find(|p| p.dense.len() != dim) {
            return Err(Error::InvalidRecord(format!(
                "point {} has {} dims, collection '{name}' expects {dim}",
                bad.id,
                bad.dense.len()
            )));
        }
        let batch = points_to_record_batch(points, dim).map_err(|e| write_err(name, e))?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut mi = table.merge_insert(&[POINT_ID]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(|e| write_err(name, e))?;
        debug!(collection = name, count = points.len(), "merged points");
        Ok(())
    }

    async fn fused_search(
        &self,
        name: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let table = self.require_table(name).await?;
        if table.count_rows(None).await.map_err(|e| Error::store_query(name, e))? == 0 {
            return Ok(Vec::new());
        }
        let width = prefetch_width(limit);
        let dense_hits = self.dense_hits(&table, name, dense, width).await?;
        let sparse_hits = self.sparse_hits(&table, name, sparse, width).await?;
        debug!(collection = name, dense = dense_hits.len(), sparse = sparse_hits.len(), "fusing candidates");
        Ok(fuse_points(dense_hits, sparse_hits, limit))
    }

    async fn count(&self, name: &str) -> Result<usize> {
        match self.table(name).await? {
            Some(table) => table.count_rows(None).await.map_err(|e| Error::store_query(name, e)),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CHUNK_ID;
    use serde_json::json;

    #[test]
    fn record_batch_carries_chunk_id_and_payload() {
        let p = Point {
            id: Uuid::nil(),
            dense: vec![0.1, 0.2],
            sparse: SparseVector::from_pairs([(3, 0.5)]),
            payload: json!({"id": "PMC1:intro:00000000", "url": "https://u"}),
        };
        let batch = points_to_record_batch(&[p], 2).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(string_col(&batch, CHUNK_ID, "t").unwrap().value(0), "PMC1:intro:00000000");
        let sparse = row_sparse(&batch, 0, "t").unwrap();
        assert_eq!(sparse.indices, vec![3]);
        let back = row_point(&batch, 0, 1.0, "t").unwrap();
        assert_eq!(back.payload["url"], "https://u");
    }
}
