//! Qdrant backend: named `dense` (cosine) and `sparse` vectors per point,
//! queried with two prefetches fused server-side by `Fusion::Rrf`.

use std::str::FromStr;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, Fusion, NamedVectors, PointStruct,
    PrefetchQueryBuilder, Query, QueryPointsBuilder, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Value as QdrantValue, Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use sciqa_core::config::StoreSettings;
use sciqa_core::types::{Point, ScoredPoint, SparseVector};
use sciqa_core::{Error, Result};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{prefetch_width, VectorStore, DENSE_FIELD, SPARSE_FIELD};

pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn connect(settings: &StoreSettings) -> Result<Self> {
        let mut builder = Qdrant::from_url(&settings.url).timeout(settings.query_timeout());
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().map_err(|e| Error::store_query(&settings.collection, e))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(l)) => Value::Array(l.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(s)) => Value::Object(s.fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()),
    }
}

fn to_point_struct(p: &Point) -> PointStruct {
    let payload = match &p.payload {
        Value::Object(_) => Payload::try_from(p.payload.clone()).unwrap_or_default(),
        _ => Payload::new(),
    };
    let vectors = NamedVectors::default()
        .add_vector(DENSE_FIELD, Vector::new_dense(p.dense.clone()))
        .add_vector(SPARSE_FIELD, Vector::new_sparse(p.sparse.indices.clone(), p.sparse.values.clone()));
    PointStruct::new(p.id.to_string(), vectors, payload)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dense_dim: usize) -> Result<()> {
        let exists = self.client.collection_exists(name).await.map_err(|e| Error::store_query(name, e))?;
        if exists {
            debug!(collection = name, "qdrant collection already exists");
            return Ok(());
        }
        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(DENSE_FIELD, VectorParamsBuilder::new(dense_dim as u64, Distance::Cosine));
        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(SPARSE_FIELD, SparseVectorParamsBuilder::default());
        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(vectors).sparse_vectors_config(sparse))
            .await
            .map_err(|e| Error::StoreWrite { collection: name.to_string(), attempts: 1, message: e.to_string() })?;
        debug!(collection = name, dense_dim, "created qdrant collection");
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let structs: Vec<PointStruct> = points.iter().map(to_point_struct).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(name, structs).wait(true))
            .await
            .map_err(|e| Error::StoreWrite { collection: name.to_string(), attempts: 1, message: e.to_string() })?;
        debug!(collection = name, count = points.len(), "upserted points to qdrant");
        Ok(())
    }

    async fn fused_search(
        &self,
        name: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let width = prefetch_width(limit) as u64;
        let dense_prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(dense.to_vec()))
            .using(DENSE_FIELD)
            .limit(width);
        let sparse_prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(VectorInput::new_sparse(sparse.indices.clone(), sparse.values.clone())))
            .using(SPARSE_FIELD)
            .limit(width);
        let request = QueryPointsBuilder::new(name)
            .add_prefetch(dense_prefetch)
            .add_prefetch(sparse_prefetch)
            .query(Fusion::Rrf)
            .with_payload(true)
            .limit(limit as u64);
        let response = self.client.query(request).await.map_err(|e| Error::store_query(name, e))?;

        let mut out = Vec::with_capacity(response.result.len());
        for scored in response.result {
            let id = match scored.id.and_then(|pid| pid.point_id_options) {
                Some(PointIdOptions::Uuid(s)) => Uuid::from_str(&s).map_err(|e| Error::store_query(name, e))?,
                other => return Err(Error::store_query(name, format!("unexpected point id {other:?}"))),
            };
            let payload: Map<String, Value> = scored.payload.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
            out.push(ScoredPoint { id, score: scored.score, payload: Value::Object(payload) });
        }
        Ok(out)
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(|e| Error::store_query(name, e))?;
        Ok(response.result.map_or(0, |r| r.count as usize))
    }
}
