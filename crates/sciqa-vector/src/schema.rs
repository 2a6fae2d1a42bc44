use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const POINT_ID: &str = "point_id";
pub const CHUNK_ID: &str = "chunk_id";
pub const DENSE: &str = "dense";
pub const SPARSE_INDICES: &str = "sparse_indices";
pub const SPARSE_VALUES: &str = "sparse_values";
pub const PAYLOAD: &str = "payload";

pub fn build_points_schema(dense_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(POINT_ID, DataType::Utf8, false),
        Field::new(CHUNK_ID, DataType::Utf8, false),
        Field::new(
            DENSE,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dense_dim as i32),
            true,
        ),
        Field::new(SPARSE_INDICES, DataType::List(Arc::new(Field::new("item", DataType::UInt32, true))), true),
        Field::new(SPARSE_VALUES, DataType::List(Arc::new(Field::new("item", DataType::Float32, true))), true),
        Field::new(PAYLOAD, DataType::Utf8, false),
    ]))
}
