use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Arrow schema of a rubric collection: payload columns plus a fixed-size `vector`.
pub fn build_rubric_schema(dim: usize) -> anyhow::Result<Arc<Schema>> {
    let width = i32::try_from(dim).map_err(|_| anyhow::anyhow!("vector dim {dim} too large"))?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("point_id", DataType::UInt64, false),
        Field::new("rubric_id", DataType::Utf8, false),
        Field::new("path", DataType::Utf8, false),
        Field::new("translation", DataType::Utf8, false),
        Field::new("chapter", DataType::Utf8, false),
        Field::new("remedy_count", DataType::Int64, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), width), true),
    ])))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, width) => usize::try_from(*width).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_width_round_trips_through_schema() {
        let schema = build_rubric_schema(384).unwrap();
        assert_eq!(vector_dim(&schema), Some(384));
        assert_eq!(schema.fields().len(), 7);
    }
}
