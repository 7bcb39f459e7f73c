use std::collections::HashMap;

use qdrant_client::qdrant::{
	PointId, Query, QueryPointsBuilder, ScoredPoint, Value as QdrantValue, point_id::PointIdOptions,
	value::Kind,
};
use serde_json::{Map, Number, Value};

use crate::Result;

pub const ITEM_ID_PAYLOAD_KEY: &str = "item_id";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &hyrax_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn nearest(&self, vector: Vec<f32>, limit: u32) -> Result<Vec<VectorMatch>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.with_payload(true)
			.limit(u64::from(limit));
		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().filter_map(VectorMatch::from_point).collect())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
	pub item_id: String,
	pub score: f32,
	pub attributes: Map<String, Value>,
}
impl VectorMatch {
	fn from_point(point: ScoredPoint) -> Option<Self> {
		let ScoredPoint { id, payload, score, .. } = point;
		let mut attributes = payload_to_json(payload);
		let item_id = match attributes.remove(ITEM_ID_PAYLOAD_KEY) {
			Some(Value::String(item_id)) if !item_id.trim().is_empty() => item_id,
			_ => match id.as_ref().and_then(point_id_to_string) {
				Some(item_id) => item_id,
				None => {
					tracing::warn!("Vector match missing item_id.");

					return None;
				},
			},
		};

		Some(Self { item_id, score, attributes })
	}
}

pub fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		None => None,
	}
}

pub fn payload_to_json(payload: HashMap<String, QdrantValue>) -> Map<String, Value> {
	payload.into_iter().map(|(key, value)| (key, qdrant_value_to_json(value))).collect()
}

fn qdrant_value_to_json(value: QdrantValue) -> Value {
	match value.kind {
		None | Some(Kind::NullValue(_)) => Value::Null,
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::IntegerValue(number)) => Value::from(number),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null),
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::ListValue(list)) =>
			Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect()),
		Some(Kind::StructValue(object)) => Value::Object(payload_to_json(object.fields)),
	}
}
