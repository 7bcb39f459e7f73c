use std::collections::BTreeMap;

use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};

use crate::{Error, Result, db::Db};

const MAX_QUERY_TERMS: usize = 16;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogItem {
	pub item_id: String,
	pub title: String,
	pub body: String,
	pub rating: f32,
	pub attributes: Value,
}

/// A catalog row that matched a query, with the row's rating as its raw score.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch {
	pub item_id: String,
	pub rating: f32,
	pub attributes: Map<String, Value>,
}

pub async fn filter_match(
	db: &Db,
	table: &str,
	query_text: &str,
	filters: &BTreeMap<String, String>,
	limit: u32,
) -> Result<Vec<CatalogMatch>> {
	let terms = query_terms(query_text);

	if terms.is_empty() {
		return Err(Error::InvalidArgument("query_text has no searchable terms.".to_string()));
	}

	let mut builder = build_filter_query(table, &terms, filters, limit);
	let rows: Vec<CatalogItem> = builder.build_query_as().fetch_all(&db.pool).await?;

	Ok(rows.into_iter().map(CatalogMatch::from).collect())
}

pub async fn upsert_item(db: &Db, table: &str, item: &CatalogItem) -> Result<()> {
	let sql = format!(
		"\
INSERT INTO {table} (item_id, title, body, rating, attributes, updated_at)
VALUES ($1, $2, $3, $4, $5, now())
ON CONFLICT (item_id) DO UPDATE
SET
	title = EXCLUDED.title,
	body = EXCLUDED.body,
	rating = EXCLUDED.rating,
	attributes = EXCLUDED.attributes,
	updated_at = now()"
	);

	sqlx::query(&sql)
		.bind(item.item_id.as_str())
		.bind(item.title.as_str())
		.bind(item.body.as_str())
		.bind(item.rating)
		.bind(&item.attributes)
		.execute(&db.pool)
		.await?;

	Ok(())
}

fn build_filter_query<'a>(
	table: &str,
	terms: &[String],
	filters: &'a BTreeMap<String, String>,
	limit: u32,
) -> QueryBuilder<'a, Postgres> {
	let mut builder = QueryBuilder::<Postgres>::new(format!(
		"SELECT item_id, title, body, rating, attributes FROM {table} WHERE ("
	));

	for (idx, term) in terms.iter().enumerate() {
		if idx > 0 {
			builder.push(" OR ");
		}

		let pattern = format!("%{}%", escape_like(term));

		builder.push("title ILIKE ").push_bind(pattern.clone());
		builder.push(" OR body ILIKE ").push_bind(pattern);
	}

	builder.push(")");

	for (key, value) in filters {
		builder.push(" AND attributes ->> ").push_bind(key.as_str());
		builder.push(" = ").push_bind(value.as_str());
	}

	builder.push(" ORDER BY rating DESC, item_id ASC LIMIT ").push_bind(i64::from(limit));

	builder
}

fn query_terms(query_text: &str) -> Vec<String> {
	let mut terms: Vec<String> = Vec::new();

	for term in query_text.split_whitespace() {
		let term = term.to_lowercase();

		if !terms.contains(&term) {
			terms.push(term);
		}
		if terms.len() == MAX_QUERY_TERMS {
			break;
		}
	}

	terms
}

fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '\\' | '%' | '_') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

impl From<CatalogItem> for CatalogMatch {
	fn from(row: CatalogItem) -> Self {
		let mut attributes = match row.attributes {
			Value::Object(map) => map,
			Value::Null => Map::new(),
			other => {
				let mut map = Map::new();

				map.insert("value".to_string(), other);

				map
			},
		};

		attributes.insert("title".to_string(), Value::String(row.title));

		Self { item_id: row.item_id, rating: row.rating, attributes }
	}
}
