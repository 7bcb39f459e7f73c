use std::collections::BTreeMap;

use serde_json::Value;

use hyrax_config::{Postgres, Qdrant};
use hyrax_storage::{
	catalog::{self, CatalogItem},
	db::Db,
	qdrant::QdrantStore,
};
use hyrax_testkit::{TestCollection, TestDatabase};

const TABLE: &str = "catalog_items";

fn item(item_id: &str, title: &str, rating: f32, attributes: Value) -> CatalogItem {
	CatalogItem {
		item_id: item_id.to_string(),
		title: title.to_string(),
		body: String::new(),
		rating,
		attributes,
	}
}

async fn seeded_db() -> Option<(TestDatabase, Db)> {
	let Some(base_dsn) = hyrax_testkit::env_dsn() else {
		eprintln!("Skipping catalog tests; set HYRAX_PG_DSN to run this test.");

		return None;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg =
		Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2, table: TABLE.to_string() };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(TABLE).await.expect("Failed to ensure schema.");
	// Idempotent bootstrap.
	db.ensure_schema(TABLE).await.expect("Failed to re-run schema.");

	for row in [
		item("B", "Dune sci-fi classic", 4.5, serde_json::json!({ "genre": "space" })),
		item("C", "Cheap sci-fi movies", 2.0, serde_json::json!({ "genre": "b-movie" })),
		item("D", "Garden almanac", 5.0, serde_json::json!({ "genre": "space" })),
	] {
		catalog::upsert_item(&db, TABLE, &row).await.expect("Failed to upsert item.");
	}

	Some((test_db, db))
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set HYRAX_PG_DSN to run."]
async fn filter_match_orders_by_rating() {
	let Some((test_db, db)) = seeded_db().await else {
		return;
	};
	let matches = catalog::filter_match(&db, TABLE, "sci-fi movies", &BTreeMap::new(), 10)
		.await
		.expect("Failed to query catalog.");
	let ids: Vec<&str> = matches.iter().map(|matched| matched.item_id.as_str()).collect();

	assert_eq!(ids, vec!["B", "C"]);
	assert_eq!(matches[0].rating, 4.5);

	drop(db);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set HYRAX_PG_DSN to run."]
async fn filter_match_applies_attribute_filters() {
	let Some((test_db, db)) = seeded_db().await else {
		return;
	};
	let mut filters = BTreeMap::new();

	filters.insert("genre".to_string(), "space".to_string());

	let matches = catalog::filter_match(&db, TABLE, "SCI-FI", &filters, 10)
		.await
		.expect("Failed to query catalog.");

	assert_eq!(matches.len(), 1);
	assert_eq!(matches[0].item_id, "B");
	assert_eq!(matches[0].attributes.get("genre"), Some(&Value::from("space")));

	drop(db);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set HYRAX_QDRANT_URL to run."]
async fn qdrant_nearest_returns_payload_item_ids() {
	let Some(qdrant_url) = hyrax_testkit::env_qdrant_url() else {
		eprintln!("Skipping Qdrant test; set HYRAX_QDRANT_URL to run this test.");

		return;
	};
	let collection = TestCollection::new(&qdrant_url, "hyrax_vectors", 3)
		.await
		.expect("Failed to create collection.");

	collection
		.seed(vec![
			(1, vec![1.0, 0.0, 0.0], serde_json::json!({ "item_id": "A", "title": "Alien" })),
			(2, vec![0.0, 1.0, 0.0], serde_json::json!({ "item_id": "B", "title": "Dune" })),
		])
		.await
		.expect("Failed to seed collection.");

	let store = QdrantStore::new(&Qdrant {
		url: qdrant_url,
		collection: collection.name().to_string(),
		vector_dim: 3,
	})
	.expect("Failed to build Qdrant store.");
	let matches = store.nearest(vec![0.9, 0.1, 0.0], 2).await.expect("Failed to query Qdrant.");

	assert_eq!(matches[0].item_id, "A");
	assert_eq!(matches[0].attributes.get("title"), Some(&Value::from("Alien")));
	assert!(matches[0].score > matches[1].score);

	collection.cleanup().await.expect("Failed to cleanup collection.");
}
