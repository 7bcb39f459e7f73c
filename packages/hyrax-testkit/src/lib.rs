//! Disposable Postgres databases and Qdrant collections for tests that need real backends.
//!
//! Every helper reads its connection string from the environment so the suites stay `#[ignore]`d
//! by default: `HYRAX_PG_DSN` for Postgres and `HYRAX_QDRANT_URL` for Qdrant.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread, time::Duration};

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder, VectorParamsBuilder,
	},
};
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];

pub fn env_dsn() -> Option<String> {
	env::var("HYRAX_PG_DSN").ok().filter(|value| !value.trim().is_empty())
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("HYRAX_QDRANT_URL").ok().filter(|value| !value.trim().is_empty())
}

/// A uniquely named database created from `HYRAX_PG_DSN`, dropped on cleanup or drop.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse HYRAX_PG_DSN: {err}.")))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("hyrax_test_{}", Uuid::new_v4().simple());

		admin_conn
			.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create test database: {err}.")))?;

		let dsn = base_options.clone().database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, cleaned: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.name, &self.admin_options).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let admin_options = self.admin_options.clone();
		// Drop can run inside a runtime, so cleanup gets its own thread and runtime.
		let handle = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test database cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(drop_database(&name, &admin_options)) {
				eprintln!("Test database cleanup failed: {err}.");
			}
		});

		let _ = handle.join();
	}
}

/// A uniquely named Qdrant collection using cosine distance.
pub struct TestCollection {
	client: Qdrant,
	name: String,
}
impl TestCollection {
	pub async fn new(qdrant_url: &str, prefix: &str, vector_dim: u64) -> Result<Self> {
		let client = Qdrant::from_url(qdrant_url).build()?;
		let name = format!("{prefix}_{}", Uuid::new_v4().simple());

		client
			.create_collection(
				CreateCollectionBuilder::new(name.clone())
					.vectors_config(VectorParamsBuilder::new(vector_dim, Distance::Cosine)),
			)
			.await?;

		Ok(Self { client, name })
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Inserts one point per `(point_id, vector, payload)` and waits for indexing.
	pub async fn seed(&self, points: Vec<(u64, Vec<f32>, serde_json::Value)>) -> Result<()> {
		let mut structs = Vec::with_capacity(points.len());

		for (id, vector, payload) in points {
			let payload = Payload::try_from(payload)
				.map_err(|err| Error::Message(format!("Invalid point payload: {err}.")))?;

			structs.push(PointStruct::new(id, vector, payload));
		}

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.name.clone(), structs).wait(true))
			.await?;

		Ok(())
	}

	pub async fn cleanup(self) -> Result<()> {
		time::timeout(Duration::from_secs(10), self.client.delete_collection(self.name.clone()))
			.await
			.map_err(|_| Error::Message("Qdrant delete_collection timed out.".to_string()))??;

		Ok(())
	}
}

async fn connect_admin(
	base_options: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => last_err = Some(err),
		}
	}

	Err(Error::Message(format!("Failed to connect to an admin database: {last_err:?}.")))
}

async fn drop_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options).await.map_err(|err| {
		Error::Message(format!("Failed to connect to admin database for cleanup: {err}."))
	})?;
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	sqlx::query(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.execute(&mut conn)
		.await
		.map_err(|err| Error::Message(format!("Failed to drop test database: {err}.")))?;

	Ok(())
}
