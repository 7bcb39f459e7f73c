use std::sync::Arc;

use hyrax_config::Config;
use hyrax_service::{Backends, HybridSearchService};
use hyrax_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<HybridSearchService>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(&config.storage.postgres.table).await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;
		let backends = Backends::from_config(&config, db, qdrant)?;

		Ok(Self::from_service(HybridSearchService::new(config, backends)))
	}

	pub fn from_service(service: HybridSearchService) -> Self {
		Self { service: Arc::new(service) }
	}
}
