use std::sync::Arc;

use statdoc_storage::{PgJobStore, db::Db};

#[derive(Clone)]
pub struct AppState {
	pub store: Arc<PgJobStore>,
}
impl AppState {
	pub async fn new(config: statdoc_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let store = PgJobStore::new(db, &config.queue);

		Ok(Self { store: Arc::new(store) })
	}
}
