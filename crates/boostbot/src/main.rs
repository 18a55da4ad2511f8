use std::sync::Arc;

use boostbot_core::{config::Config, storage::JsonStore};
use boostbot_postgres::PgStore;
use boostbot_telegram::router::{self, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    boostbot_core::logging::init("boostbot")?;

    let cfg = Arc::new(Config::load()?);

    let stores = match &cfg.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url, cfg.database_max_connections).await?);
            store.migrate().await?;
            tracing::info!("using postgres store");
            Stores {
                channels: store.clone(),
                boosted: store.clone(),
                activity: store,
            }
        }
        None => {
            let store = Arc::new(JsonStore::open(&cfg.store_path).await?);
            tracing::info!(path = %cfg.store_path.display(), "using json store");
            Stores {
                channels: store.clone(),
                boosted: store.clone(),
                activity: store,
            }
        }
    };

    router::run_polling(cfg, stores).await
}
