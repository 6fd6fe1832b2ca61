//! Hub server configuration

use std::path::PathBuf;
use std::sync::Arc;

use crate::book_records::BookRecordStore;
use crate::business::BusinessStore;
use crate::chat::delivery::DeliveryHub;
use crate::chat::store::MessageStore;
use crate::core::auth::{AuthManager, UserDirectory};
use crate::guides::GuideStore;
use tracing::{info, warn};

/// Configuration for the MSME Hub server
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Data root
    pub root: PathBuf,
    /// Conversation documents directory
    pub conversations_dir: PathBuf,
    /// Users and sessions database, also holding businesses, book records
    /// and guides
    pub users_db: PathBuf,
    /// GST guides imported at startup
    pub guides_seed: PathBuf,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origin (the web client)
    pub client_url: String,
    /// Per-room buffer of the live delivery channel
    pub channel_capacity: usize,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Session lifetime in days
    pub session_ttl_days: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for HubConfig {
    fn default() -> Self {
        let root = hub_common::hub_root();
        Self {
            conversations_dir: hub_common::conversations_dir(&root),
            users_db: hub_common::users_db_path(&root),
            guides_seed: hub_common::guides_seed_path(&root),
            root,
            port: env_or("PORT", 5050),
            client_url: std::env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            channel_capacity: env_or("CHAT_CHANNEL_CAPACITY", 100),
            bcrypt_cost: env_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            session_ttl_days: 30,
        }
    }
}

impl HubConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let root = base_dir.into();
        Self {
            conversations_dir: hub_common::conversations_dir(&root),
            users_db: hub_common::users_db_path(&root),
            guides_seed: hub_common::guides_seed_path(&root),
            root,
            ..Self::default()
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.conversations_dir).await?;
        if let Some(parent) = self.users_db.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: HubConfig,
    pub auth: Arc<AuthManager>,
    pub users: Arc<dyn UserDirectory>,
    pub store: Arc<MessageStore>,
    pub delivery: Arc<DeliveryHub>,
    pub businesses: Arc<BusinessStore>,
    pub records: Arc<BookRecordStore>,
    pub guides: Arc<GuideStore>,
}

impl AppState {
    /// Open every backing store described by `config`
    pub async fn build(config: HubConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;

        let auth = Arc::new(
            AuthManager::new(&config.users_db, config.bcrypt_cost, config.session_ttl_days).await?,
        );
        let delivery = Arc::new(DeliveryHub::new(config.channel_capacity));
        let store =
            Arc::new(MessageStore::open(&config.conversations_dir, delivery.clone()).await?);

        let businesses = Arc::new(BusinessStore::new(auth.pool()).await?);
        let records = Arc::new(BookRecordStore::new(auth.pool()).await?);
        let guides = Arc::new(GuideStore::new(auth.pool()).await?);
        match guides.import_seed(&config.guides_seed).await {
            Ok(0) => {}
            Ok(n) => info!("Imported {} GST guides from {:?}", n, config.guides_seed),
            Err(e) => warn!("Skipping guide seed {:?}: {}", config.guides_seed, e),
        }

        Ok(Self {
            config,
            users: auth.clone(),
            auth,
            store,
            delivery,
            businesses,
            records,
            guides,
        })
    }
}
