//! Service layer for Castboard
//!
//! `CastboardService` wires the shared resources together:
//!
//! - `Publisher`: the publishing cycle (due selection, delivery, audit)
//! - `QueueService`: authoring operations on queued posts
//! - `EventBus`: cycle progress and cache invalidation events
//!
//! ```no_run
//! use libcastboard::service::{publisher::CycleContext, CastboardService};
//!
//! # async fn example() -> libcastboard::Result<()> {
//! let service = CastboardService::new().await?;
//! let report = service.publisher().run_cycle(&CycleContext::new("manual")).await?;
//! println!("{} published, {} failed", report.published(), report.failed());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod publisher;
pub mod queue;

use std::sync::Arc;

use self::events::EventBus;
use self::publisher::{Publisher, PublisherSettings};
use self::queue::QueueService;
use crate::config::{resolve_db_path, Config};
use crate::db::Database;
use crate::error::{CastboardError, ConfigError, Result};
use crate::platforms::{create_adapters, Adapters};
use crate::types::Target;

pub struct CastboardService {
    db: Arc<Database>,
    config: Arc<Config>,
    publisher: Publisher,
    queue: QueueService,
    event_bus: EventBus,
}

impl CastboardService {
    /// Create a service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Open the configured database, seed the registry and build the
    /// simulated adapters for every configured target kind
    pub async fn from_config(config: Config) -> Result<Self> {
        let adapters = create_adapters(&config);
        Self::with_adapters(config, adapters).await
    }

    /// Like [`from_config`](Self::from_config) with a caller-provided adapter set
    pub async fn with_adapters(config: Config, adapters: Adapters) -> Result<Self> {
        let db_path = resolve_db_path(Some(&config.database.path))?;
        let db_path_str = db_path.to_str().ok_or_else(|| {
            CastboardError::Config(ConfigError::InvalidValue {
                field: "database.path".to_string(),
                reason: "path is not valid UTF-8".to_string(),
            })
        })?;
        let db = Database::new(db_path_str).await?;

        Self::from_parts(Arc::new(db), config, adapters).await
    }

    /// Build the service on an already opened database
    pub async fn from_parts(db: Arc<Database>, config: Config, adapters: Adapters) -> Result<Self> {
        let targets: Vec<Target> = config.targets.iter().map(Target::from).collect();
        db.seed_targets(&targets).await?;

        let event_bus = EventBus::default();
        let publisher = Publisher::new(
            db.clone(),
            db.clone(),
            db.clone(),
            adapters,
            event_bus.clone(),
            PublisherSettings::from(&config.scheduling),
        );
        let queue = QueueService::new(db.clone());

        Ok(Self {
            db,
            config: Arc::new(config),
            publisher,
            queue,
            event_bus,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn queue(&self) -> &QueueService {
        &self.queue
    }

    /// Subscribe to cycle and invalidation events
    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::events::Event;
    use crate::service::publisher::CycleContext;
    use crate::store::ContentStore;
    use crate::types::Post;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn test_from_config_seeds_targets() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default_config();
        config.database.path = temp_dir.path().join("castboard.db").to_str().unwrap().to_string();

        let service = CastboardService::from_config(config).await.unwrap();

        let targets = service.database().list_targets().await.unwrap();
        let ids: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["instagram", "linkedin", "twitter"]);
        assert_eq!(service.config().scheduling.workers, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_with_simulated_adapters() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let config = Config::default_config();
        let adapters = create_adapters(&config);
        let service = CastboardService::from_parts(db.clone(), config, adapters)
            .await
            .unwrap();
        db.set_target_enabled("alice", "twitter", true).await.unwrap();

        let post = Post::new("alice", "Hello", "Short and sweet", 100, &["twitter".to_string()]);
        db.create_post(&post).await.unwrap();

        let mut events = service.subscribe();
        let report = service
            .publisher()
            .run_cycle(&CycleContext::at("test", 200))
            .await
            .unwrap();

        assert_eq!(report.published(), 1);
        let stored = db.get(&post.id).await.unwrap().unwrap();
        assert!(stored.targets[0]
            .external_ref
            .as_deref()
            .unwrap()
            .starts_with("twitter_"));
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::CycleStarted { due: 1, .. }
        ));
    }
}
