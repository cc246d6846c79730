//! Engines keyed by connection string.
//!
//! The registry is owned by whoever serves requests (the HTTP server or a
//! CLI command) and hands out one shared [`Engine`] per logical database.
//! An engine is built on first use: connect, analyze the schema, wire the
//! configured collaborators. Builds are serialized by one async mutex so two
//! concurrent first requests never analyze the same database twice.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;

pub struct EngineRegistry {
    config: Config,
    engines: Mutex<HashMap<String, Arc<Engine>>>,
}

impl EngineRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Return the engine for `connection`, building it if needed.
    pub async fn get_engine(&self, connection: &str) -> Result<Arc<Engine>> {
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(connection) {
            return Ok(Arc::clone(engine));
        }

        tracing::info!("building engine for {}", connection);
        let engine = Arc::new(Engine::connect(connection, &self.config).await?);
        engines.insert(connection.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Forget the engine for `connection`. Returns whether one existed.
    pub async fn drop_engine(&self, connection: &str) -> bool {
        self.engines.lock().await.remove(connection).is_some()
    }

    pub async fn clear(&self) {
        self.engines.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.engines.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
