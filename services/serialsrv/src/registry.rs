//! Engine registry
//!
//! Process-wide set of open engines keyed by an opaque string, owned by the
//! application that hosts them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::SerialEngine;

#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, Arc<SerialEngine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine; returns the one it replaced
    pub fn insert(&self, key: impl Into<String>, engine: SerialEngine) -> Option<Arc<SerialEngine>> {
        let key = key.into();
        debug!("Registering engine '{}'", key);
        self.engines.lock().insert(key, Arc::new(engine))
    }

    pub fn get(&self, key: &str) -> Option<Arc<SerialEngine>> {
        self.engines.lock().get(key).cloned()
    }

    /// The engine for `key`, created with `create` if absent
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        create: impl FnOnce() -> Result<SerialEngine, E>,
    ) -> Result<Arc<SerialEngine>, E> {
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(key) {
            return Ok(engine.clone());
        }
        let engine = Arc::new(create()?);
        engines.insert(key.to_string(), engine.clone());
        Ok(engine)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<SerialEngine>> {
        self.engines.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }

    /// Remove and close one engine; false if the key is unknown
    pub async fn close(&self, key: &str) -> bool {
        match self.remove(key) {
            Some(engine) => {
                engine.close().await;
                info!("Closed engine '{}'", key);
                true
            },
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let engines: Vec<_> = self.engines.lock().drain().collect();
        for (key, engine) in engines {
            engine.close().await;
            info!("Closed engine '{}'", key);
        }
    }
}
