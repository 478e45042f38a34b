//! In-memory entity registry
//!
//! A minimal [`EntityHost`] for embedding the synchronizer without a
//! surrounding container. Each registration gets a fresh opaque id, so an
//! entity that is deregistered and registered again never reuses its old id.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnsrec_core::registry::EntityRegistry;
//!
//! let registry = Arc::new(EntityRegistry::new());
//! let service = SyncService::start(provider, registry.clone(), config).await?;
//!
//! assert_eq!(registry.len(), config.record_count());
//! ```

use crate::error::{Error, Result};
use crate::traits::EntityHost;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// A registered entity as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredEntity {
    /// Identifier assigned by the registering component
    pub local_id: String,
    /// Entity type name
    pub entity_type: String,
    /// Display name at registration time
    pub name: String,
}

/// Entity registry backed by a map
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<HashMap<String, RegisteredEntity>>,
    next_id: AtomicU64,
}

impl EntityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a registered entity by host id
    pub fn get(&self, host_id: &str) -> Option<RegisteredEntity> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        entities.get(host_id).cloned()
    }

    /// List all host ids currently registered
    pub fn list(&self) -> Vec<String> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        entities.keys().cloned().collect()
    }

    /// Check if a host id is registered
    pub fn contains(&self, host_id: &str) -> bool {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        entities.contains_key(host_id)
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityHost for EntityRegistry {
    fn register_entity(&self, local_id: &str, entity_type: &str, name: &str) -> Result<String> {
        if local_id.is_empty() {
            return Err(Error::Other("Cannot register an entity without an id".to_string()));
        }

        let host_id = format!("entity-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        entities.insert(
            host_id.clone(),
            RegisteredEntity {
                local_id: local_id.to_string(),
                entity_type: entity_type.to_string(),
                name: name.to_string(),
            },
        );

        Ok(host_id)
    }

    fn deregister_entity(&self, host_id: &str) -> Result<()> {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        entities
            .remove(host_id)
            .map(|_| ())
            .ok_or_else(|| Error::Other(format!("Entity {} is not registered", host_id)))
    }
}
