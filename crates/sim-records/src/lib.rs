//! In-memory registry of tracked entities, one store per category.
//!
//! The registry exists alongside the queue so that a manual update can
//! reach an in-flight entity. `consume_if_present` is the single
//! synchronization point between the automatic and the manual resolution
//! path: its atomic removal guarantees at most one automatic notification
//! per entity.

use dashmap::DashMap;
use tracing::{debug, error};

use sim_common::{Category, TrackedEntity};

pub struct RecordStore {
    category: Category,
    entities: DashMap<String, TrackedEntity>,
}

impl RecordStore {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entities: DashMap::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Registers an entity. Id uniqueness is the caller's responsibility.
    pub fn create(&self, entity: TrackedEntity) -> TrackedEntity {
        debug!(category = %self.category, id = %entity.id, "Tracking entity");
        self.entities.insert(entity.id.clone(), entity.clone());
        entity
    }

    pub fn find_by_id(&self, id: &str) -> Option<TrackedEntity> {
        self.entities.get(id).map(|entry| entry.value().clone())
    }

    pub fn find_all(&self) -> Vec<TrackedEntity> {
        self.entities
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Blocks the entity for automatic processing, leaving it in the store.
    pub fn mark_blocked(&self, id: &str) -> Option<TrackedEntity> {
        let mut entry = self.entities.get_mut(id)?;
        entry.blocked = true;
        Some(entry.value().clone())
    }

    /// Removes the entity unconditionally and reports whether it was
    /// blocked. An absent entity fails open: entities registered before a
    /// restart are gone from the store, and automatic processing must
    /// proceed rather than stall.
    pub fn consume_if_present(&self, id: &str) -> bool {
        match self.entities.remove(id) {
            Some((_, entity)) => entity.blocked,
            None => {
                error!(
                    category = %self.category,
                    id = %id,
                    "No tracked entity for id, treating as not blocked"
                );
                false
            }
        }
    }
}
