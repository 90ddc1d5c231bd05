//! Live engine pages of the executor, keyed by page id.

use std::collections::BTreeMap;

use hive_types::{EntityId, HiveError};

#[derive(Debug)]
pub struct PageTable<P> {
    pages: BTreeMap<EntityId, P>,
}

impl<P> Default for PageTable<P> {
    fn default() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }
}

impl<P> PageTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page; an id that is already live is rejected.
    pub fn insert(&mut self, id: EntityId, page: P) -> Result<(), HiveError> {
        if self.pages.contains_key(&id) {
            return Err(HiveError::DuplicateEntity(id));
        }
        self.pages.insert(id, page);
        Ok(())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut P> {
        self.pages.get_mut(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<P> {
        self.pages.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.pages.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.pages.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Remove every page, in id order.
    pub fn drain(&mut self) -> impl Iterator<Item = (EntityId, P)> {
        std::mem::take(&mut self.pages).into_iter()
    }
}
