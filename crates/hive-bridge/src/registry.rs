//! Live pages of one controller-side session.

use std::collections::BTreeMap;
use std::sync::Mutex;

use hive_types::{EntityId, HiveError};

use crate::page::Page;

/// Map of page id to [`Page`] handle.
///
/// Ids are unique among live pages; inserting a live id again is an error.
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: Mutex<BTreeMap<EntityId, Page>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, page: Page) -> Result<(), HiveError> {
        let mut pages = self.lock();
        if pages.contains_key(&page.id()) {
            return Err(HiveError::DuplicateEntity(page.id()));
        }
        pages.insert(page.id(), page);
        Ok(())
    }

    pub fn get(&self, id: EntityId) -> Option<Page> {
        self.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: EntityId) -> Option<Page> {
        self.lock().remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Snapshot of every live page, ordered by id.
    pub fn list(&self) -> Vec<Page> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every page.
    pub fn drain(&self) -> Vec<Page> {
        std::mem::take(&mut *self.lock()).into_values().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<EntityId, Page>> {
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }
}
