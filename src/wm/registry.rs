//! Tracked window state

use std::collections::HashMap;

use crate::compositor::window::WindowEntity;
use crate::server::WindowId;

/// Every window the compositor currently tracks, keyed by server id.
///
/// At most one entity exists per id.
#[derive(Debug)]
pub struct Registry<T> {
    windows: HashMap<WindowId, WindowEntity<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    /// Track a window. Hands the entity back if the id is already tracked.
    pub fn insert(&mut self, entity: WindowEntity<T>) -> Result<(), WindowEntity<T>> {
        if self.windows.contains_key(&entity.id) {
            return Err(entity);
        }
        self.windows.insert(entity.id, entity);
        Ok(())
    }

    /// Stop tracking a window
    pub fn remove(&mut self, id: WindowId) -> Option<WindowEntity<T>> {
        self.windows.remove(&id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn get(&self, id: WindowId) -> Option<&WindowEntity<T>> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut WindowEntity<T>> {
        self.windows.get_mut(&id)
    }

    /// Consumer content of a tracked window
    pub fn content(&self, id: WindowId) -> Option<&T> {
        self.windows.get(&id).map(WindowEntity::content)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeServer, viewable};

    fn entity(server: &FakeServer, id: WindowId, content: u64) -> WindowEntity<u64> {
        server.add_window(id, viewable(0, 0, 10, 10));
        WindowEntity::construct(server, id, viewable(0, 0, 10, 10))
            .unwrap()
            .attach(content)
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let server = FakeServer::new();
        let mut registry = Registry::new();

        assert!(registry.insert(entity(&server, 0x0120_0001, 1)).is_ok());
        let duplicate = registry.insert(entity(&server, 0x0120_0001, 2)).unwrap_err();
        assert_eq!(*duplicate.content(), 2);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.content(0x0120_0001), Some(&1));
    }

    #[test]
    fn test_remove_forgets_window() {
        let server = FakeServer::new();
        let mut registry = Registry::new();
        registry.insert(entity(&server, 0x0120_0001, 1)).unwrap();

        let removed = registry.remove(0x0120_0001).unwrap();
        assert_eq!(removed.id, 0x0120_0001);
        assert!(!registry.contains(0x0120_0001));
        assert!(registry.remove(0x0120_0001).is_none());
        assert!(registry.is_empty());
    }
}
