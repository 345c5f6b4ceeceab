use pkg_types::meta::Resource;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Last-applied snapshot of every watched object, keyed by `namespace/name`.
///
/// Only the informer's dispatcher mutates it; everybody else reads.
pub struct LocalCache<T> {
    items: RwLock<HashMap<String, T>>,
}

impl<T: Resource> LocalCache<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.items.read().await.get(key).cloned()
    }

    pub async fn list(&self) -> Vec<T> {
        self.items.read().await.values().cloned().collect()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.items.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Insert or replace; returns the previous snapshot.
    pub(crate) async fn upsert(&self, obj: T) -> Option<T> {
        self.items.write().await.insert(obj.key(), obj)
    }

    pub(crate) async fn delete(&self, key: &str) -> Option<T> {
        self.items.write().await.remove(key)
    }
}

impl<T: Resource> Default for LocalCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
