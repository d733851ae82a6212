//! Registry of remote app instances keyed by store id
//!
//! Backed by a sharded concurrent map so reconciliation, connectivity events
//! and API calls can read and mutate it without a global lock. Callers that
//! need to `.await` per instance work on a [`RemoteAppRegistry::snapshot`],
//! never on live map guards.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use crate::remote::RemoteAppInstance;
use crate::store::RemoteAppId;

#[derive(Default)]
pub struct RemoteAppRegistry {
    instances: DashMap<RemoteAppId, Arc<RemoteAppInstance>>,
}

impl RemoteAppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its id, returning any instance it replaced
    pub fn insert(&self, instance: Arc<RemoteAppInstance>) -> Option<Arc<RemoteAppInstance>> {
        trace!("Registering remote app instance {}", instance.id());
        self.instances.insert(instance.id(), instance)
    }

    pub fn get(&self, id: RemoteAppId) -> Option<Arc<RemoteAppInstance>> {
        self.instances.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: RemoteAppId) -> Option<Arc<RemoteAppInstance>> {
        trace!("Removing remote app instance {}", id);
        self.instances.remove(&id).map(|(_, instance)| instance)
    }

    pub fn contains(&self, id: RemoteAppId) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn find_by_local_socket(&self, local_socket: &str) -> Option<Arc<RemoteAppInstance>> {
        self.instances
            .iter()
            .find(|entry| entry.value().config().local_socket == local_socket)
            .map(|entry| entry.value().clone())
    }

    /// All instances at the time of the call, ordered by id
    pub fn snapshot(&self) -> Vec<Arc<RemoteAppInstance>> {
        let mut instances: Vec<_> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        instances.sort_by_key(|instance| instance.id());
        instances
    }

    /// Instances bound to `site_name`, ordered by id
    pub fn for_site(&self, site_name: &str) -> Vec<Arc<RemoteAppInstance>> {
        self.snapshot()
            .into_iter()
            .filter(|instance| instance.config().site_name == site_name)
            .collect()
    }

    pub fn ids(&self) -> Vec<RemoteAppId> {
        self.snapshot().iter().map(|instance| instance.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn instance(id: RemoteAppId, site: &str, local_socket: &str) -> Arc<RemoteAppInstance> {
        Arc::new(RemoteAppInstance::new(
            id,
            AppConfig::new(site, "web", local_socket, "10.0.0.5:80"),
        ))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = RemoteAppRegistry::new();
        assert!(registry.insert(instance(1, "s1", "127.0.0.1:9000")).is_none());

        assert!(registry.contains(1));
        assert_eq!(registry.get(1).unwrap().id(), 1);
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let registry = RemoteAppRegistry::new();
        registry.insert(instance(3, "s1", "127.0.0.1:9003"));
        registry.insert(instance(1, "s1", "127.0.0.1:9001"));
        registry.insert(instance(2, "s2", "127.0.0.1:9002"));

        let snapshot = registry.snapshot();
        registry.remove(2);

        let ids: Vec<_> = snapshot.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(registry.ids(), vec![1, 3]);
    }

    #[test]
    fn test_for_site_and_local_socket_lookup() {
        let registry = RemoteAppRegistry::new();
        registry.insert(instance(1, "s1", "127.0.0.1:9001"));
        registry.insert(instance(2, "s2", "127.0.0.1:9002"));
        registry.insert(instance(3, "s1", "127.0.0.1:9003"));

        let s1: Vec<_> = registry.for_site("s1").iter().map(|i| i.id()).collect();
        assert_eq!(s1, vec![1, 3]);
        assert!(registry.for_site("s9").is_empty());

        assert_eq!(registry.find_by_local_socket("127.0.0.1:9002").unwrap().id(), 2);
        assert!(registry.find_by_local_socket("127.0.0.1:1").is_none());
    }
}
