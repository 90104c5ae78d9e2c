//! In-memory snapshot store for testing and examples.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, RwLock},
};

use crate::snapshot::{Snapshot, SnapshotStore};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SnapshotKey<Id> {
    aggregate_kind: String,
    owner_id: Id,
}

/// In-memory snapshot store keeping the highest-version snapshot per
/// aggregate.
///
/// Cloning is cheap and shares the underlying storage.
#[derive(Clone)]
pub struct Store<Id> {
    inner: Arc<RwLock<HashMap<SnapshotKey<Id>, Snapshot<Id>>>>,
}

impl<Id> Store<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<Id> Default for Store<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id> SnapshotStore<Id> for Store<Id>
where
    Id: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
{
    type Error = Infallible;

    fn save<'a>(
        &'a self,
        aggregate_kind: &'a str,
        snapshot: Snapshot<Id>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a {
        {
            let key = SnapshotKey {
                aggregate_kind: aggregate_kind.to_string(),
                owner_id: snapshot.owner_id.clone(),
            };
            let mut inner = self.inner.write().expect("snapshot store lock poisoned");
            // Keep only the highest version; a stale writer cannot regress
            // the stored snapshot.
            match inner.get(&key) {
                Some(existing) if existing.version >= snapshot.version => {
                    tracing::trace!(
                        stored = existing.version,
                        offered = snapshot.version,
                        "declining older snapshot"
                    );
                }
                _ => {
                    inner.insert(key, snapshot);
                }
            }
        }
        std::future::ready(Ok(()))
    }

    fn load_latest<'a>(
        &'a self,
        aggregate_kind: &'a str,
        owner_id: &'a Id,
    ) -> impl Future<Output = Result<Option<Snapshot<Id>>, Self::Error>> + Send + 'a {
        let key = SnapshotKey {
            aggregate_kind: aggregate_kind.to_string(),
            owner_id: owner_id.clone(),
        };
        let found = self
            .inner
            .read()
            .expect("snapshot store lock poisoned")
            .get(&key)
            .cloned();
        std::future::ready(Ok(found))
    }
}
