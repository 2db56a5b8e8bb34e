use async_trait::async_trait;
use socialink_core::store::ExtraData;
use socialink_core::{LinkRecord, LinkStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A user kept by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryUser {
    /// Sequential id, starting at 1.
    pub id: u64,
    /// Login name.
    pub username: String,
}

#[derive(Default)]
struct Inner {
    next_user_id: u64,
    users: Vec<MemoryUser>,
    links: HashMap<(String, String), LinkRecord<MemoryUser>>,
}

/// In-memory store, suitable for tests and single-process deployments.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All users, in creation order.
    pub fn users(&self) -> Result<Vec<MemoryUser>, StoreError> {
        Ok(self.lock()?.users.clone())
    }

    /// All links.
    pub fn links(&self) -> Result<Vec<LinkRecord<MemoryUser>>, StoreError> {
        Ok(self.lock()?.links.values().cloned().collect())
    }

    /// Links owned by `user`.
    pub fn links_for(&self, user: &MemoryUser) -> Result<Vec<LinkRecord<MemoryUser>>, StoreError> {
        Ok(self
            .lock()?
            .links
            .values()
            .filter(|link| &link.user == user)
            .cloned()
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

fn key(provider: &str, external_id: &str) -> (String, String) {
    (provider.to_string(), external_id.to_string())
}

#[async_trait]
impl LinkStore for MemoryStore {
    type User = MemoryUser;

    async fn find_link(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<LinkRecord<MemoryUser>>, StoreError> {
        Ok(self.lock()?.links.get(&key(provider, external_id)).cloned())
    }

    async fn create_link(
        &self,
        provider: &str,
        external_id: &str,
        user: &MemoryUser,
    ) -> Result<LinkRecord<MemoryUser>, StoreError> {
        let mut inner = self.lock()?;
        let key = key(provider, external_id);
        if inner.links.contains_key(&key) {
            return Err(StoreError::Duplicate);
        }
        let link = LinkRecord::new(provider, external_id, user.clone());
        inner.links.insert(key, link.clone());
        Ok(link)
    }

    async fn rebind_link(
        &self,
        link: &LinkRecord<MemoryUser>,
        new_user: &MemoryUser,
    ) -> Result<LinkRecord<MemoryUser>, StoreError> {
        let mut inner = self.lock()?;
        let stored = inner
            .links
            .get_mut(&key(&link.provider, &link.external_id))
            .filter(|stored| stored.id == link.id)
            .ok_or(StoreError::NotFound)?;
        stored.user = new_user.clone();
        Ok(stored.clone())
    }

    async fn create_user(&self, username: &str) -> Result<MemoryUser, StoreError> {
        let mut inner = self.lock()?;
        inner.next_user_id += 1;
        let user = MemoryUser {
            id: inner.next_user_id,
            username: username.to_string(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn update_extra_data(
        &self,
        link: &LinkRecord<MemoryUser>,
        extra_data: ExtraData,
    ) -> Result<LinkRecord<MemoryUser>, StoreError> {
        let mut inner = self.lock()?;
        let stored = inner
            .links
            .get_mut(&key(&link.provider, &link.external_id))
            .filter(|stored| stored.id == link.id)
            .ok_or(StoreError::NotFound)?;
        stored.extra_data = extra_data;
        Ok(stored.clone())
    }
}
