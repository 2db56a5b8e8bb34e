use crate::error::StoreError;
use crate::state::{Identity, RemoteProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed provider data kept on a link (`id`, `expires`).
pub type ExtraData = serde_json::Map<String, serde_json::Value>;

/// Association between a local user and a `(provider, external_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord<U> {
    /// Unique id of the record.
    pub id: Uuid,
    /// Provider name.
    pub provider: String,
    /// Provider-assigned account id.
    pub external_id: String,
    /// The local user owning the link.
    pub user: U,
    /// Provider data refreshed on every login.
    pub extra_data: ExtraData,
    /// When the link was first created.
    pub created_at: DateTime<Utc>,
}

impl<U> LinkRecord<U> {
    /// Create a fresh record owned by `user`.
    pub fn new(provider: impl Into<String>, external_id: impl Into<String>, user: U) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            external_id: external_id.into(),
            user,
            extra_data: ExtraData::new(),
            created_at: Utc::now(),
        }
    }
}

/// Persistent storage for local users and their provider links.
///
/// Implementations must enforce uniqueness of `(provider, external_id)` and report a
/// violation as [`StoreError::Duplicate`].
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// The local user type.
    type User: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Find the link for a `(provider, external_id)` pair.
    async fn find_link(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<LinkRecord<Self::User>>, StoreError>;

    /// Insert a new link.
    async fn create_link(
        &self,
        provider: &str,
        external_id: &str,
        user: &Self::User,
    ) -> Result<LinkRecord<Self::User>, StoreError>;

    /// Move an existing link to another user.
    async fn rebind_link(
        &self,
        link: &LinkRecord<Self::User>,
        new_user: &Self::User,
    ) -> Result<LinkRecord<Self::User>, StoreError>;

    /// Create a local user.
    async fn create_user(&self, username: &str) -> Result<Self::User, StoreError>;

    /// Replace the extra data of a link.
    async fn update_extra_data(
        &self,
        link: &LinkRecord<Self::User>,
        extra_data: ExtraData,
    ) -> Result<LinkRecord<Self::User>, StoreError>;
}

#[async_trait]
impl<S: LinkStore + ?Sized> LinkStore for std::sync::Arc<S> {
    type User = S::User;

    async fn find_link(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<LinkRecord<Self::User>>, StoreError> {
        (**self).find_link(provider, external_id).await
    }

    async fn create_link(
        &self,
        provider: &str,
        external_id: &str,
        user: &Self::User,
    ) -> Result<LinkRecord<Self::User>, StoreError> {
        (**self).create_link(provider, external_id, user).await
    }

    async fn rebind_link(
        &self,
        link: &LinkRecord<Self::User>,
        new_user: &Self::User,
    ) -> Result<LinkRecord<Self::User>, StoreError> {
        (**self).rebind_link(link, new_user).await
    }

    async fn create_user(&self, username: &str) -> Result<Self::User, StoreError> {
        (**self).create_user(username).await
    }

    async fn update_extra_data(
        &self,
        link: &LinkRecord<Self::User>,
        extra_data: ExtraData,
    ) -> Result<LinkRecord<Self::User>, StoreError> {
        (**self).update_extra_data(link, extra_data).await
    }
}

/// Receives notable pipeline events.
#[async_trait]
pub trait RegistrationObserver: Send + Sync {
    /// An unknown identity tried to sign up while user creation is disabled.
    async fn registration_blocked(
        &self,
        external_id: &str,
        profile: &RemoteProfile,
        identity: &Identity,
    );
}

/// Observer that writes events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

#[async_trait]
impl RegistrationObserver for LogObserver {
    async fn registration_blocked(
        &self,
        external_id: &str,
        _profile: &RemoteProfile,
        identity: &Identity,
    ) {
        log::info!(
            "registration blocked for {} account {}",
            identity.provider_id,
            external_id
        );
    }
}
