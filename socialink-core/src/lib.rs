//! # Socialink Core
//!
//! `socialink-core` provides the foundational traits and types shared by the socialink crates.
//! It defines the identity model, the provider capability interface and the storage and
//! notification collaborators that the association pipeline relies on.

#![warn(missing_docs)]

use async_trait::async_trait;

/// Errors that can occur during the authentication process.
pub mod error;
pub use crate::error::{AuthError, StoreError};

/// Access tokens, remote profiles and the normalized identity.
pub mod state;
pub use crate::state::{AccessToken, Identity, RemoteProfile, RequestData, ResolvedToken};

/// Provider configuration.
pub mod config;
pub use crate::config::ProviderConfig;

/// Link records and the storage collaborator.
pub mod store;
pub use crate::store::{ExtraData, LinkRecord, LinkStore, LogObserver, RegistrationObserver};

/// Capability interface implemented by every supported identity provider.
///
/// A login attempt calls the three steps in order: [`resolve_token`](Self::resolve_token),
/// [`fetch_profile`](Self::fetch_profile) and [`normalize`](Self::normalize).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Get the provider identifier, e.g. `"facebook"`.
    fn provider_id(&self) -> &str;

    /// Build the URL the user agent is redirected to in order to start a login.
    fn authorization_url(&self, state: &str) -> String;

    /// Turn the callback request data into an access token.
    async fn resolve_token(&self, request: &RequestData) -> Result<ResolvedToken, AuthError>;

    /// Load the raw profile of the token's owner.
    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteProfile, AuthError>;

    /// Map a raw profile into the canonical [`Identity`].
    fn normalize(&self, profile: &RemoteProfile, token: ResolvedToken)
        -> Result<Identity, AuthError>;
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for std::sync::Arc<T> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn authorization_url(&self, state: &str) -> String {
        (**self).authorization_url(state)
    }

    async fn resolve_token(&self, request: &RequestData) -> Result<ResolvedToken, AuthError> {
        (**self).resolve_token(request).await
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteProfile, AuthError> {
        (**self).fetch_profile(token).await
    }

    fn normalize(
        &self,
        profile: &RemoteProfile,
        token: ResolvedToken,
    ) -> Result<Identity, AuthError> {
        (**self).normalize(profile, token)
    }
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for Box<T> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn authorization_url(&self, state: &str) -> String {
        (**self).authorization_url(state)
    }

    async fn resolve_token(&self, request: &RequestData) -> Result<ResolvedToken, AuthError> {
        (**self).resolve_token(request).await
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteProfile, AuthError> {
        (**self).fetch_profile(token).await
    }

    fn normalize(
        &self,
        profile: &RemoteProfile,
        token: ResolvedToken,
    ) -> Result<Identity, AuthError> {
        (**self).normalize(profile, token)
    }
}
