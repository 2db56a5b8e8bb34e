use async_trait::async_trait;
use socialink_core::{
    AccessToken, AuthError, Identity, IdentityProvider, ProviderConfig, RemoteProfile,
    RequestData, ResolvedToken,
};
use socialink_providers_facebook::FacebookProvider;

/// The identity providers this build supports.
#[non_exhaustive]
pub enum Provider {
    /// Facebook login.
    Facebook(FacebookProvider),
}

impl Provider {
    /// Names accepted by [`from_config`](Self::from_config).
    pub const NAMES: &'static [&'static str] = &[socialink_providers_facebook::PROVIDER_ID];

    /// Build the provider registered under `name`.
    ///
    /// Fails when the name is unknown or the configuration lacks client credentials.
    pub fn from_config(name: &str, config: ProviderConfig) -> Result<Self, AuthError> {
        if !Self::NAMES.contains(&name) {
            return Err(AuthError::Config(format!("unknown provider {name:?}")));
        }
        if !config.is_enabled() {
            return Err(AuthError::Config(format!(
                "{name} is missing its client id or secret"
            )));
        }
        Ok(Provider::Facebook(FacebookProvider::new(config)))
    }

    /// Build the provider from `<NAME>_*` environment variables.
    pub fn from_env(name: &str) -> Result<Self, AuthError> {
        let config = ProviderConfig::from_env(&name.to_ascii_uppercase())?;
        Self::from_config(name, config)
    }

    /// The provider's configuration.
    pub fn config(&self) -> &ProviderConfig {
        match self {
            Provider::Facebook(provider) => provider.config(),
        }
    }

    fn inner(&self) -> &dyn IdentityProvider {
        match self {
            Provider::Facebook(provider) => provider,
        }
    }
}

impl From<FacebookProvider> for Provider {
    fn from(provider: FacebookProvider) -> Self {
        Provider::Facebook(provider)
    }
}

#[async_trait]
impl IdentityProvider for Provider {
    fn provider_id(&self) -> &str {
        self.inner().provider_id()
    }

    fn authorization_url(&self, state: &str) -> String {
        self.inner().authorization_url(state)
    }

    async fn resolve_token(&self, request: &RequestData) -> Result<ResolvedToken, AuthError> {
        self.inner().resolve_token(request).await
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteProfile, AuthError> {
        self.inner().fetch_profile(token).await
    }

    fn normalize(
        &self,
        profile: &RemoteProfile,
        token: ResolvedToken,
    ) -> Result<Identity, AuthError> {
        self.inner().normalize(profile, token)
    }
}
