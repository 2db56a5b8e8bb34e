use crate::pipeline::{AssociationPipeline, PipelineOutcome};
use socialink_core::{AuthError, IdentityProvider, LinkStore, RequestData};

/// Orchestrates a social login: token resolution, profile fetch, normalization and
/// account association.
pub struct SocialAuthFlow<P: IdentityProvider, S: LinkStore> {
    provider: P,
    pipeline: AssociationPipeline<S>,
}

impl<P: IdentityProvider, S: LinkStore + 'static> SocialAuthFlow<P, S> {
    /// Create a new `SocialAuthFlow` with the given provider and pipeline.
    pub fn new(provider: P, pipeline: AssociationPipeline<S>) -> Self {
        Self { provider, pipeline }
    }

    /// The identity provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The association pipeline.
    pub fn pipeline(&self) -> &AssociationPipeline<S> {
        &self.pipeline
    }

    /// Generates the redirect URL and CSRF state.
    pub fn initiate_login(&self) -> (String, String) {
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.provider.authorization_url(&state);
        (url, state)
    }

    /// Completes a login from the callback request data.
    ///
    /// `expected_state` is the value returned by [`initiate_login`](Self::initiate_login);
    /// pass `None` for widget logins, which carry a `signed_request` instead of a state.
    /// An empty expected state never matches.
    /// `current_user` is the user already logged in, if any.
    pub async fn complete_login(
        &self,
        request: &RequestData,
        expected_state: Option<&str>,
        current_user: Option<S::User>,
    ) -> Result<PipelineOutcome<S::User>, AuthError> {
        if let Some(expected) = expected_state {
            if expected.is_empty() || request.get("state").map(String::as_str) != Some(expected) {
                return Err(AuthError::CsrfMismatch);
            }
        }

        let token = self.provider.resolve_token(request).await?;
        let profile = self.provider.fetch_profile(&token.access_token).await?;
        let identity = self.provider.normalize(&profile, token)?;
        log::info!(
            "authenticated {} account {}",
            identity.provider_id,
            identity.external_id
        );

        self.pipeline.run(identity, profile, current_user).await
    }
}
