//! # Socialink Facebook provider
//!
//! Facebook login for the socialink pipeline. Tokens are resolved either through the
//! OAuth2 authorization code exchange or from a `signed_request` posted by an embedded
//! Facebook widget.
//!
//! ```no_run
//! use socialink_core::{IdentityProvider, ProviderConfig};
//! use socialink_providers_facebook::FacebookProvider;
//!
//! let config = ProviderConfig::new("app-id", "app-secret", "https://example.com/complete/facebook/")
//!     .with_extended_permissions(["email"]);
//! let provider = FacebookProvider::new(config);
//! let url = provider.authorization_url("csrf-state");
//! ```

#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use socialink_core::{
    AccessToken, AuthError, Identity, IdentityProvider, ProviderConfig, RemoteProfile,
    RequestData, ResolvedToken,
};
use url::form_urlencoded;

/// Signed request verification.
pub mod signed_request;

/// Provider name used as the link key.
pub const PROVIDER_ID: &str = "facebook";
/// Login dialog endpoint.
pub const AUTHORIZATION_URL: &str = "https://www.facebook.com/dialog/oauth";
/// Graph API base URL.
pub const GRAPH_URL: &str = "https://graph.facebook.com";
/// Facebook separates requested permissions with commas.
pub const SCOPE_SEPARATOR: &str = ",";

/// Facebook login provider.
pub struct FacebookProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
    authorization_url: String,
    graph_url: String,
}

impl FacebookProvider {
    /// Create a provider talking to the public Facebook endpoints.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            authorization_url: AUTHORIZATION_URL.to_string(),
            graph_url: GRAPH_URL.to_string(),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Override the Graph API base URL, e.g. to pin an API version.
    pub fn with_graph_url(mut self, graph_url: impl Into<String>) -> Self {
        self.graph_url = graph_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the login dialog URL.
    pub fn with_authorization_url(mut self, authorization_url: impl Into<String>) -> Self {
        self.authorization_url = authorization_url.into();
        self
    }

    /// The provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn exchange_code(&self, code: &str) -> Result<ResolvedToken, AuthError> {
        let url = with_query(
            &format!("{}/oauth/access_token", self.graph_url),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ],
        );

        // The URL carries the client secret, keep it out of error messages.
        let body = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.without_url().to_string()))?
            .text()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.without_url().to_string()))?;

        parse_token_response(&body)
    }

    fn token_from_signed_request(
        &self,
        signed: &str,
        request: &RequestData,
    ) -> Option<ResolvedToken> {
        let claims =
            match signed_request::verify(signed, self.config.signed_payload_key(), Utc::now()) {
                Ok(claims) => claims,
                Err(e) => {
                    log::debug!("ignoring signed request: {e}");
                    return None;
                }
            };

        let token = ["access_token", "oauth_token"]
            .iter()
            .find_map(|key| non_empty(claims.get(*key).and_then(Value::as_str)))
            .or_else(|| non_empty(request.get("access_token").map(String::as_str)))?;

        // Offline-access tokens carry `expires: 0`.
        let expires = claims
            .get("expires")
            .and_then(lenient_i64)
            .filter(|expires| *expires != 0);

        Some(ResolvedToken::new(AccessToken::new(token), expires))
    }
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn authorization_url(&self, state: &str) -> String {
        let scope = self.config.extended_permissions.join(SCOPE_SEPARATOR);
        let mut params = vec![
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("state", state),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }
        with_query(&self.authorization_url, &params)
    }

    async fn resolve_token(&self, request: &RequestData) -> Result<ResolvedToken, AuthError> {
        let resolved = if let Some(code) = request.get("code") {
            Some(self.exchange_code(code).await?)
        } else if let Some(signed) = request.get("signed_request") {
            self.token_from_signed_request(signed, request)
        } else {
            None
        };

        resolved.ok_or_else(|| {
            let reason = non_empty(request.get("error").map(String::as_str))
                .unwrap_or_else(|| "unknown error".to_string());
            AuthError::NoAuthorizationPresent(reason)
        })
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteProfile, AuthError> {
        let url = with_query(
            &format!("{}/me", self.graph_url),
            &[("access_token", token.secret())],
        );

        let response = self.http_client.get(url).send().await.map_err(|e| {
            let e = e.without_url();
            log::error!("could not load user data from Facebook for token {token}: {e}");
            AuthError::ProfileFetchFailed(e.to_string())
        })?;

        // Graph API errors come back as 4xx with an `error` object, which the
        // normalizer turns into a provider error.
        let body = response.bytes().await.map_err(|e| {
            let e = e.without_url();
            log::error!("could not read user data from Facebook for token {token}: {e}");
            AuthError::ProfileFetchFailed(e.to_string())
        })?;

        let profile: RemoteProfile = serde_json::from_slice(&body).map_err(|e| {
            log::error!("could not parse user data from Facebook for token {token}: {e}");
            AuthError::ProfileFetchFailed(format!("invalid JSON: {e}"))
        })?;

        log::debug!("found user data for token {token}");
        Ok(profile)
    }

    fn normalize(
        &self,
        profile: &RemoteProfile,
        token: ResolvedToken,
    ) -> Result<Identity, AuthError> {
        if let Some(error) = profile.get("error") {
            return Err(AuthError::ProviderError(error_message(error)));
        }

        let external_id = match profile.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(AuthError::MissingField("id")),
        };

        let full_name = profile
            .get("name")
            .and_then(Value::as_str)
            .ok_or(AuthError::MissingField("name"))?
            .to_string();

        let text = |key: &str| {
            profile
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Identity {
            provider_id: PROVIDER_ID.to_string(),
            external_id,
            username: non_empty(profile.get("username").and_then(Value::as_str)),
            email: text("email"),
            full_name,
            first_name: text("first_name"),
            last_name: text("last_name"),
            access_token: token.access_token,
            expires: token.expires,
        })
    }
}

#[derive(Deserialize)]
struct JsonTokenResponse {
    access_token: Option<String>,
    expires_in: Option<Value>,
    expires: Option<Value>,
    error: Option<Value>,
}

/// Parse the token endpoint body.
///
/// Legacy Graph versions answer `access_token=...&expires=...`; newer ones answer JSON.
fn parse_token_response(body: &str) -> Result<ResolvedToken, AuthError> {
    if body.trim_start().starts_with('{') {
        let response: JsonTokenResponse = serde_json::from_str(body)
            .map_err(|e| AuthError::TokenExchangeFailed(format!("invalid JSON response: {e}")))?;

        if let Some(error) = response.error {
            return Err(AuthError::TokenExchangeFailed(error_message(&error)));
        }

        let access_token = non_empty(response.access_token.as_deref()).ok_or_else(|| {
            AuthError::TokenExchangeFailed("response lacks access_token".into())
        })?;
        let expires = response
            .expires_in
            .or(response.expires)
            .as_ref()
            .and_then(lenient_i64);

        return Ok(ResolvedToken::new(AccessToken::new(access_token), expires));
    }

    let mut access_token = None;
    let mut expires = None;
    for (key, value) in form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "access_token" if access_token.is_none() => access_token = Some(value.into_owned()),
            "expires" if expires.is_none() => expires = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    let access_token = non_empty(access_token.as_deref())
        .ok_or_else(|| AuthError::TokenExchangeFailed("response lacks access_token".into()))?;

    Ok(ResolvedToken::new(AccessToken::new(access_token), expires))
}

fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{base}?{query}")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Graph errors are `{"message": .., "type": .., "code": ..}` objects; older
/// endpoints use plain strings.
fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
