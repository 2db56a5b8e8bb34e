use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings of one identity provider.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Application id issued by the provider.
    pub client_id: String,
    /// Application secret issued by the provider.
    pub client_secret: String,
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Extra permissions requested at login.
    #[serde(default)]
    pub extended_permissions: Vec<String>,
    /// Whether unknown identities may create local users.
    #[serde(default = "default_create_users")]
    pub create_users: bool,
    /// Key for signed requests. Falls back to `client_secret`.
    #[serde(default)]
    pub signed_payload_secret: Option<String>,
}

fn default_create_users() -> bool {
    true
}

impl ProviderConfig {
    /// Create a configuration with the default policy (user creation allowed).
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            extended_permissions: Vec::new(),
            create_users: default_create_users(),
            signed_payload_secret: None,
        }
    }

    /// Set the extended permissions.
    pub fn with_extended_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extended_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the user creation policy.
    pub fn with_create_users(mut self, create_users: bool) -> Self {
        self.create_users = create_users;
        self
    }

    /// Set a dedicated signed-request secret.
    pub fn with_signed_payload_secret(mut self, secret: impl Into<String>) -> Self {
        self.signed_payload_secret = Some(secret.into());
        self
    }

    /// A provider is enabled once both client credentials are set.
    pub fn is_enabled(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// The key signed requests are verified with.
    pub fn signed_payload_key(&self) -> &[u8] {
        self.signed_payload_secret
            .as_deref()
            .unwrap_or(&self.client_secret)
            .as_bytes()
    }

    /// Load the configuration from `<PREFIX>_*` environment variables.
    ///
    /// `CLIENT_ID`, `CLIENT_SECRET` and `REDIRECT_URI` are required.
    /// `EXTENDED_PERMISSIONS` is comma separated. `CREATE_USERS` accepts
    /// `true`/`false`/`1`/`0`/`yes`/`no`.
    pub fn from_env(prefix: &str) -> Result<Self, AuthError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{prefix}_{name}"));
        let require = |name: &str| {
            get(name).ok_or_else(|| AuthError::Config(format!("{prefix}_{name} is not set")))
        };

        let extended_permissions = get("EXTENDED_PERMISSIONS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let create_users = match get("CREATE_USERS") {
            None => default_create_users(),
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AuthError::Config(format!("{prefix}_CREATE_USERS has invalid value {raw:?}"))
            })?,
        };

        Ok(Self {
            client_id: require("CLIENT_ID")?,
            client_secret: require("CLIENT_SECRET")?,
            redirect_uri: require("REDIRECT_URI")?,
            extended_permissions,
            create_users,
            signed_payload_secret: get("SIGNED_PAYLOAD_SECRET"),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("extended_permissions", &self.extended_permissions)
            .field("create_users", &self.create_users)
            .field(
                "signed_payload_secret",
                &self.signed_payload_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn loads_from_prefixed_variables() {
        let config = ProviderConfig::from_lookup(
            "FACEBOOK",
            lookup(&[
                ("FACEBOOK_CLIENT_ID", "app"),
                ("FACEBOOK_CLIENT_SECRET", "s3cr3t"),
                ("FACEBOOK_REDIRECT_URI", "https://example.com/complete/facebook/"),
                ("FACEBOOK_EXTENDED_PERMISSIONS", "email, user_birthday,"),
                ("FACEBOOK_CREATE_USERS", "no"),
            ]),
        )
        .unwrap();

        assert_eq!(config.client_id, "app");
        assert_eq!(config.extended_permissions, vec!["email", "user_birthday"]);
        assert!(!config.create_users);
        assert_eq!(config.signed_payload_key(), b"s3cr3t");
        assert!(config.is_enabled());
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let err = ProviderConfig::from_lookup("FACEBOOK", lookup(&[("FACEBOOK_CLIENT_ID", "app")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: FACEBOOK_CLIENT_SECRET is not set"
        );
    }

    #[test]
    fn invalid_policy_flag_is_rejected() {
        let err = ProviderConfig::from_lookup(
            "FB",
            lookup(&[
                ("FB_CLIENT_ID", "app"),
                ("FB_CLIENT_SECRET", "secret"),
                ("FB_REDIRECT_URI", "https://example.com/"),
                ("FB_CREATE_USERS", "maybe"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "client_id": "app",
            "client_secret": "secret",
            "redirect_uri": "https://example.com/",
            "signed_payload_secret": "widget-key",
        }))
        .unwrap();

        assert!(config.create_users);
        assert!(config.extended_permissions.is_empty());
        assert_eq!(config.signed_payload_key(), b"widget-key");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ProviderConfig::new("app", "s3cr3t", "https://example.com/")
            .with_signed_payload_secret("widget-key");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("widget-key"));
        assert!(!ProviderConfig::new("", "", "https://example.com/").is_enabled());
    }
}
