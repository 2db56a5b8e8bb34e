use std::collections::HashMap;
use std::fmt;

/// Parameters of the callback request (`code`, `signed_request`, `error`, ...).
pub type RequestData = HashMap<String, String>;

/// Raw JSON object returned by a provider's profile endpoint.
pub type RemoteProfile = serde_json::Map<String, serde_json::Value>;

const MASK: &str = "********";

/// An access token issued by a provider.
///
/// `Debug` and `Display` only ever print [`AccessToken::redacted`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token, for sending to the provider.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// A fixed-length masked form that is safe to log.
    pub fn redacted(&self) -> String {
        MASK.to_string()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&self.redacted()).finish()
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// The outcome of token resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    /// The access token.
    pub access_token: AccessToken,
    /// Expiry as reported by the provider: seconds for code exchanges, an epoch
    /// timestamp for signed requests. Absent for offline-access tokens.
    pub expires: Option<i64>,
}

impl ResolvedToken {
    /// Create a resolved token.
    pub fn new(access_token: AccessToken, expires: Option<i64>) -> Self {
        Self {
            access_token,
            expires,
        }
    }
}

/// The canonical identity extracted from a provider profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider name, e.g. `"facebook"`.
    pub provider_id: String,
    /// Provider-assigned stable identifier of the remote account.
    pub external_id: String,
    /// Provider username, when the account has one.
    pub username: Option<String>,
    /// Email address, empty when not shared.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Given name, possibly empty.
    pub first_name: String,
    /// Family name, possibly empty.
    pub last_name: String,
    /// The token the profile was fetched with.
    pub access_token: AccessToken,
    /// Token expiry, see [`ResolvedToken::expires`].
    pub expires: Option<i64>,
}
