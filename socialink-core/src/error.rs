use thiserror::Error;

/// Errors surfaced to the caller of a login attempt.
///
/// None of the variants carry token values.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization code could not be exchanged for an access token.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    /// The request carried neither a usable code nor a valid signed request.
    #[error("{0}")]
    NoAuthorizationPresent(String),
    /// The profile endpoint could not be reached or returned an unreadable body.
    #[error("could not load user data: {0}")]
    ProfileFetchFailed(String),
    /// The provider answered with an `error` object.
    #[error("provider error: {0}")]
    ProviderError(String),
    /// A required profile field was absent.
    #[error("missing profile field: {0}")]
    MissingField(&'static str),
    /// The `state` parameter did not match the one issued at login.
    #[error("state mismatch")]
    CsrfMismatch,
    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    /// The provider configuration is incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// The message shown to the end user, e.g. `authentication error: access_denied`.
    pub fn user_message(&self) -> String {
        format!("authentication error: {self}")
    }
}

/// Errors reported by a [`LinkStore`](crate::LinkStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A link for the same `(provider, external_id)` pair already exists.
    #[error("duplicate link")]
    Duplicate,
    /// The record to update no longer exists.
    #[error("record not found")]
    NotFound,
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_carries_reason() {
        let err = AuthError::NoAuthorizationPresent("access_denied".into());
        assert_eq!(err.user_message(), "authentication error: access_denied");

        let err = AuthError::ProviderError("Invalid token".into());
        assert_eq!(
            err.user_message(),
            "authentication error: provider error: Invalid token"
        );
    }

    #[test]
    fn store_errors_convert() {
        let err: AuthError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, AuthError::Store(StoreError::Backend(_))));
        assert_eq!(err.to_string(), "storage error: connection reset");
    }
}
