//! # Socialink
//!
//! Social login for Rust: turn a provider callback into a local user account.
//!
//! This crate re-exports the socialink workspace behind feature flags:
//!
//! | Feature    | Crate                           | Default |
//! |------------|---------------------------------|---------|
//! | `flow`     | `socialink-flow`                | yes     |
//! | `facebook` | `socialink-providers-facebook`  | yes     |
//! | `store`    | `socialink-store`               | no      |
//! | `sqlite`   | `socialink-store/sqlite`        | no      |
//! | `postgres` | `socialink-store/postgres`      | no      |
//!
//! ```no_run
//! # #[cfg(all(feature = "flow", feature = "facebook"))]
//! # fn demo() -> Result<(), socialink::AuthError> {
//! use socialink::{Provider, ProviderConfig};
//!
//! let config = ProviderConfig::from_env("FACEBOOK")?;
//! let provider = Provider::from_config("facebook", config)?;
//! # Ok(())
//! # }
//! ```

pub use socialink_core::{
    AccessToken, AuthError, ExtraData, Identity, IdentityProvider, LinkRecord, LinkStore,
    LogObserver, ProviderConfig, RegistrationObserver, RemoteProfile, RequestData,
    ResolvedToken, StoreError,
};

#[cfg(feature = "flow")]
pub use socialink_flow as flow;

#[cfg(feature = "store")]
pub use socialink_store as store;

#[cfg(feature = "facebook")]
pub use socialink_providers_facebook as facebook;

#[cfg(feature = "facebook")]
mod provider;
#[cfg(feature = "facebook")]
pub use provider::Provider;
