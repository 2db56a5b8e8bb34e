//! # Socialink Store
//!
//! [`LinkStore`](socialink_core::LinkStore) implementations: an in-process [`MemoryStore`]
//! and, behind the `sqlite` / `postgres` features, a `sqlx` backed `SqlStore`.
//! Both enforce one link per `(provider, external_id)` pair and report violations as
//! [`StoreError::Duplicate`](socialink_core::StoreError::Duplicate).

pub mod memory;
pub use memory::{MemoryStore, MemoryUser};

#[cfg(feature = "store-sqlx")]
pub mod sql_store;
#[cfg(feature = "store-sqlx")]
pub use sql_store::{SqlStore, SqlUser};
