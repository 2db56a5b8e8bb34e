//! # Socialink Flow
//!
//! `socialink-flow` turns a provider callback into a local user. It acts as the bridge
//! between an [`IdentityProvider`](socialink_core::IdentityProvider) and a
//! [`LinkStore`](socialink_core::LinkStore).
//!
//! ## Key Components
//!
//! - **[`SocialAuthFlow`]**: Orchestrates one login attempt from callback data to user.
//! - **[`AssociationPipeline`]**: The sequence of [`Stage`]s that locates, creates and links
//!   the local user.
//! - **[`stages`]**: The default stages, `social_auth_user`, `create_user`,
//!   `associate_user` and `load_extra_data`.

#![warn(missing_docs)]

/// Login orchestration.
pub mod flow;
/// The association pipeline and its stage interface.
pub mod pipeline;
pub mod stages;

pub use flow::SocialAuthFlow;
pub use pipeline::{
    AssociationPipeline, AssociationPipelineBuilder, PipelineContext, PipelineOutcome, Stage,
    StageOutcome,
};
pub use stages::{AssociateUser, CreateUser, LoadExtraData, SocialAuthUser};
