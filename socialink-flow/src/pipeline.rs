use crate::stages::{AssociateUser, CreateUser, LoadExtraData, SocialAuthUser};
use async_trait::async_trait;
use socialink_core::{AuthError, Identity, LinkRecord, LinkStore, RegistrationObserver, RemoteProfile};
use std::sync::Arc;

/// State threaded through the stages of one login attempt.
#[derive(Debug, Clone)]
pub struct PipelineContext<U> {
    /// The normalized identity being logged in.
    pub identity: Identity,
    /// The raw profile it was built from.
    pub profile: RemoteProfile,
    /// The local user determined so far.
    pub user: Option<U>,
    /// The link between `user` and the identity, once known.
    pub link: Option<LinkRecord<U>>,
    /// Whether `user` was created during this attempt.
    pub is_new: bool,
}

impl<U> PipelineContext<U> {
    /// Start a context for `identity`, optionally on behalf of an already logged-in user.
    pub fn new(identity: Identity, profile: RemoteProfile, current_user: Option<U>) -> Self {
        Self {
            identity,
            profile,
            user: current_user,
            link: None,
            is_new: false,
        }
    }
}

/// What the pipeline does after a stage returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Run the next stage.
    Continue,
    /// Skip the remaining stages.
    Stop,
}

/// One step of the association pipeline.
#[async_trait]
pub trait Stage<S: LinkStore>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Inspect and update the context.
    async fn run(
        &self,
        store: &S,
        ctx: &mut PipelineContext<S::User>,
    ) -> Result<StageOutcome, AuthError>;
}

/// Terminal result of [`AssociationPipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome<U> {
    /// A local user was determined.
    Authenticated {
        /// The effective local user.
        user: U,
        /// Whether the user was created during this attempt.
        is_new: bool,
        /// The link to the identity. Always set by the default stages.
        link: Option<LinkRecord<U>>,
    },
    /// No user could be determined, e.g. registration was blocked.
    NoUser,
}

impl<U> PipelineOutcome<U> {
    /// The effective user, if any.
    pub fn user(&self) -> Option<&U> {
        match self {
            PipelineOutcome::Authenticated { user, .. } => Some(user),
            PipelineOutcome::NoUser => None,
        }
    }
}

/// Runs a sequence of [`Stage`]s against a [`LinkStore`].
pub struct AssociationPipeline<S: LinkStore> {
    store: S,
    stages: Vec<Box<dyn Stage<S>>>,
}

impl<S: LinkStore + 'static> AssociationPipeline<S> {
    /// Create a new builder with no stages.
    pub fn builder(store: S) -> AssociationPipelineBuilder<S> {
        AssociationPipelineBuilder {
            store,
            stages: Vec::new(),
        }
    }

    /// The standard pipeline: `social_auth_user`, `create_user`, `associate_user`,
    /// `load_extra_data`.
    pub fn with_default_stages(
        store: S,
        create_users: bool,
        observer: Arc<dyn RegistrationObserver>,
    ) -> Self {
        Self::builder(store)
            .stage(SocialAuthUser)
            .stage(CreateUser::new(create_users, observer))
            .stage(AssociateUser)
            .stage(LoadExtraData)
            .build()
    }

    /// The storage collaborator.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Names of the configured stages, in order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order until one stops or fails.
    pub async fn run(
        &self,
        identity: Identity,
        profile: RemoteProfile,
        current_user: Option<S::User>,
    ) -> Result<PipelineOutcome<S::User>, AuthError> {
        let mut ctx = PipelineContext::new(identity, profile, current_user);

        for stage in &self.stages {
            log::debug!(
                "running stage {} for {} account {}",
                stage.name(),
                ctx.identity.provider_id,
                ctx.identity.external_id
            );
            if stage.run(&self.store, &mut ctx).await? == StageOutcome::Stop {
                log::debug!("pipeline stopped by {}", stage.name());
                break;
            }
        }

        Ok(match ctx.user {
            Some(user) => PipelineOutcome::Authenticated {
                user,
                is_new: ctx.is_new,
                link: ctx.link,
            },
            None => PipelineOutcome::NoUser,
        })
    }
}

/// Builder for the [`AssociationPipeline`].
pub struct AssociationPipelineBuilder<S: LinkStore> {
    store: S,
    stages: Vec<Box<dyn Stage<S>>>,
}

impl<S: LinkStore + 'static> AssociationPipelineBuilder<S> {
    /// Append a stage.
    pub fn stage<T>(mut self, stage: T) -> Self
    where
        T: Stage<S> + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    /// Build the [`AssociationPipeline`].
    pub fn build(self) -> AssociationPipeline<S> {
        AssociationPipeline {
            store: self.store,
            stages: self.stages,
        }
    }
}
