//! The default association stages.

use crate::pipeline::{PipelineContext, Stage, StageOutcome};
use async_trait::async_trait;
use serde_json::Value;
use socialink_core::store::ExtraData;
use socialink_core::{AuthError, LinkStore, RegistrationObserver, StoreError};
use std::sync::Arc;

/// Looks up an existing link for the identity.
///
/// When the attempt is made on behalf of a logged-in user who does not own the link,
/// the link is moved to that user. Otherwise the link's owner becomes the effective user.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocialAuthUser;

#[async_trait]
impl<S: LinkStore> Stage<S> for SocialAuthUser {
    fn name(&self) -> &'static str {
        "social_auth_user"
    }

    async fn run(
        &self,
        store: &S,
        ctx: &mut PipelineContext<S::User>,
    ) -> Result<StageOutcome, AuthError> {
        let identity = &ctx.identity;
        let Some(link) = store
            .find_link(&identity.provider_id, &identity.external_id)
            .await?
        else {
            return Ok(StageOutcome::Continue);
        };

        match ctx.user.clone() {
            Some(user) if user != link.user => {
                log::info!(
                    "moving {} account {} to the current user",
                    identity.provider_id,
                    identity.external_id
                );
                ctx.link = Some(store.rebind_link(&link, &user).await?);
            }
            Some(_) => ctx.link = Some(link),
            None => {
                ctx.user = Some(link.user.clone());
                ctx.link = Some(link);
            }
        }
        Ok(StageOutcome::Continue)
    }
}

/// Creates a local user when none was determined yet.
pub struct CreateUser {
    create_users: bool,
    observer: Arc<dyn RegistrationObserver>,
}

impl CreateUser {
    /// `create_users` is the registration policy; `observer` hears about blocked sign-ups.
    pub fn new(create_users: bool, observer: Arc<dyn RegistrationObserver>) -> Self {
        Self {
            create_users,
            observer,
        }
    }
}

#[async_trait]
impl<S: LinkStore> Stage<S> for CreateUser {
    fn name(&self) -> &'static str {
        "create_user"
    }

    async fn run(
        &self,
        store: &S,
        ctx: &mut PipelineContext<S::User>,
    ) -> Result<StageOutcome, AuthError> {
        if ctx.user.is_some() {
            return Ok(StageOutcome::Continue);
        }
        let Some(username) = ctx.identity.username.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(StageOutcome::Continue);
        };

        if !self.create_users {
            self.observer
                .registration_blocked(&ctx.identity.external_id, &ctx.profile, &ctx.identity)
                .await;
            return Ok(StageOutcome::Stop);
        }

        let user = store.create_user(username).await?;
        log::info!(
            "created user {} for {} account {}",
            username,
            ctx.identity.provider_id,
            ctx.identity.external_id
        );
        ctx.user = Some(user);
        ctx.is_new = true;
        Ok(StageOutcome::Continue)
    }
}

/// Links the effective user to the identity when no link exists yet.
///
/// A concurrent attempt may insert the same `(provider, external_id)` between the lookup
/// and the insert. The store then reports [`StoreError::Duplicate`] and the link written by
/// the other attempt is loaded instead. A user created by this attempt yields to the
/// existing owner, so both attempts end up with the same user. A logged-in caller takes
/// the link over, as [`SocialAuthUser`] would have done.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssociateUser;

#[async_trait]
impl<S: LinkStore> Stage<S> for AssociateUser {
    fn name(&self) -> &'static str {
        "associate_user"
    }

    async fn run(
        &self,
        store: &S,
        ctx: &mut PipelineContext<S::User>,
    ) -> Result<StageOutcome, AuthError> {
        if ctx.link.is_some() {
            return Ok(StageOutcome::Continue);
        }
        let Some(user) = ctx.user.clone() else {
            return Ok(StageOutcome::Continue);
        };
        let provider = ctx.identity.provider_id.as_str();
        let external_id = ctx.identity.external_id.as_str();

        match store.create_link(provider, external_id, &user).await {
            Ok(link) => {
                ctx.link = Some(link);
            }
            Err(StoreError::Duplicate) => {
                log::debug!("{provider} account {external_id} was linked concurrently");
                let existing = store
                    .find_link(provider, external_id)
                    .await?
                    .ok_or(StoreError::NotFound)?;

                if existing.user == user {
                    ctx.link = Some(existing);
                } else if ctx.is_new {
                    ctx.is_new = false;
                    ctx.user = Some(existing.user.clone());
                    ctx.link = Some(existing);
                } else {
                    ctx.link = Some(store.rebind_link(&existing, &user).await?);
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(StageOutcome::Continue)
    }
}

/// Refreshes the fixed extra data (`id`, `expires`) kept on the link.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadExtraData;

#[async_trait]
impl<S: LinkStore> Stage<S> for LoadExtraData {
    fn name(&self) -> &'static str {
        "load_extra_data"
    }

    async fn run(
        &self,
        store: &S,
        ctx: &mut PipelineContext<S::User>,
    ) -> Result<StageOutcome, AuthError> {
        let Some(link) = &ctx.link else {
            return Ok(StageOutcome::Continue);
        };

        let mut extra_data = ExtraData::new();
        extra_data.insert("id".into(), Value::from(ctx.identity.external_id.clone()));
        extra_data.insert(
            "expires".into(),
            ctx.identity.expires.map(Value::from).unwrap_or(Value::Null),
        );

        if link.extra_data != extra_data {
            let updated = store.update_extra_data(link, extra_data).await?;
            ctx.link = Some(updated);
        }
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AssociationPipeline, PipelineOutcome};
    use serde_json::json;
    use socialink_core::{AccessToken, Identity, LinkRecord, RemoteProfile};
    use socialink_store::{MemoryStore, MemoryUser};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn identity(username: Option<&str>) -> Identity {
        Identity {
            provider_id: "facebook".into(),
            external_id: "42".into(),
            username: username.map(str::to_string),
            email: "jane@example.com".into(),
            full_name: "Jane Doe".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            access_token: AccessToken::new("tok1"),
            expires: Some(3600),
        }
    }

    fn profile() -> RemoteProfile {
        match json!({"id": "42", "name": "Jane Doe", "username": "jane"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        blocked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RegistrationObserver for RecordingObserver {
        async fn registration_blocked(
            &self,
            external_id: &str,
            profile: &RemoteProfile,
            identity: &Identity,
        ) {
            assert_eq!(profile.get("id"), Some(&json!(external_id)));
            assert_eq!(identity.external_id, external_id);
            self.blocked.lock().unwrap().push(external_id.to_string());
        }
    }

    /// Hides existing links from the first lookup, as if another attempt inserted its
    /// link right after this attempt looked.
    struct LateWinnerStore {
        inner: MemoryStore,
        hidden: AtomicBool,
    }

    impl LateWinnerStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                hidden: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl LinkStore for LateWinnerStore {
        type User = MemoryUser;

        async fn find_link(
            &self,
            provider: &str,
            external_id: &str,
        ) -> Result<Option<LinkRecord<MemoryUser>>, StoreError> {
            if self.hidden.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_link(provider, external_id).await
        }

        async fn create_link(
            &self,
            provider: &str,
            external_id: &str,
            user: &MemoryUser,
        ) -> Result<LinkRecord<MemoryUser>, StoreError> {
            self.inner.create_link(provider, external_id, user).await
        }

        async fn rebind_link(
            &self,
            link: &LinkRecord<MemoryUser>,
            new_user: &MemoryUser,
        ) -> Result<LinkRecord<MemoryUser>, StoreError> {
            self.inner.rebind_link(link, new_user).await
        }

        async fn create_user(&self, username: &str) -> Result<MemoryUser, StoreError> {
            self.inner.create_user(username).await
        }

        async fn update_extra_data(
            &self,
            link: &LinkRecord<MemoryUser>,
            extra_data: ExtraData,
        ) -> Result<LinkRecord<MemoryUser>, StoreError> {
            self.inner.update_extra_data(link, extra_data).await
        }
    }

    fn default_pipeline<S: LinkStore + 'static>(
        store: S,
        create_users: bool,
        observer: Arc<dyn RegistrationObserver>,
    ) -> AssociationPipeline<S> {
        AssociationPipeline::with_default_stages(store, create_users, observer)
    }

    #[tokio::test]
    async fn first_login_creates_user_and_link() {
        let store = MemoryStore::new();
        let pipeline = default_pipeline(store.clone(), true, Arc::new(RecordingObserver::default()));

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();

        let PipelineOutcome::Authenticated { user, is_new, link } = outcome else {
            panic!("expected a user");
        };
        assert_eq!(user.username, "jane");
        assert!(is_new);
        let link = link.unwrap();
        assert_eq!(link.user, user);
        assert_eq!(link.extra_data.get("id"), Some(&json!("42")));
        assert_eq!(link.extra_data.get("expires"), Some(&json!(3600)));
        assert_eq!(store.links().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn returning_login_adopts_the_owner() {
        let store = MemoryStore::new();
        let jane = store.create_user("jane").await.unwrap();
        store.create_link("facebook", "42", &jane).await.unwrap();
        let pipeline = default_pipeline(store.clone(), true, Arc::new(RecordingObserver::default()));

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            PipelineOutcome::Authenticated { ref user, is_new: false, .. } if *user == jane
        ));
        assert_eq!(store.users().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn existing_link_moves_to_the_logged_in_user() {
        let store = MemoryStore::new();
        let owner = store.create_user("owner").await.unwrap();
        let caller = store.create_user("caller").await.unwrap();
        store.create_link("facebook", "42", &owner).await.unwrap();
        let pipeline = default_pipeline(store.clone(), true, Arc::new(RecordingObserver::default()));

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), Some(caller.clone()))
            .await
            .unwrap();

        assert_eq!(outcome.user(), Some(&caller));
        let link = store.find_link("facebook", "42").await.unwrap().unwrap();
        assert_eq!(link.user, caller);
        assert_eq!(store.users().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blocked_registration_notifies_and_yields_no_user() {
        let store = MemoryStore::new();
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = default_pipeline(store.clone(), false, observer.clone());

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();

        assert_eq!(outcome, PipelineOutcome::NoUser);
        assert_eq!(*observer.blocked.lock().unwrap(), vec!["42".to_string()]);
        assert!(store.users().unwrap().is_empty());
        assert!(store.links().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_registration_still_lets_known_users_in() {
        let store = MemoryStore::new();
        let jane = store.create_user("jane").await.unwrap();
        store.create_link("facebook", "42", &jane).await.unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = default_pipeline(store, false, observer.clone());

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();

        assert_eq!(outcome.user(), Some(&jane));
        assert!(observer.blocked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_username_creates_nothing() {
        let store = MemoryStore::new();
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = default_pipeline(store.clone(), true, observer.clone());

        for username in [None, Some("")] {
            let outcome = pipeline
                .run(identity(username), profile(), None)
                .await
                .unwrap();
            assert_eq!(outcome, PipelineOutcome::NoUser);
        }
        assert!(store.users().unwrap().is_empty());
        assert!(observer.blocked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_link_is_adopted_instead_of_failing() {
        let memory = MemoryStore::new();
        let winner = memory.create_user("jane").await.unwrap();
        memory.create_link("facebook", "42", &winner).await.unwrap();
        let pipeline = default_pipeline(
            LateWinnerStore::new(memory.clone()),
            true,
            Arc::new(RecordingObserver::default()),
        );

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();

        let PipelineOutcome::Authenticated { user, is_new, link } = outcome else {
            panic!("expected a user");
        };
        assert_eq!(user, winner);
        assert!(!is_new);
        assert_eq!(link.unwrap().user, winner);
        assert_eq!(memory.links().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_link_is_taken_over_by_logged_in_user() {
        let memory = MemoryStore::new();
        let winner = memory.create_user("jane").await.unwrap();
        let caller = memory.create_user("caller").await.unwrap();
        memory.create_link("facebook", "42", &winner).await.unwrap();
        let pipeline = default_pipeline(
            LateWinnerStore::new(memory.clone()),
            true,
            Arc::new(RecordingObserver::default()),
        );

        let outcome = pipeline
            .run(identity(Some("jane")), profile(), Some(caller.clone()))
            .await
            .unwrap();

        assert_eq!(outcome.user(), Some(&caller));
        let link = memory.find_link("facebook", "42").await.unwrap().unwrap();
        assert_eq!(link.user, caller);
    }

    #[tokio::test]
    async fn unchanged_extra_data_is_not_rewritten() {
        let store = MemoryStore::new();
        let pipeline = default_pipeline(store.clone(), true, Arc::new(RecordingObserver::default()));

        let first = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();
        let second = pipeline
            .run(identity(Some("jane")), profile(), None)
            .await
            .unwrap();

        let (
            PipelineOutcome::Authenticated { link: Some(a), .. },
            PipelineOutcome::Authenticated { link: Some(b), .. },
        ) = (first, second)
        else {
            panic!("expected linked users");
        };
        assert_eq!(a, b);
    }
}
