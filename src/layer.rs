//! State Layer
//!
//! Owns every cache, the rate limiter and both token workflows, and runs
//! the account flows that combine them. One instance is built at startup
//! and shared by the request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::{CacheStats, Sweep};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::domain::{normalize_user_id, Course, Secret, Topic, User, UserPatch};
use crate::error::{Result, StateError};
use crate::exam::ExamCatalog;
use crate::limiter::{identity_key, RateLimiter};
use crate::mail::{ChangeLinkEmail, Mailer};
use crate::repository::{IndexedRepository, Repository};
use crate::store::Stores;
use crate::tasks::{spawn_sweep_task, SweepHandle};
use crate::tokens::{IssuedRequest, TokenCandidate, TokenPurpose, TokenWorkflow};

// == Layer Stats ==
#[derive(Debug, Clone, Serialize)]
pub struct LayerStats {
    pub caches: BTreeMap<&'static str, CacheStats>,
    pub limited_identities: usize,
    pub outstanding_requests: BTreeMap<&'static str, usize>,
}

// == State Layer ==
pub struct StateLayer {
    config: Config,
    clock: SharedClock,
    users: Repository<User>,
    courses: IndexedRepository<Course>,
    topics: Repository<Topic>,
    exams: ExamCatalog,
    limiter: Arc<RateLimiter>,
    password_changes: Arc<TokenWorkflow>,
    account_confirmations: Arc<TokenWorkflow>,
    mailer: Arc<dyn Mailer>,
}

impl StateLayer {
    // == Constructor ==
    /// Fails only when a configured redirect base is not a valid URL.
    pub fn new(
        config: Config,
        stores: Stores,
        clock: SharedClock,
        mailer: Arc<dyn Mailer>,
    ) -> std::result::Result<Self, url::ParseError> {
        let ttl = config.cache_ttl();
        let negative_ttl = config.negative_cache_ttl();

        let password_changes = TokenWorkflow::new(
            TokenPurpose::ChangePassword,
            config.token_policy(&config.change_password_url),
            clock.clone(),
        )?;
        let account_confirmations = TokenWorkflow::new(
            TokenPurpose::ConfirmAccount,
            config.token_policy(&config.confirm_account_url),
            clock.clone(),
        )?;

        let exams = ExamCatalog::new(
            Repository::new(stores.exams, clock.clone(), ttl, negative_ttl),
            Repository::new(stores.questions, clock.clone(), ttl, negative_ttl),
            Repository::new(stores.given_exams, clock.clone(), ttl, negative_ttl),
            Repository::new(stores.given_answers, clock.clone(), ttl, negative_ttl),
            stores.exam_questions,
            clock.clone(),
        );

        Ok(Self {
            users: Repository::new(stores.users, clock.clone(), ttl, negative_ttl),
            courses: IndexedRepository::new(
                stores.courses,
                stores.course_names,
                "course_name",
                clock.clone(),
                ttl,
                negative_ttl,
            ),
            topics: Repository::new(stores.topics, clock.clone(), ttl, negative_ttl),
            exams,
            limiter: Arc::new(RateLimiter::new(
                "request_limiter",
                config.rate_limit_policy(),
                clock.clone(),
            )),
            password_changes: Arc::new(password_changes),
            account_confirmations: Arc::new(account_confirmations),
            mailer,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn users(&self) -> &Repository<User> {
        &self.users
    }

    pub fn courses(&self) -> &IndexedRepository<Course> {
        &self.courses
    }

    pub fn topics(&self) -> &Repository<Topic> {
        &self.topics
    }

    pub fn exams(&self) -> &ExamCatalog {
        &self.exams
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn password_changes(&self) -> &TokenWorkflow {
        &self.password_changes
    }

    pub fn account_confirmations(&self) -> &TokenWorkflow {
        &self.account_confirmations
    }

    // == Rate Limiting ==
    /// Records an attempt by `client` on `route` and reports whether it
    /// must be refused.
    pub fn is_limited(&self, client: &str, route: &str) -> bool {
        self.limiter.is_limited(&identity_key(client, route))
    }

    /// Same as [`is_limited`](Self::is_limited), as an error.
    pub fn check_rate(&self, client: &str, route: &str) -> Result<()> {
        if self.is_limited(client, route) {
            return Err(StateError::RateLimited);
        }
        Ok(())
    }

    // == Sweep ==
    /// Every expiring structure the background sweep walks.
    pub fn sweep_targets(&self) -> Vec<Arc<dyn Sweep>> {
        let mut targets = vec![
            self.users.sweeper(),
            self.topics.sweeper(),
            self.exams.exams().sweeper(),
            self.exams.questions().sweeper(),
            self.exams.given_exams().sweeper(),
            self.exams.given_answers().sweeper(),
        ];
        targets.extend(self.courses.sweepers());

        let limiter: Arc<dyn Sweep> = self.limiter.clone();
        let password_changes: Arc<dyn Sweep> = self.password_changes.clone();
        let account_confirmations: Arc<dyn Sweep> = self.account_confirmations.clone();
        targets.extend([limiter, password_changes, account_confirmations]);
        targets
    }

    /// Starts the periodic sweep; stop it with [`SweepHandle::shutdown`].
    pub fn start_sweeper(&self) -> SweepHandle {
        let interval = self.config.sweep_interval();
        info!(interval_secs = interval.as_secs(), "starting sweep task");
        spawn_sweep_task(self.sweep_targets(), interval)
    }

    // == Stats ==
    pub fn stats(&self) -> LayerStats {
        let mut caches = BTreeMap::new();
        caches.insert(self.users.label(), self.users.stats());
        caches.insert(self.courses.primary().label(), self.courses.stats());
        caches.insert(self.courses.alias_label(), self.courses.alias_stats());
        caches.insert(self.topics.label(), self.topics.stats());
        let exams = &self.exams;
        caches.insert(exams.exams().label(), exams.exams().stats());
        caches.insert(exams.questions().label(), exams.questions().stats());
        caches.insert(exams.given_exams().label(), exams.given_exams().stats());
        caches.insert(exams.given_answers().label(), exams.given_answers().stats());

        let mut outstanding_requests = BTreeMap::new();
        for workflow in [&self.password_changes, &self.account_confirmations] {
            outstanding_requests.insert(workflow.purpose().as_str(), workflow.outstanding());
        }

        LayerStats {
            caches,
            limited_identities: self.limiter.len(),
            outstanding_requests,
        }
    }

    // == Password Change ==
    /// Issues a password-change request for `user_id` and mails the link.
    ///
    /// A mail failure is reported as `Internal`; the issued request stays
    /// valid so the user can retry.
    pub async fn request_password_change(&self, user_id: &str, lang: &str) -> Result<IssuedRequest> {
        let user = self.users.resolve(&normalize_user_id(user_id)).await?;
        let issued = self.password_changes.issue(&user.user_id)?;

        let mail = ChangeLinkEmail {
            recipient: user.email.clone(),
            full_name: user.full_name.clone(),
            link: issued.link.clone(),
            lang: lang.to_string(),
        };
        if let Err(err) = self.mailer.send_change_password_email(&mail).await {
            error!(user_id = %user.user_id, error = %err, "failed to send change password email");
            return Err(StateError::Internal(format!(
                "send change password email to {}: {err}",
                user.user_id
            )));
        }
        Ok(issued)
    }

    /// Redeems a password-change request and stores the new password.
    pub async fn confirm_password_change(
        &self,
        candidate: &TokenCandidate,
        new_password: Secret,
    ) -> Result<Arc<User>> {
        let claim = self.password_changes.claim(candidate)?;
        let user_id = claim.subject().to_string();

        match self
            .users
            .update(&user_id, &UserPatch::Password(new_password))
            .await
        {
            Ok(user) => {
                claim.complete();
                info!(user_id = %user_id, "password changed");
                Ok(user)
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "password change failed, releasing request");
                claim.release();
                Err(err)
            }
        }
    }

    // == Account Confirmation ==
    /// Issues an account-confirmation request and mails the link.
    pub async fn request_account_confirmation(
        &self,
        user_id: &str,
        lang: &str,
    ) -> Result<IssuedRequest> {
        let user = self.users.resolve(&normalize_user_id(user_id)).await?;
        if user.setup_completed {
            return Err(StateError::AlreadyConfirmed);
        }
        let issued = self.account_confirmations.issue(&user.user_id)?;

        let mail = ChangeLinkEmail {
            recipient: user.email.clone(),
            full_name: user.full_name.clone(),
            link: issued.link.clone(),
            lang: lang.to_string(),
        };
        if let Err(err) = self.mailer.send_confirm_account_email(&mail).await {
            error!(user_id = %user.user_id, error = %err, "failed to send confirm account email");
            return Err(StateError::Internal(format!(
                "send confirm account email to {}: {err}",
                user.user_id
            )));
        }
        Ok(issued)
    }

    /// Redeems an account-confirmation request, setting the first password.
    pub async fn confirm_account(
        &self,
        candidate: &TokenCandidate,
        password: Secret,
    ) -> Result<Arc<User>> {
        let claim = self.account_confirmations.claim(candidate)?;
        let user_id = claim.subject().to_string();

        let outcome = match self.users.resolve(&user_id).await {
            Ok(user) if user.setup_completed => {
                claim.complete();
                return Err(StateError::AlreadyConfirmed);
            }
            Ok(_) => {
                self.users
                    .update(&user_id, &UserPatch::ConfirmAccount(password))
                    .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(user) => {
                claim.complete();
                info!(user_id = %user_id, "account confirmed");
                Ok(user)
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "account confirmation failed, releasing request");
                claim.release();
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for StateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLayer")
            .field("users", &self.users)
            .field("courses", &self.courses)
            .field("exams", &self.exams)
            .field("password_changes", &self.password_changes)
            .field("account_confirmations", &self.account_confirmations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use url::Url;

    use crate::clock::ManualClock;
    use crate::domain::{UserDraft, UserRole};
    use crate::mail::{LogMailer, MailError};
    use crate::store::{EntityStore, MemoryBackend};

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_change_password_email(&self, _: &ChangeLinkEmail) -> std::result::Result<(), MailError> {
            Err(MailError::Transport("connection refused".to_string()))
        }

        async fn send_confirm_account_email(&self, _: &ChangeLinkEmail) -> std::result::Result<(), MailError> {
            Err(MailError::Transport("connection refused".to_string()))
        }
    }

    async fn layer_with(mailer: Arc<dyn Mailer>) -> (StateLayer, MemoryBackend) {
        let clock = Arc::new(ManualClock::starting_now());
        let backend = MemoryBackend::new(clock.clone());
        backend
            .users
            .insert(UserDraft {
                user_id: "alice".to_string(),
                full_name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password: Secret::new("initial"),
                role: UserRole::Student,
            })
            .await
            .unwrap();
        let layer = StateLayer::new(Config::default(), backend.stores(), clock, mailer).unwrap();
        (layer, backend)
    }

    fn candidate_from(link: &Url) -> TokenCandidate {
        let param = |name: &str| {
            link.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .unwrap()
        };
        TokenCandidate {
            request_id: param("rq"),
            transfer_param: param("rt"),
            binding: param("lt"),
        }
    }

    #[tokio::test]
    async fn test_mail_failure_is_internal_and_request_survives() {
        let (layer, _) = layer_with(Arc::new(FailingMailer)).await;

        let result = layer.request_password_change("alice", "en").await;

        assert!(matches!(result, Err(StateError::Internal(_))));
        assert_eq!(layer.password_changes().outstanding(), 1);
    }

    #[tokio::test]
    async fn test_failed_password_store_releases_request() {
        let (layer, backend) = layer_with(Arc::new(LogMailer)).await;
        let issued = layer.request_password_change("Alice", "en").await.unwrap();
        let candidate = candidate_from(&issued.link);

        backend.users.fail_next(1);
        let failed = layer
            .confirm_password_change(&candidate, Secret::new("n3w-pass"))
            .await;
        assert!(matches!(failed, Err(StateError::Internal(_))));

        let user = layer
            .confirm_password_change(&candidate, Secret::new("n3w-pass"))
            .await
            .unwrap();
        assert_eq!(user.user_id, "alice");

        let replay = layer
            .confirm_password_change(&candidate, Secret::new("n3w-pass"))
            .await;
        assert!(matches!(replay, Err(StateError::Expired)));
    }

    #[tokio::test]
    async fn test_confirm_account_marks_setup_once() {
        let (layer, backend) = layer_with(Arc::new(LogMailer)).await;
        let issued = layer.request_account_confirmation("alice", "en").await.unwrap();

        let user = layer
            .confirm_account(&candidate_from(&issued.link), Secret::new("first"))
            .await
            .unwrap();

        assert!(user.setup_completed);
        assert!(backend.users.row(&"alice".to_string()).unwrap().setup_completed);
        assert!(matches!(
            layer.request_account_confirmation("alice", "en").await,
            Err(StateError::AlreadyConfirmed)
        ));
    }

    #[tokio::test]
    async fn test_confirm_account_when_already_set_up_consumes_request() {
        let (layer, _) = layer_with(Arc::new(LogMailer)).await;
        let issued = layer.request_account_confirmation("alice", "en").await.unwrap();
        layer
            .users()
            .update(&"alice".to_string(), &UserPatch::ConfirmAccount(Secret::new("first")))
            .await
            .unwrap();

        let candidate = candidate_from(&issued.link);
        let result = layer.confirm_account(&candidate, Secret::new("second")).await;

        assert!(matches!(result, Err(StateError::AlreadyConfirmed)));
        assert!(matches!(
            layer.confirm_account(&candidate, Secret::new("second")).await,
            Err(StateError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_check_rate_is_per_client_and_route() {
        let (layer, _) = layer_with(Arc::new(LogMailer)).await;
        let threshold = layer.config().rate_limit_threshold;

        for _ in 0..threshold {
            layer.check_rate("10.0.0.1", "exam_info").unwrap();
        }
        assert!(matches!(
            layer.check_rate("10.0.0.1", "exam_info"),
            Err(StateError::RateLimited)
        ));
        assert!(layer.check_rate("10.0.0.1", "change_password").is_ok());
        assert!(layer.check_rate("10.0.0.2", "exam_info").is_ok());
        assert_eq!(layer.stats().limited_identities, 3);
    }

    #[tokio::test]
    async fn test_sweep_targets_cover_every_structure() {
        let (layer, _) = layer_with(Arc::new(LogMailer)).await;

        let mut labels: Vec<&str> = layer.sweep_targets().iter().map(|t| t.label()).collect();
        labels.sort_unstable();

        assert_eq!(
            labels,
            vec![
                "change_password",
                "confirm_account",
                "course",
                "course_name",
                "exam",
                "exam_question",
                "given_answer",
                "given_exam",
                "request_limiter",
                "topic",
                "user",
            ]
        );
    }
}
