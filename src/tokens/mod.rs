//! Token Workflow Module
//!
//! Time-boxed, single-use change requests securing password changes and
//! account confirmations. A request is issued for a subject, delivered as a
//! redirect link, and redeemed by presenting the link's three parameters.

mod entry;

pub use entry::{binding_of, ChangeRequestEntry, TokenCandidate};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::cache::{Sweep, TtlCache};
use crate::clock::{to_delta, SharedClock};
use crate::error::{Result, StateError};
use crate::limiter::{RateLimitPolicy, RateLimiter};

// == Token Purpose ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    ChangePassword,
    ConfirmAccount,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::ChangePassword => "change_password",
            TokenPurpose::ConfirmAccount => "confirm_account",
        }
    }

    fn cache_labels(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            TokenPurpose::ChangePassword => (
                "change_password_requests",
                "change_password_subjects",
                "change_password_issue",
            ),
            TokenPurpose::ConfirmAccount => (
                "confirm_account_requests",
                "confirm_account_subjects",
                "confirm_account_issue",
            ),
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Token Policy ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Redirect base the link is built on
    pub base_url: String,
    /// Validity of an issued request
    pub ttl: Duration,
    /// Failed verifications before the request is burned
    pub max_verify_attempts: u32,
    /// Per-subject cap on issuance
    pub issue_limit: RateLimitPolicy,
}

// == Issued Request ==
/// What the caller needs to notify the subject.
#[derive(Debug, Clone)]
pub struct IssuedRequest {
    pub entry: Arc<ChangeRequestEntry>,
    pub link: Url,
}

// == Token Workflow ==
pub struct TokenWorkflow {
    purpose: TokenPurpose,
    policy: TokenPolicy,
    base_url: Url,
    clock: SharedClock,
    /// Outstanding requests by request id
    requests: TtlCache<String, Arc<ChangeRequestEntry>>,
    /// Latest request id per subject
    subjects: TtlCache<String, String>,
    issue_limiter: RateLimiter,
    sequence: AtomicU64,
}

impl TokenWorkflow {
    // == Constructor ==
    /// Fails when the policy's base URL does not parse.
    pub fn new(
        purpose: TokenPurpose,
        policy: TokenPolicy,
        clock: SharedClock,
    ) -> std::result::Result<Self, url::ParseError> {
        let base_url = Url::parse(&policy.base_url)?;
        let (requests_label, subjects_label, issue_label) = purpose.cache_labels();
        let seed = rand::thread_rng().gen_range(100_000..10_000_000);

        Ok(Self {
            purpose,
            base_url,
            requests: TtlCache::new(requests_label, clock.clone(), policy.ttl, policy.ttl),
            subjects: TtlCache::new(subjects_label, clock.clone(), policy.ttl, policy.ttl),
            issue_limiter: RateLimiter::new(issue_label, policy.issue_limit.clone(), clock.clone()),
            sequence: AtomicU64::new(seed),
            clock,
            policy,
        })
    }

    pub fn purpose(&self) -> TokenPurpose {
        self.purpose
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    // == Issue ==
    /// Creates a new request for `subject`, superseding its previous one.
    ///
    /// Fails with `RateLimited` once the subject has issued too many
    /// requests inside the issue window.
    pub fn issue(&self, subject: &str) -> Result<IssuedRequest> {
        if self.issue_limiter.is_limited(subject) {
            warn!(purpose = %self.purpose, subject, "change request issuance limited");
            return Err(StateError::RateLimited);
        }

        let now = self.clock.now();
        let mut transfer = [0u8; 16];
        rand::thread_rng().fill(&mut transfer);

        let entry = Arc::new(ChangeRequestEntry::new(
            subject.to_string(),
            Uuid::new_v4().simple().to_string(),
            hex::encode(transfer),
            self.sequence.fetch_add(1, Ordering::SeqCst),
            now,
            now + to_delta(self.policy.ttl),
        ));

        self.requests
            .add(entry.request_id.clone(), Arc::clone(&entry));
        let mut superseded = None;
        self.subjects.replace_with(subject.to_string(), |previous| {
            superseded = previous.cloned();
            entry.request_id.clone()
        });
        if let Some(previous) = superseded {
            self.requests.delete(&previous);
            debug!(purpose = %self.purpose, subject, "superseded previous change request");
        }

        info!(purpose = %self.purpose, subject, request_id = %entry.request_id, "issued change request");
        let link = entry.redirect_address(&self.base_url);
        Ok(IssuedRequest { entry, link })
    }

    // == Lookup ==
    /// Outstanding request under `request_id`; `Expired` once it is gone.
    pub fn lookup(&self, request_id: &str) -> Result<Arc<ChangeRequestEntry>> {
        self.requests
            .get(&request_id.to_string())
            .found()
            .ok_or(StateError::Expired)
    }

    // == Claim ==
    /// Verifies `candidate` and takes its request out of circulation.
    ///
    /// Only one concurrent claim of a request can succeed. A failed
    /// verification counts against the request, which is dropped after too
    /// many failures. All mismatches are reported as `Invalid`.
    pub fn claim(&self, candidate: &TokenCandidate) -> Result<ClaimedRequest<'_>> {
        let entry = self.lookup(&candidate.request_id)?;

        if !entry.verify(candidate) {
            let failures = entry.record_failure();
            warn!(purpose = %self.purpose, request_id = %entry.request_id, failures, "change request verification failed");
            if failures >= self.policy.max_verify_attempts {
                self.requests
                    .delete_if(&entry.request_id, |cached| Arc::ptr_eq(cached, &entry));
                self.forget_subject(&entry);
                info!(purpose = %self.purpose, request_id = %entry.request_id, "change request burned");
            }
            return Err(StateError::Invalid);
        }

        let entry = self
            .requests
            .delete_if(&entry.request_id, |cached| Arc::ptr_eq(cached, &entry))
            .ok_or(StateError::Expired)?;
        debug!(purpose = %self.purpose, request_id = %entry.request_id, "change request claimed");
        Ok(ClaimedRequest {
            workflow: self,
            entry,
        })
    }

    /// Number of live or not yet swept requests.
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }

    fn forget_subject(&self, entry: &ChangeRequestEntry) {
        self.subjects
            .delete_if(&entry.subject, |latest| *latest == entry.request_id);
    }

    fn restore(&self, entry: Arc<ChangeRequestEntry>) {
        let still_latest = self
            .subjects
            .get(&entry.subject)
            .found()
            .is_some_and(|latest| latest == entry.request_id);
        if !still_latest {
            debug!(purpose = %self.purpose, request_id = %entry.request_id, "released request was superseded");
            return;
        }
        let request_id = entry.request_id.clone();
        let expires_at = entry.expires_at;
        if self.requests.add_until(request_id, entry, expires_at) {
            debug!(purpose = %self.purpose, "released change request");
        }
    }
}

impl Sweep for TokenWorkflow {
    fn label(&self) -> &'static str {
        self.purpose.as_str()
    }

    fn sweep_expired(&self) -> usize {
        self.requests.cleanup_expired()
            + self.subjects.cleanup_expired()
            + self.issue_limiter.sweep_expired()
    }
}

impl fmt::Debug for TokenWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenWorkflow")
            .field("purpose", &self.purpose)
            .field("outstanding", &self.requests.len())
            .finish_non_exhaustive()
    }
}

// == Claimed Request ==
/// A verified request removed from circulation while its side effect runs.
///
/// Call [`complete`](Self::complete) once the side effect succeeded or
/// [`release`](Self::release) to make the request redeemable again.
/// Dropping a claim without either consumes the request.
#[derive(Debug)]
pub struct ClaimedRequest<'a> {
    workflow: &'a TokenWorkflow,
    entry: Arc<ChangeRequestEntry>,
}

impl ClaimedRequest<'_> {
    pub fn subject(&self) -> &str {
        &self.entry.subject
    }

    pub fn entry(&self) -> &ChangeRequestEntry {
        &self.entry
    }

    /// Finishes the request; it can never be redeemed again.
    pub fn complete(self) {
        self.workflow.forget_subject(&self.entry);
        info!(purpose = %self.workflow.purpose, request_id = %self.entry.request_id, "change request consumed");
    }

    /// Puts the request back until its original expiry, unless the subject
    /// has been issued a newer one meanwhile.
    pub fn release(self) {
        self.workflow.restore(self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn policy() -> TokenPolicy {
        TokenPolicy {
            base_url: "https://exams.example/changePassword".to_string(),
            ttl: Duration::from_secs(600),
            max_verify_attempts: 3,
            issue_limit: RateLimitPolicy {
                threshold: 2,
                reset_window: Duration::from_secs(3600),
                punishment: Duration::from_secs(3600),
                entry_ttl: Duration::from_secs(3600),
            },
        }
    }

    fn workflow() -> (TokenWorkflow, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let workflow =
            TokenWorkflow::new(TokenPurpose::ChangePassword, policy(), clock.clone()).unwrap();
        (workflow, clock)
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

    #[test]
    fn test_issue_then_claim_is_single_use() {
        let (workflow, _) = workflow();
        let issued = workflow.issue("alice").unwrap();
        let candidate = candidate_from(&issued.link);

        let claim = workflow.claim(&candidate).unwrap();
        assert_eq!(claim.subject(), "alice");
        claim.complete();

        assert!(matches!(workflow.claim(&candidate), Err(StateError::Expired)));
    }

    #[test]
    fn test_any_mismatch_is_invalid() {
        let (workflow, _) = workflow();
        let issued = workflow.issue("alice").unwrap();
        let good = candidate_from(&issued.link);

        let tampered = TokenCandidate {
            transfer_param: "00".repeat(16),
            ..good.clone()
        };
        assert!(matches!(workflow.claim(&tampered), Err(StateError::Invalid)));

        let forged = TokenCandidate {
            binding: binding_of(&good.transfer_param, 1),
            ..good.clone()
        };
        assert!(matches!(workflow.claim(&forged), Err(StateError::Invalid)));

        assert!(workflow.claim(&good).is_ok());
    }

    #[test]
    fn test_unknown_request_is_expired() {
        let (workflow, _) = workflow();
        let candidate = TokenCandidate {
            request_id: "nope".to_string(),
            transfer_param: "x".to_string(),
            binding: "y".to_string(),
        };
        assert!(matches!(workflow.claim(&candidate), Err(StateError::Expired)));
    }

    #[test]
    fn test_request_expires_after_ttl() {
        let (workflow, clock) = workflow();
        let issued = workflow.issue("alice").unwrap();

        clock.advance(Duration::from_secs(600));

        assert!(matches!(
            workflow.lookup(&issued.entry.request_id),
            Err(StateError::Expired)
        ));
        assert!(matches!(
            workflow.claim(&candidate_from(&issued.link)),
            Err(StateError::Expired)
        ));
    }

    #[test]
    fn test_request_burned_after_max_failures() {
        let (workflow, _) = workflow();
        let issued = workflow.issue("alice").unwrap();
        let good = candidate_from(&issued.link);
        let bad = TokenCandidate {
            binding: "0".repeat(64),
            ..good.clone()
        };

        for _ in 0..3 {
            assert!(matches!(workflow.claim(&bad), Err(StateError::Invalid)));
        }
        assert!(matches!(workflow.claim(&good), Err(StateError::Expired)));
    }

    #[test]
    fn test_new_issue_supersedes_previous() {
        let (workflow, _) = workflow();
        let first = workflow.issue("alice").unwrap();
        let second = workflow.issue("alice").unwrap();

        assert!(matches!(
            workflow.lookup(&first.entry.request_id),
            Err(StateError::Expired)
        ));
        assert!(workflow.lookup(&second.entry.request_id).is_ok());
        assert_ne!(first.entry.binding(), second.entry.binding());
    }

    #[test]
    fn test_issue_is_rate_limited_per_subject() {
        let (workflow, _) = workflow();
        workflow.issue("alice").unwrap();
        workflow.issue("alice").unwrap();

        assert!(matches!(workflow.issue("alice"), Err(StateError::RateLimited)));
        assert!(workflow.issue("bob").is_ok());
    }

    #[test]
    fn test_released_claim_is_redeemable_until_original_expiry() {
        let (workflow, clock) = workflow();
        let issued = workflow.issue("alice").unwrap();
        let candidate = candidate_from(&issued.link);

        clock.advance(Duration::from_secs(300));
        workflow.claim(&candidate).unwrap().release();
        assert!(workflow.lookup(&candidate.request_id).is_ok());

        clock.advance(Duration::from_secs(300));
        assert!(matches!(
            workflow.lookup(&candidate.request_id),
            Err(StateError::Expired)
        ));
    }

    #[test]
    fn test_release_after_supersede_is_dropped() {
        let (workflow, _) = workflow();
        let first = workflow.issue("alice").unwrap();
        let claim = workflow.claim(&candidate_from(&first.link)).unwrap();

        workflow.issue("alice").unwrap();
        claim.release();

        assert!(workflow.lookup(&first.entry.request_id).is_err());
    }

    #[test]
    fn test_concurrent_claims_only_one_wins() {
        let (workflow, _) = workflow();
        let workflow = Arc::new(workflow);
        let candidate = candidate_from(&workflow.issue("alice").unwrap().link);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let workflow = workflow.clone();
                let candidate = candidate.clone();
                std::thread::spawn(move || match workflow.claim(&candidate) {
                    Ok(claim) => {
                        claim.complete();
                        true
                    }
                    Err(_) => false,
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let (workflow, _) = workflow();
        let a = workflow.sequence.load(Ordering::SeqCst);
        workflow.issue("alice").unwrap();
        workflow.issue("bob").unwrap();
        assert_eq!(workflow.sequence.load(Ordering::SeqCst), a + 2);
    }
}
