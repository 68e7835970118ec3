//! Change request records and their verification.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

// == Token Candidate ==
/// What a client presents when redeeming a change request; field names
/// match the redirect link's query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenCandidate {
    #[serde(rename = "rq")]
    pub request_id: String,
    #[serde(rename = "rt")]
    pub transfer_param: String,
    #[serde(rename = "lt")]
    pub binding: String,
}

// == Change Request Entry ==
/// One outstanding change request.
///
/// The numeric token never leaves this struct; clients only ever see the
/// hash binding it with the transfer parameter.
pub struct ChangeRequestEntry {
    pub subject: String,
    pub request_id: String,
    pub transfer_param: String,
    numeric_token: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    attempts: AtomicU32,
}

impl ChangeRequestEntry {
    pub fn new(
        subject: String,
        request_id: String,
        transfer_param: String,
        numeric_token: u64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject,
            request_id,
            transfer_param,
            numeric_token,
            created_at,
            expires_at,
            attempts: AtomicU32::new(0),
        }
    }

    /// Hex SHA-256 of the transfer parameter and the numeric token.
    pub fn binding(&self) -> String {
        binding_of(&self.transfer_param, self.numeric_token)
    }

    /// Redirect link carrying the request id, transfer parameter and binding.
    pub fn redirect_address(&self, base: &Url) -> Url {
        let mut link = base.clone();
        link.query_pairs_mut()
            .append_pair("rq", &self.request_id)
            .append_pair("rt", &self.transfer_param)
            .append_pair("lt", &self.binding());
        link
    }

    // == Verify ==
    /// True only when all three fields match. Every comparison runs to the
    /// end regardless of earlier mismatches.
    pub fn verify(&self, candidate: &TokenCandidate) -> bool {
        let request = self
            .request_id
            .as_bytes()
            .ct_eq(candidate.request_id.as_bytes());
        let transfer = self
            .transfer_param
            .as_bytes()
            .ct_eq(candidate.transfer_param.as_bytes());
        let binding = self
            .binding()
            .as_bytes()
            .ct_eq(candidate.binding.to_ascii_lowercase().as_bytes());
        (request & transfer & binding).into()
    }

    /// Counts a failed verification and returns the new total.
    pub fn record_failure(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn failed_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ChangeRequestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRequestEntry")
            .field("subject", &self.subject)
            .field("request_id", &self.request_id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("attempts", &self.failed_attempts())
            .finish_non_exhaustive()
    }
}

/// Hex SHA-256 of `"{transfer_param}:{numeric_token}"`.
pub fn binding_of(transfer_param: &str, numeric_token: u64) -> String {
    let digest = Sha256::digest(format!("{transfer_param}:{numeric_token}").as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ChangeRequestEntry {
        let now = Utc::now();
        ChangeRequestEntry::new(
            "alice".to_string(),
            "req-1".to_string(),
            "transfer".to_string(),
            4242,
            now,
            now + chrono::TimeDelta::minutes(10),
        )
    }

    fn candidate_for(entry: &ChangeRequestEntry) -> TokenCandidate {
        TokenCandidate {
            request_id: entry.request_id.clone(),
            transfer_param: entry.transfer_param.clone(),
            binding: entry.binding(),
        }
    }

    #[test]
    fn test_binding_is_sha256_hex() {
        let binding = binding_of("transfer", 4242);
        assert_eq!(binding.len(), 64);
        assert!(binding.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(binding, binding_of("transfer", 4243));
    }

    #[test]
    fn test_verify_requires_all_three_fields() {
        let entry = entry();
        let good = candidate_for(&entry);
        assert!(entry.verify(&good));

        let wrong_request = TokenCandidate {
            request_id: "req-2".to_string(),
            ..good.clone()
        };
        let wrong_transfer = TokenCandidate {
            transfer_param: "transfex".to_string(),
            ..good.clone()
        };
        let wrong_binding = TokenCandidate {
            binding: binding_of("transfer", 4243),
            ..good.clone()
        };
        let truncated = TokenCandidate {
            binding: good.binding[..10].to_string(),
            ..good.clone()
        };

        for candidate in [wrong_request, wrong_transfer, wrong_binding, truncated] {
            assert!(!entry.verify(&candidate));
        }
    }

    #[test]
    fn test_binding_accepted_in_upper_case() {
        let entry = entry();
        let mut candidate = candidate_for(&entry);
        candidate.binding = candidate.binding.to_ascii_uppercase();
        assert!(entry.verify(&candidate));
    }

    #[test]
    fn test_redirect_address_never_exposes_numeric_token() {
        let entry = entry();
        let base = Url::parse("https://exams.example/changePassword").unwrap();

        let link = entry.redirect_address(&base);
        let pairs: Vec<(String, String)> = link.query_pairs().into_owned().collect();

        assert_eq!(
            pairs,
            vec![
                ("rq".to_string(), "req-1".to_string()),
                ("rt".to_string(), "transfer".to_string()),
                ("lt".to_string(), entry.binding()),
            ]
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", entry());
        assert!(rendered.contains("req-1"));
        assert!(!rendered.contains("numeric_token"));
        assert!(!rendered.contains("transfer_param"));
    }
}
