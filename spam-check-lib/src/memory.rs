//! In-memory implementation of all three external services.
//!
//! The directory is driven by a JSON fixture and behaves like the services
//! the pipeline was written against: user lookups canonicalise identifiers,
//! the message service rejects oversized batches and the spam classifier
//! rejects callers that exceed its concurrency limit. Every call is
//! recorded so tests can inspect how the pipeline used the services.

use crate::error::SpamCheckError;
use crate::services::{MessageLookup, SpamClassifier, UserLookup};
use crate::types::{MessageId, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Fixture describing users, their messages and spam verdicts.
///
/// ```json
/// {
///   "messages": { "alice@example.com": [1, 2], "bob@example.com": [3] },
///   "spam": [2],
///   "failing": [3],
///   "unknown_users": ["ghost@example.com"],
///   "latency_ms": 10
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryFixture {
    /// Message ids owned by each canonical email
    #[serde(default)]
    pub messages: HashMap<String, Vec<u64>>,

    /// Message ids classified as spam
    #[serde(default)]
    pub spam: HashSet<u64>,

    /// Message ids the classifier fails on
    #[serde(default)]
    pub failing: HashSet<u64>,

    /// Identifiers the user lookup fails on
    #[serde(default)]
    pub unknown_users: HashSet<String>,

    /// Simulated latency of every service call, in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

/// Snapshot of how the services were called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub user_lookups: usize,
    /// Size of every message lookup batch, in call order
    pub batch_sizes: Vec<usize>,
    pub classifications: usize,
    /// Highest number of classification calls seen in flight at once
    pub peak_concurrent_checks: usize,
}

/// Fixture-backed user, message and spam services.
#[derive(Debug)]
pub struct InMemoryDirectory {
    fixture: DirectoryFixture,
    batch_limit: Option<usize>,
    check_limit: Option<usize>,
    latency: Duration,
    user_lookups: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    classifications: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the in-flight counter when a classification ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryDirectory {
    /// Create a directory from a fixture. Message owners and unknown users
    /// are canonicalised.
    pub fn new(fixture: DirectoryFixture) -> Self {
        let mut fixture = fixture;
        fixture.messages = fixture
            .messages
            .into_iter()
            .map(|(email, ids)| (canonical_email(&email), ids))
            .collect();
        fixture.unknown_users = fixture
            .unknown_users
            .iter()
            .map(|email| canonical_email(email))
            .collect();
        let latency = Duration::from_millis(fixture.latency_ms);

        Self {
            fixture,
            batch_limit: None,
            check_limit: None,
            latency,
            user_lookups: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            classifications: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Parse a JSON fixture.
    pub fn from_json(json: &str) -> Result<Self, SpamCheckError> {
        let fixture: DirectoryFixture = serde_json::from_str(json)?;
        Ok(Self::new(fixture))
    }

    /// Load a JSON fixture from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SpamCheckError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SpamCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read directory fixture: {}", e),
            )
        })?;
        Self::from_json(&content)
    }

    /// Reject message lookups with more users than `limit`.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Reject classifications beyond `limit` concurrent calls.
    pub fn with_check_limit(mut self, limit: usize) -> Self {
        self.check_limit = Some(limit);
        self
    }

    /// Override the fixture latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// How the services have been called so far.
    pub fn stats(&self) -> CallStats {
        CallStats {
            user_lookups: self.user_lookups.load(Ordering::SeqCst),
            batch_sizes: self
                .batch_sizes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            classifications: self.classifications.load(Ordering::SeqCst),
            peak_concurrent_checks: self.peak.load(Ordering::SeqCst),
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// Canonical form of an email: trimmed and lowercased.
fn canonical_email(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[async_trait]
impl UserLookup for InMemoryDirectory {
    async fn lookup_user(&self, identifier: &str) -> Result<User, SpamCheckError> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let email = canonical_email(identifier);
        if email.is_empty() {
            return Err(SpamCheckError::invalid_identifier(
                identifier,
                "Identifier cannot be empty",
            ));
        }
        if self.fixture.unknown_users.contains(&email) {
            return Err(SpamCheckError::user_lookup(identifier, "no such user"));
        }

        Ok(User { email })
    }
}

#[async_trait]
impl MessageLookup for InMemoryDirectory {
    async fn lookup_messages(&self, users: &[User]) -> Result<Vec<MessageId>, SpamCheckError> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(users.len());

        if let Some(limit) = self.batch_limit {
            if users.len() > limit {
                return Err(SpamCheckError::BatchTooLarge {
                    size: users.len(),
                    limit,
                });
            }
        }

        self.simulate_latency().await;

        Ok(users
            .iter()
            .filter_map(|user| self.fixture.messages.get(&user.email))
            .flatten()
            .map(|&id| MessageId(id))
            .collect())
    }
}

#[async_trait]
impl SpamClassifier for InMemoryDirectory {
    async fn classify(&self, id: MessageId) -> Result<bool, SpamCheckError> {
        self.classifications.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(current, Ordering::SeqCst);

        if let Some(limit) = self.check_limit {
            if current > limit {
                return Err(SpamCheckError::rate_limited("spam classifier", limit));
            }
        }

        self.simulate_latency().await;

        if self.fixture.failing.contains(&id.0) {
            return Err(SpamCheckError::classification(id.0, "classifier error"));
        }
        Ok(self.fixture.spam.contains(&id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FIXTURE: &str = r#"{
        "messages": { "Alice@Example.com": [1, 2], "bob@example.com": [3] },
        "spam": [2],
        "failing": [3],
        "unknown_users": ["ghost@example.com"]
    }"#;

    #[tokio::test]
    async fn test_user_lookup_canonicalises() {
        let directory = InMemoryDirectory::from_json(FIXTURE).unwrap();
        let user = directory.lookup_user("  ALICE@example.com ").await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(directory.lookup_user("ghost@example.com").await.is_err());
        assert_eq!(directory.stats().user_lookups, 2);
    }

    #[tokio::test]
    async fn test_unknown_users_match_any_case() {
        let directory =
            InMemoryDirectory::from_json(r#"{ "unknown_users": [" Ghost@Example.COM"] }"#).unwrap();
        assert!(matches!(
            directory.lookup_user("ghost@example.com").await,
            Err(SpamCheckError::UserLookup { .. })
        ));
        assert!(directory.lookup_user("GHOST@example.com ").await.is_err());
    }

    #[tokio::test]
    async fn test_message_lookup_and_batch_limit() {
        let directory = InMemoryDirectory::from_json(FIXTURE)
            .unwrap()
            .with_batch_limit(2);
        let users = vec![User::new("alice@example.com"), User::new("bob@example.com")];

        let mut ids = directory.lookup_messages(&users).await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![MessageId(1), MessageId(2), MessageId(3)]);

        let too_many = vec![users[0].clone(), users[1].clone(), User::new("c@example.com")];
        assert!(matches!(
            directory.lookup_messages(&too_many).await,
            Err(SpamCheckError::BatchTooLarge { size: 3, limit: 2 })
        ));
        assert_eq!(directory.stats().batch_sizes, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_classify_verdicts() {
        let directory = InMemoryDirectory::from_json(FIXTURE).unwrap();
        assert!(!directory.classify(MessageId(1)).await.unwrap());
        assert!(directory.classify(MessageId(2)).await.unwrap());
        assert!(directory.classify(MessageId(3)).await.is_err());

        let stats = directory.stats();
        assert_eq!(stats.classifications, 3);
        assert_eq!(stats.peak_concurrent_checks, 1);
    }

    #[test]
    fn test_load_fixture_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FIXTURE.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let directory = InMemoryDirectory::from_file(temp_file.path()).unwrap();
        assert!(directory.fixture.messages.contains_key("alice@example.com"));
        assert!(InMemoryDirectory::from_file("/nonexistent/fixture.json").is_err());
        assert!(InMemoryDirectory::from_json("not json").is_err());
    }
}
