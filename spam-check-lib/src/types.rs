//! Core data types for the spam report pipeline.
//!
//! This module defines the payloads that flow between stages, the immutable
//! alias table and the pipeline configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque token naming a user, usually an email address.
pub type Identifier = String;

/// Canonical user record returned by the user lookup service.
///
/// Only the canonical email takes part in equality and deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Canonical email of the user
    pub email: String,
}

impl User {
    pub fn new<E: Into<String>>(email: E) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Identifier of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A message together with its spam verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedMessage {
    /// The classified message
    pub id: MessageId,

    /// Whether the classifier flagged the message as spam
    pub has_spam: bool,
}

impl ClassifiedMessage {
    pub fn new<I: Into<MessageId>>(id: I, has_spam: bool) -> Self {
        Self {
            id: id.into(),
            has_spam,
        }
    }
}

/// Report line format: `"<has_spam> <id>"`, e.g. `true 2`.
impl fmt::Display for ClassifiedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.has_spam, self.id)
    }
}

/// Maps a canonical email to the identifier that should be used instead.
///
/// The table is read-only once built and is shared by every lookup task of
/// the user selection stage. Resolution is a single hop: chains like
/// `a -> b -> c` resolve `a` to `b` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    entries: HashMap<String, Identifier>,
}

impl AliasTable {
    /// Create an empty alias table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alternate identifier for a canonical email, if one is configured.
    pub fn alias_of(&self, email: &str) -> Option<&str> {
        self.entries.get(email).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for AliasTable {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        self.entries
            .extend(iter.into_iter().map(|(from, to)| (from.into(), to.into())));
    }
}

impl From<HashMap<String, Identifier>> for AliasTable {
    fn from(entries: HashMap<String, Identifier>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AliasTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }
}

/// Upper bound for both pipeline limits.
pub const MAX_LIMIT: usize = 1000;

/// Configuration options for a pipeline run.
///
/// Both values are constants for the duration of a run; they are read once
/// when the stages are constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of users handed to one message lookup call
    /// Default: 2, Range: 1-1000
    pub message_batch_size: usize,

    /// Maximum number of spam classification calls in flight at once
    /// Default: 5, Range: 1-1000
    pub max_concurrent_checks: usize,

    /// Alias table consulted by the user selection stage
    #[serde(default)]
    pub aliases: AliasTable,
}

impl Default for PipelineConfig {
    /// These match the limits the reference message and spam services enforce.
    fn default() -> Self {
        Self {
            message_batch_size: 2,
            max_concurrent_checks: 5,
            aliases: AliasTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Set the message lookup batch size, clamped to 1-1000.
    pub fn with_message_batch_size(mut self, size: usize) -> Self {
        self.message_batch_size = size.clamp(1, MAX_LIMIT);
        self
    }

    /// Set the spam classification concurrency ceiling, clamped to 1-1000.
    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max.clamp(1, MAX_LIMIT);
        self
    }

    /// Replace the alias table.
    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_line_format() {
        assert_eq!(ClassifiedMessage::new(2, true).to_string(), "true 2");
        assert_eq!(ClassifiedMessage::new(10, false).to_string(), "false 10");
    }

    #[test]
    fn test_alias_lookup_is_single_hop() {
        let aliases: AliasTable = [("a@x", "b@x"), ("b@x", "c@x")].into_iter().collect();
        assert_eq!(aliases.alias_of("a@x"), Some("b@x"));
        assert_eq!(aliases.alias_of("c@x"), None);
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn test_alias_extend_overrides() {
        let mut aliases: AliasTable = [("a@x", "b@x")].into_iter().collect();
        aliases.extend([("a@x", "z@x"), ("c@x", "d@x")]);
        assert_eq!(aliases.alias_of("a@x"), Some("z@x"));
        assert_eq!(aliases.alias_of("c@x"), Some("d@x"));
    }

    #[test]
    fn test_config_builders_clamp() {
        let config = PipelineConfig::default()
            .with_message_batch_size(0)
            .with_max_concurrent_checks(5000);
        assert_eq!(config.message_batch_size, 1);
        assert_eq!(config.max_concurrent_checks, MAX_LIMIT);
    }
}
