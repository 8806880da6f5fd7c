//! Interfaces of the external collaborators the pipeline calls.
//!
//! The pipeline only depends on these traits. Implementations may be remote
//! and slow; the stages never retry a failed call.

use crate::error::SpamCheckError;
use crate::types::{MessageId, User};
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves an identifier to its canonical user record.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup_user(&self, identifier: &str) -> Result<User, SpamCheckError>;
}

/// Returns the messages belonging to a batch of users.
#[async_trait]
pub trait MessageLookup: Send + Sync {
    async fn lookup_messages(&self, users: &[User]) -> Result<Vec<MessageId>, SpamCheckError>;
}

/// Decides whether a single message is spam.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, id: MessageId) -> Result<bool, SpamCheckError>;
}

/// The set of services one pipeline run talks to.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserLookup>,
    pub messages: Arc<dyn MessageLookup>,
    pub spam: Arc<dyn SpamClassifier>,
}

impl Services {
    pub fn new(
        users: Arc<dyn UserLookup>,
        messages: Arc<dyn MessageLookup>,
        spam: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            users,
            messages,
            spam,
        }
    }

    /// Use one backend for all three services.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserLookup + MessageLookup + SpamClassifier + 'static,
    {
        Self {
            users: backend.clone(),
            messages: backend.clone(),
            spam: backend,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
