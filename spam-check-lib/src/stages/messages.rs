//! Message selection: users in, message ids out.

use super::{reap, wait_all};
use crate::pipeline::Stage;
use crate::services::MessageLookup;
use crate::types::{MessageId, User};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Groups users into batches and fetches each batch's messages in its own task.
///
/// A full batch is dispatched as soon as it fills up; a trailing partial
/// batch is dispatched once the input closes. A failed fetch drops that
/// batch's messages.
pub struct MessageSelection {
    messages: Arc<dyn MessageLookup>,
    batch_size: usize,
}

impl MessageSelection {
    pub fn new(messages: Arc<dyn MessageLookup>, batch_size: usize) -> Self {
        Self {
            messages,
            batch_size: batch_size.max(1),
        }
    }
}

async fn fetch_batch(messages: Arc<dyn MessageLookup>, batch: Vec<User>, output: Sender<MessageId>) {
    let ids = match messages.lookup_messages(&batch).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(batch_size = batch.len(), error = %err, "dropping message batch");
            return;
        }
    };

    debug!(batch_size = batch.len(), messages = ids.len(), "batch fetched");

    for id in ids {
        if output.send(id).await.is_err() {
            debug!("downstream closed, abandoning batch");
            return;
        }
    }
}

#[async_trait]
impl Stage for MessageSelection {
    type Input = User;
    type Output = MessageId;

    fn name(&self) -> &'static str {
        "select_messages"
    }

    async fn run(self, mut input: Receiver<User>, output: Sender<MessageId>) {
        let mut fetches = JoinSet::new();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut dispatched = 0usize;

        while let Some(user) = input.recv().await {
            reap(&mut fetches);
            batch.push(user);

            if batch.len() == self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                fetches.spawn(fetch_batch(Arc::clone(&self.messages), full, output.clone()));
                dispatched += 1;
            }
        }

        if !batch.is_empty() {
            fetches.spawn(fetch_batch(Arc::clone(&self.messages), batch, output.clone()));
            dispatched += 1;
        }

        wait_all(fetches).await;
        info!(batches = dispatched, "message selection finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpamCheckError;
    use crate::pipeline::Pipeline;
    use std::sync::Mutex;

    /// Each user "uN@x" owns messages N*10 and N*10+1; records batch sizes.
    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<usize>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl MessageLookup for Recorder {
        async fn lookup_messages(&self, users: &[User]) -> Result<Vec<MessageId>, SpamCheckError> {
            self.batches.lock().unwrap().push(users.len());
            if let Some(email) = &self.fail_with {
                if users.iter().any(|u| &u.email == email) {
                    return Err(SpamCheckError::message_lookup(users.len(), "backend down"));
                }
            }
            Ok(users
                .iter()
                .flat_map(|u| {
                    let n: u64 = u.email[1..u.email.find('@').unwrap()].parse().unwrap();
                    [MessageId(n * 10), MessageId(n * 10 + 1)]
                })
                .collect())
        }
    }

    async fn run_with(recorder: Arc<Recorder>, users: usize, batch_size: usize) -> Vec<u64> {
        let users: Vec<User> = (1..=users).map(|n| User::new(format!("u{}@x", n))).collect();
        let mut ids: Vec<u64> = Pipeline::from_items(users)
            .stage(MessageSelection::new(recorder, batch_size))
            .collect()
            .await
            .into_iter()
            .map(|id| id.0)
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_partial_trailing_batch() {
        let recorder = Arc::new(Recorder::default());
        let ids = run_with(recorder.clone(), 5, 2).await;

        let mut batches = recorder.batches.lock().unwrap().clone();
        batches.sort();
        assert_eq!(batches, vec![1, 2, 2]);
        assert_eq!(ids, vec![10, 11, 20, 21, 30, 31, 40, 41, 50, 51]);
    }

    #[tokio::test]
    async fn test_exact_batch_has_no_trailing_call() {
        let recorder = Arc::new(Recorder::default());
        run_with(recorder.clone(), 3, 3).await;
        assert_eq!(*recorder.batches.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_no_users_no_calls() {
        let recorder = Arc::new(Recorder::default());
        let ids = run_with(recorder.clone(), 0, 2).await;
        assert!(ids.is_empty());
        assert!(recorder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_dropped() {
        let recorder = Arc::new(Recorder {
            fail_with: Some("u1@x".to_string()),
            ..Default::default()
        });
        // Batches arrive in input order here: [u1, u2] fails, [u3] succeeds.
        let ids = run_with(recorder, 3, 2).await;
        assert_eq!(ids, vec![30, 31]);
    }
}
