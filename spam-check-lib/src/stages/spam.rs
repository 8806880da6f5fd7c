//! Spam check: message ids in, classified messages out.

use super::{reap, wait_all};
use crate::pipeline::Stage;
use crate::services::SpamClassifier;
use crate::types::{ClassifiedMessage, MessageId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Classifies every message in its own task, with at most `max_concurrent`
/// classification calls outstanding.
///
/// A permit is taken before the task is spawned, so the read loop stalls
/// while the throttle is exhausted. The permit is returned as soon as the
/// call completes, successful or not. Failed classifications are dropped.
pub struct SpamCheck {
    classifier: Arc<dyn SpamClassifier>,
    max_concurrent: usize,
}

impl SpamCheck {
    pub fn new(classifier: Arc<dyn SpamClassifier>, max_concurrent: usize) -> Self {
        Self {
            classifier,
            max_concurrent: max_concurrent.max(1),
        }
    }
}

#[async_trait]
impl Stage for SpamCheck {
    type Input = MessageId;
    type Output = ClassifiedMessage;

    fn name(&self) -> &'static str {
        "check_spam"
    }

    async fn run(self, mut input: Receiver<MessageId>, output: Sender<ClassifiedMessage>) {
        let throttle = Arc::new(Semaphore::new(self.max_concurrent));
        let mut checks = JoinSet::new();
        let mut received = 0usize;

        while let Some(id) = input.recv().await {
            received += 1;
            reap(&mut checks);

            let permit = match Arc::clone(&throttle).acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    error!(error = %err, "spam check throttle closed");
                    break;
                }
            };

            let classifier = Arc::clone(&self.classifier);
            let output = output.clone();

            checks.spawn(async move {
                let verdict = classifier.classify(id).await;
                drop(permit);

                match verdict {
                    Ok(has_spam) => {
                        if output.send(ClassifiedMessage { id, has_spam }).await.is_err() {
                            debug!(%id, "downstream closed before verdict could be emitted");
                        }
                    }
                    Err(err) => {
                        warn!(%id, error = %err, "dropping message after failed spam check");
                    }
                }
            });
        }

        wait_all(checks).await;
        info!(received, "spam check finished");
    }
}
