//! Result combination: the barrier that turns verdicts into report lines.

use crate::pipeline::Stage;
use crate::types::ClassifiedMessage;
use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info};

/// Collects every classified message, sorts them and emits one line each.
///
/// Nothing is emitted until the input closes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombineResults;

/// Sort spam first, then by ascending message id.
pub fn sort_report(results: &mut [ClassifiedMessage]) {
    results.sort_by(|a, b| b.has_spam.cmp(&a.has_spam).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl Stage for CombineResults {
    type Input = ClassifiedMessage;
    type Output = String;

    fn name(&self) -> &'static str {
        "combine_results"
    }

    async fn run(self, mut input: Receiver<ClassifiedMessage>, output: Sender<String>) {
        let mut results = Vec::new();
        while let Some(result) = input.recv().await {
            results.push(result);
        }

        sort_report(&mut results);
        info!(lines = results.len(), "emitting report");

        for result in results {
            if output.send(result.to_string()).await.is_err() {
                debug!("report consumer went away");
                return;
            }
        }
    }
}
