//! The four stages of the spam report pipeline.
//!
//! Identifiers flow through them strictly in this order:
//! user selection, message selection, spam check, result combination.

/// Deduplicating, alias-resolving user lookup
pub mod users;

/// Batched message lookup
pub mod messages;

/// Throttled spam classification
pub mod spam;

/// Sorting barrier that formats the report
pub mod combine;

pub use combine::{sort_report, CombineResults};
pub use messages::MessageSelection;
pub use spam::SpamCheck;
pub use users::UserSelection;

use tokio::task::JoinSet;
use tracing::error;

/// Drop tasks that have already finished so the set only holds live work.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(err) = joined {
            error!(error = %err, "fan-out task failed");
        }
    }
}

/// Wait for every task a stage fanned out.
async fn wait_all(mut tasks: JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "fan-out task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reap_drops_finished_tasks() {
        let mut tasks = JoinSet::new();
        for _ in 0..10 {
            tasks.spawn(async {});
        }
        tasks.spawn(async { panic!("fan-out task panicked") });
        tasks.spawn(tokio::time::sleep(Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        reap(&mut tasks);

        assert_eq!(tasks.len(), 1);
        tasks.abort_all();
    }
}
