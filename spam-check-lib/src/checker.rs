//! Main spam checker implementation.
//!
//! This module provides the `SpamChecker` struct that wires the four standard
//! stages into a pipeline and runs it against a set of services.

use crate::pipeline::Pipeline;
use crate::services::Services;
use crate::stages::{sort_report, CombineResults, MessageSelection, SpamCheck, UserSelection};
use crate::types::{AliasTable, ClassifiedMessage, Identifier, PipelineConfig};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::info;

/// Builds spam reports from user identifiers.
///
/// # Example
///
/// ```rust,no_run
/// use spam_check_lib::{InMemoryDirectory, Services, SpamChecker};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let directory = Arc::new(InMemoryDirectory::from_file("directory.json")?);
///     let checker = SpamChecker::new(Services::from_backend(directory));
///
///     let lines = checker.report(vec!["alice@example.com".to_string()]).await;
///     for line in lines {
///         println!("{}", line);
///     }
///     Ok(())
/// }
/// ```
pub struct SpamChecker {
    /// Limits and aliases for every run
    config: PipelineConfig,
    /// Shared, read-only alias table handed to the user selection stage
    aliases: Arc<AliasTable>,
    /// External collaborators
    services: Services,
}

impl SpamChecker {
    /// Create a checker with the default configuration.
    ///
    /// Default settings:
    /// - Message batch size: 2
    /// - Concurrent spam checks: 5
    /// - No aliases
    pub fn new(services: Services) -> Self {
        Self::with_config(PipelineConfig::default(), services)
    }

    /// Create a checker with a custom configuration.
    pub fn with_config(config: PipelineConfig, services: Services) -> Self {
        let aliases = Arc::new(config.aliases.clone());
        Self {
            config,
            aliases,
            services,
        }
    }

    /// Get the configuration of this checker.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Append the user, message and spam stages to `source`.
    fn classified(&self, source: Pipeline<Identifier>) -> Pipeline<ClassifiedMessage> {
        source
            .stage(UserSelection::new(
                Arc::clone(&self.services.users),
                Arc::clone(&self.aliases),
            ))
            .stage(MessageSelection::new(
                Arc::clone(&self.services.messages),
                self.config.message_batch_size,
            ))
            .stage(SpamCheck::new(
                Arc::clone(&self.services.spam),
                self.config.max_concurrent_checks,
            ))
    }

    /// Run the full pipeline and return the report lines.
    ///
    /// Lines look like `true 2` and are sorted spam first, then by message
    /// id. Items that fail anywhere along the way are missing from the
    /// report; the failures are only visible in the logs.
    pub async fn report<I>(&self, identifiers: I) -> Vec<String>
    where
        I: IntoIterator<Item = Identifier> + Send + 'static,
        I::IntoIter: Send + 'static,
    {
        self.report_from(Pipeline::from_items(identifiers)).await
    }

    /// Like [`SpamChecker::report`], reading identifiers from a conduit.
    pub async fn report_from_receiver(&self, identifiers: Receiver<Identifier>) -> Vec<String> {
        self.report_from(Pipeline::from_receiver(identifiers)).await
    }

    async fn report_from(&self, source: Pipeline<Identifier>) -> Vec<String> {
        let lines = self.classified(source).stage(CombineResults).collect().await;
        info!(lines = lines.len(), "spam report complete");
        lines
    }

    /// Run the pipeline and return the sorted verdicts without formatting.
    pub async fn classify<I>(&self, identifiers: I) -> Vec<ClassifiedMessage>
    where
        I: IntoIterator<Item = Identifier> + Send + 'static,
        I::IntoIter: Send + 'static,
    {
        let mut results = self
            .classified(Pipeline::from_items(identifiers))
            .collect()
            .await;
        sort_report(&mut results);
        results
    }
}
