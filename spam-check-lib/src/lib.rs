//! # Spam Check Library
//!
//! A concurrent pipeline that turns a stream of user identifiers into a
//! deduplicated, spam-annotated, sorted report.
//!
//! The pipeline has four stages connected by single-slot conduits:
//!
//! 1. **User selection** looks up every identifier concurrently, follows one
//!    alias hop and emits each canonical user once.
//! 2. **Message selection** batches users and fetches each batch's messages
//!    in its own task.
//! 3. **Spam check** classifies messages with a bounded number of calls in
//!    flight.
//! 4. **Result combination** waits for every verdict, sorts spam first and
//!    then by message id, and emits `"<has_spam> <id>"` lines.
//!
//! Failures of the external services are logged and the affected item is
//! dropped; the pipeline itself never fails.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spam_check_lib::{InMemoryDirectory, PipelineConfig, Services, SpamChecker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryDirectory::from_file("directory.json")?);
//!     let config = PipelineConfig::default().with_max_concurrent_checks(3);
//!     let checker = SpamChecker::with_config(config, Services::from_backend(directory));
//!
//!     for line in checker.report(vec!["alice@example.com".to_string()]).await {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

// Re-export main public API types and functions
// This makes them available as spam_check_lib::TypeName
pub use checker::SpamChecker;
pub use config::{load_env_config, ConfigManager, DefaultsConfig, EnvConfig, FileConfig};
pub use error::SpamCheckError;
pub use memory::{CallStats, DirectoryFixture, InMemoryDirectory};
pub use pipeline::{conduit, stage_fn, FnStage, Pipeline, Stage, CONDUIT_CAPACITY};
pub use services::{MessageLookup, Services, SpamClassifier, UserLookup};
pub use stages::{sort_report, CombineResults, MessageSelection, SpamCheck, UserSelection};
pub use types::{AliasTable, ClassifiedMessage, Identifier, MessageId, PipelineConfig, User, MAX_LIMIT};
pub use utils::{parse_identifiers, validate_identifier};

// Public modules
pub mod pipeline;
pub mod stages;

// Internal modules - their contents are re-exported above
mod checker;
mod config;
mod error;
mod memory;
mod services;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SpamCheckError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
