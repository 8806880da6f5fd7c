//! User selection: identifiers in, unique canonical users out.

use super::{reap, wait_all};
use crate::error::SpamCheckError;
use crate::pipeline::Stage;
use crate::services::UserLookup;
use crate::types::{AliasTable, Identifier, User};
use crate::utils::validate_identifier;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Looks up every incoming identifier concurrently and emits each canonical
/// user once per run.
///
/// One lookup task is spawned per identifier. When the alias table maps the
/// looked-up email to another identifier, that identifier is looked up too
/// and its result replaces the first one. Only one alias hop is followed.
pub struct UserSelection {
    users: Arc<dyn UserLookup>,
    aliases: Arc<AliasTable>,
}

impl UserSelection {
    pub fn new(users: Arc<dyn UserLookup>, aliases: Arc<AliasTable>) -> Self {
        Self { users, aliases }
    }
}

/// Look up an identifier and follow at most one alias.
async fn resolve_user(
    users: &dyn UserLookup,
    aliases: &AliasTable,
    identifier: &str,
) -> Result<User, SpamCheckError> {
    let user = users.lookup_user(identifier).await?;

    match aliases.alias_of(&user.email) {
        Some(alias) => {
            debug!(email = %user.email, alias, "following alias");
            users.lookup_user(alias).await
        }
        None => Ok(user),
    }
}

/// Record `email` as processed. Returns false if it was already present.
fn claim(processed: &Mutex<HashSet<String>>, email: &str) -> bool {
    processed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(email.to_string())
}

#[async_trait]
impl Stage for UserSelection {
    type Input = Identifier;
    type Output = User;

    fn name(&self) -> &'static str {
        "select_users"
    }

    async fn run(self, mut input: Receiver<Identifier>, output: Sender<User>) {
        let processed: Arc<Mutex<HashSet<String>>> = Arc::default();
        let mut lookups = JoinSet::new();
        let mut received = 0usize;

        while let Some(raw) = input.recv().await {
            received += 1;
            reap(&mut lookups);

            let identifier = match validate_identifier(&raw) {
                Ok(identifier) => identifier.to_string(),
                Err(err) => {
                    warn!(error = %err, "dropping malformed identifier");
                    continue;
                }
            };

            let users = Arc::clone(&self.users);
            let aliases = Arc::clone(&self.aliases);
            let processed = Arc::clone(&processed);
            let output = output.clone();

            lookups.spawn(async move {
                let user = match resolve_user(users.as_ref(), &aliases, &identifier).await {
                    Ok(user) => user,
                    Err(err) => {
                        warn!(identifier = %identifier, error = %err, "dropping identifier after failed lookup");
                        return;
                    }
                };

                if !claim(&processed, &user.email) {
                    debug!(identifier = %identifier, email = %user.email, "skipping duplicate user");
                    return;
                }

                if output.send(user).await.is_err() {
                    debug!(identifier = %identifier, "downstream closed before user could be emitted");
                }
            });
        }

        wait_all(lookups).await;

        let unique = processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        info!(received, unique, "user selection finished");
    }
}
