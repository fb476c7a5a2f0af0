//! core::identity
//!
//! The acting user behind a mutating operation.
//!
//! Every ref-writing workflow runs on behalf of a user: commits it creates
//! carry that user as committer, and every subprocess it spawns carries the
//! user in its environment so downstream hooks can attribute the change.

use std::collections::HashMap;

/// A name/email pair, used for commit authors, committers, and taggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// The user a mutating operation acts on behalf of.
///
/// `user_id` is the opaque caller-side identifier propagated to spawned
/// processes; it is never interpreted by this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser {
    pub identity: Identity,
    pub user_id: String,
}

/// Value of the protocol tag set on spawned processes.
pub const PROTOCOL_WEB: &str = "web";

impl ActingUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            identity: Identity::new(name, email),
            user_id: user_id.into(),
        }
    }

    /// The environment handed to every process spawned on this user's
    /// behalf. `repository_id` is the logical repository identifier of the
    /// repository being mutated, when the caller supplied one.
    pub fn process_env(&self, repository_id: Option<&str>) -> HashMap<String, String> {
        let mut env = HashMap::from([
            ("GIT_COMMITTER_NAME".to_string(), self.identity.name.clone()),
            (
                "GIT_COMMITTER_EMAIL".to_string(),
                self.identity.email.clone(),
            ),
            ("CAPSTAN_USER_ID".to_string(), self.user_id.clone()),
            ("CAPSTAN_PROTOCOL".to_string(), PROTOCOL_WEB.to_string()),
        ]);
        if let Some(id) = repository_id {
            env.insert("CAPSTAN_REPOSITORY".to_string(), id.to_string());
        }
        env
    }
}
