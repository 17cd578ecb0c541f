//! Migration records.
//!
//! A [`Migration`] is a plain immutable record: identity, forward action and
//! reverse action. Action contents are opaque here; only the schema-action
//! collaborator in `tm-db` interprets them.

use crate::identity::MigrationId;
use crate::migration_name::MigrationName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque description of a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    pub fn new(body: impl Into<String>) -> Self {
        Self(body.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a migration is undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reverse {
    /// An action that exactly undoes the forward action
    Action(Action),
    /// The migration declares it cannot be reverted
    Irreversible,
}

impl Reverse {
    pub fn action(&self) -> Option<&Action> {
        match self {
            Reverse::Action(action) => Some(action),
            Reverse::Irreversible => None,
        }
    }

    pub fn is_irreversible(&self) -> bool {
        matches!(self, Reverse::Irreversible)
    }
}

/// One versioned schema change with its declared inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: MigrationId,
    pub name: MigrationName,
    pub description: Option<String>,
    pub forward: Action,
    pub reverse: Reverse,
    /// Run inside the DDL transaction. `false` runs the action and the ledger
    /// write as separate statements.
    pub transactional: bool,
    /// Query answering "is this migration's effect present in the schema?"
    pub probe: Option<String>,
}

impl Migration {
    /// Build a reversible, transactional migration.
    pub fn new(
        id: u64,
        name: &str,
        forward: impl Into<String>,
        reverse: impl Into<String>,
    ) -> Self {
        Self {
            id: MigrationId::new(id),
            name: MigrationName::new(name),
            description: None,
            forward: Action::new(forward),
            reverse: Reverse::Action(Action::new(reverse)),
            transactional: true,
            probe: None,
        }
    }

    /// Build a migration that cannot be reverted.
    pub fn irreversible(id: u64, name: &str, forward: impl Into<String>) -> Self {
        Self {
            id: MigrationId::new(id),
            name: MigrationName::new(name),
            description: None,
            forward: Action::new(forward),
            reverse: Reverse::Irreversible,
            transactional: true,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = Some(probe.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// `<id>_<name>`, the form used in file names and messages.
    pub fn label(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }
}

/// Body of a migration file as written on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MigrationFile {
    #[serde(default)]
    pub description: Option<String>,

    pub forward: String,

    #[serde(default)]
    pub reverse: Option<String>,

    #[serde(default)]
    pub irreversible: bool,

    #[serde(default = "default_transaction")]
    pub transaction: bool,

    #[serde(default)]
    pub probe: Option<String>,
}

fn default_transaction() -> bool {
    true
}

impl MigrationFile {
    /// Combine the file body with the identity parsed from its name.
    ///
    /// Returns the reason the body is invalid on failure.
    pub(crate) fn into_migration(
        self,
        id: MigrationId,
        name: MigrationName,
    ) -> Result<Migration, String> {
        if self.forward.trim().is_empty() {
            return Err("`forward` must not be empty".to_string());
        }
        let reverse = match (self.reverse, self.irreversible) {
            (Some(_), true) => {
                return Err("declares both `reverse` and `irreversible: true`".to_string())
            }
            (None, false) => {
                return Err(
                    "missing `reverse`; declare `irreversible: true` if it cannot be undone"
                        .to_string(),
                )
            }
            (Some(sql), false) if sql.trim().is_empty() => {
                return Err("`reverse` must not be empty".to_string())
            }
            (Some(sql), false) => Reverse::Action(Action::new(sql)),
            (None, true) => Reverse::Irreversible,
        };
        Ok(Migration {
            id,
            name,
            description: self.description,
            forward: Action::new(self.forward),
            reverse,
            transactional: self.transaction,
            probe: self.probe.filter(|p| !p.trim().is_empty()),
        })
    }
}
