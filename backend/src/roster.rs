//! Identity and roster collaborator: who guards a child, what people are
//! called, and which homes a child stays at.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::{Home, WorkflowResult};
use uuid::Uuid;

#[async_trait]
pub trait Roster: Send + Sync {
    /// Caregivers with guardian-level access to `child_id`
    async fn guardians(&self, child_id: Uuid) -> WorkflowResult<Vec<Uuid>>;

    async fn display_name(&self, user_id: Uuid) -> WorkflowResult<Option<String>>;

    async fn homes(&self, child_id: Uuid) -> WorkflowResult<Vec<Home>>;
}

/// Guardians who may confirm a proposal made by `proposer`.
pub fn eligible_confirmers(guardians: &[Uuid], proposer: Option<Uuid>) -> Vec<Uuid> {
    let mut eligible: Vec<Uuid> = guardians
        .iter()
        .copied()
        .filter(|g| Some(*g) != proposer)
        .collect();
    eligible.sort();
    eligible.dedup();
    eligible
}

/// Fixed roster built up front; used by tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    guardians: HashMap<Uuid, Vec<Uuid>>,
    names: HashMap<Uuid, String>,
    homes: HashMap<Uuid, Vec<Home>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guardian(mut self, child_id: Uuid, user_id: Uuid, name: &str) -> Self {
        self.guardians.entry(child_id).or_default().push(user_id);
        self.names.insert(user_id, name.to_string());
        self
    }

    pub fn with_home(mut self, child_id: Uuid, home_id: Uuid, name: &str) -> Self {
        self.homes.entry(child_id).or_default().push(Home {
            id: home_id,
            name: name.to_string(),
        });
        self
    }
}

#[async_trait]
impl Roster for StaticRoster {
    async fn guardians(&self, child_id: Uuid) -> WorkflowResult<Vec<Uuid>> {
        Ok(self.guardians.get(&child_id).cloned().unwrap_or_default())
    }

    async fn display_name(&self, user_id: Uuid) -> WorkflowResult<Option<String>> {
        Ok(self.names.get(&user_id).cloned())
    }

    async fn homes(&self, child_id: Uuid) -> WorkflowResult<Vec<Home>> {
        Ok(self.homes.get(&child_id).cloned().unwrap_or_default())
    }
}
