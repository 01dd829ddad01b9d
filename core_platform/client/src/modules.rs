//! Sidebar module list with optimistic reordering.
//!
//! A reorder is two explicit phases: [`ModuleStore::begin_reorder`] applies
//! the move locally and remembers the previous list, then the caller either
//! commits the server's answer or reverts. [`ModuleStore::reorder`] runs
//! both phases against the API.

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::models::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// A local move waiting for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReorder {
    pub module_id: String,
    pub ordered_ids: Vec<String>,
    previous: Vec<Module>,
}

#[derive(Debug, Default)]
pub struct ModuleStore {
    modules: Vec<Module>,
    pending: Option<String>,
    error: Option<String>,
}

impl ModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Module whose change is in flight.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn primary(&self) -> Option<&Module> {
        self.modules.iter().find(|module| module.is_primary)
    }

    pub fn clear(&mut self) {
        self.modules.clear();
        self.pending = None;
        self.error = None;
    }

    #[tracing::instrument(skip_all)]
    pub async fn reload(&mut self, api: &ApiClient) -> Result<(), ClientError> {
        self.error = None;
        match api.modules().await {
            Ok(modules) => {
                self.modules = modules;
                Ok(())
            }
            Err(err) => {
                self.modules.clear();
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn set_primary(&mut self, api: &ApiClient, module_id: Option<&str>) -> Result<(), ClientError> {
        self.pending = Some(module_id.unwrap_or("primary-reset").to_string());
        self.error = None;
        let result = api.set_primary_module(module_id).await;
        self.pending = None;
        match result {
            Ok(modules) => {
                self.modules = modules;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Moves the module one slot and returns what the server must confirm.
    /// `None` when the module is unknown or already at that edge.
    pub fn begin_reorder(&mut self, module_id: &str, direction: MoveDirection) -> Option<PendingReorder> {
        let current = self.modules.iter().position(|module| module.id == module_id)?;
        let target = match direction {
            MoveDirection::Up => current.checked_sub(1)?,
            MoveDirection::Down => Some(current + 1).filter(|index| *index < self.modules.len())?,
        };

        let previous = self.modules.clone();
        let moved = self.modules.remove(current);
        self.modules.insert(target, moved);
        self.pending = Some(module_id.to_string());
        self.error = None;

        Some(PendingReorder {
            module_id: module_id.to_string(),
            ordered_ids: self.modules.iter().map(|module| module.id.clone()).collect(),
            previous,
        })
    }

    /// Accepts the server's list as the new state.
    pub fn commit_reorder(&mut self, _pending: PendingReorder, modules: Vec<Module>) {
        self.modules = modules;
        self.pending = None;
    }

    /// Restores the list from before the move.
    pub fn revert_reorder(&mut self, pending: PendingReorder, error: &ClientError) {
        tracing::warn!("Reorder of {} rolled back: {}", pending.module_id, error);
        self.modules = pending.previous;
        self.pending = None;
        self.error = Some(error.to_string());
    }

    /// Returns `false` when there was nothing to move.
    #[tracing::instrument(skip(self, api))]
    pub async fn reorder(
        &mut self,
        api: &ApiClient,
        module_id: &str,
        direction: MoveDirection,
    ) -> Result<bool, ClientError> {
        let Some(pending) = self.begin_reorder(module_id, direction) else {
            return Ok(false);
        };
        match api.set_module_order(&pending.ordered_ids).await {
            Ok(modules) => {
                self.commit_reorder(pending, modules);
                Ok(true)
            }
            Err(err) => {
                self.revert_reorder(pending, &err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::BTreeMap;

    fn module(id: &str, order: i32) -> Module {
        Module {
            id: id.to_string(),
            name: id.to_string(),
            title: id.to_uppercase(),
            path: format!("/{id}"),
            order,
            is_primary: order == 0,
            has_access: true,
            permissions: BTreeMap::new(),
        }
    }

    fn store() -> ModuleStore {
        ModuleStore {
            modules: vec![module("help", 0), module("tasks", 1), module("admin", 2)],
            ..Default::default()
        }
    }

    fn ids(store: &ModuleStore) -> Vec<&str> {
        store.modules().iter().map(|module| module.id.as_str()).collect()
    }

    #[test]
    fn can_show_move_before_server_answers() {
        let mut store = store();

        let pending = store.begin_reorder("admin", MoveDirection::Up).unwrap();

        assert_eq!(ids(&store), vec!["help", "admin", "tasks"]);
        assert_eq!(pending.ordered_ids, vec!["help", "admin", "tasks"]);
        assert_eq!(store.pending(), Some("admin"));
    }

    #[test]
    fn can_revert_to_previous_order() {
        let mut store = store();
        let pending = store.begin_reorder("help", MoveDirection::Down).unwrap();

        store.revert_reorder(
            pending,
            &ClientError::Http {
                status: StatusCode::BAD_REQUEST,
                message: "ordered_ids must list every module exactly once".to_string(),
            },
        );

        assert_eq!(ids(&store), vec!["help", "tasks", "admin"]);
        assert_eq!(store.pending(), None);
        assert_eq!(
            store.error(),
            Some("ordered_ids must list every module exactly once")
        );
    }

    #[test]
    fn can_commit_server_list() {
        let mut store = store();
        let pending = store.begin_reorder("tasks", MoveDirection::Up).unwrap();

        store.commit_reorder(pending, vec![module("tasks", 0), module("help", 1), module("admin", 2)]);

        assert_eq!(ids(&store), vec!["tasks", "help", "admin"]);
        assert_eq!(store.primary().map(|module| module.id.as_str()), Some("tasks"));
    }

    #[test]
    fn can_ignore_moves_past_the_edges() {
        let mut store = store();

        assert!(store.begin_reorder("help", MoveDirection::Up).is_none());
        assert!(store.begin_reorder("admin", MoveDirection::Down).is_none());
        assert!(store.begin_reorder("billing", MoveDirection::Down).is_none());
        assert_eq!(ids(&store), vec!["help", "tasks", "admin"]);
        assert_eq!(store.pending(), None);
    }
}
