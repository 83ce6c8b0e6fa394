use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// A primitive the agent can issue. The serialized form is the identifier the simulator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    MoveAhead,
    RotateLeft,
    RotateRight,
    LookUp,
    LookDown,
    #[serde(rename = "FOUND")]
    Found,
    Done,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveAhead => "MoveAhead",
            Self::RotateLeft => "RotateLeft",
            Self::RotateRight => "RotateRight",
            Self::LookUp => "LookUp",
            Self::LookDown => "LookDown",
            Self::Found => "FOUND",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{"action": <identifier>}` record handed to the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: Action,
}

impl From<Action> for ActionRecord {
    fn from(action: Action) -> Self {
        Self { action }
    }
}

pub const BASIC_ACTIONS: [Action; 7] = [
    Action::MoveAhead,
    Action::RotateLeft,
    Action::RotateRight,
    Action::LookUp,
    Action::LookDown,
    Action::Found,
    Action::Done,
];

static BASIC_CATALOG: Lazy<Arc<ActionCatalog>> = Lazy::new(|| {
    Arc::new(ActionCatalog {
        actions: BASIC_ACTIONS.to_vec(),
    })
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("action catalog is empty")]
    Empty,
    #[error("action catalog has no `Done` action, episodes could never terminate")]
    MissingDone,
}

/// Ordered, index-addressable set of actions. The index is the model's action dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCatalog {
    actions: Vec<Action>,
}

impl ActionCatalog {
    pub fn new(actions: Vec<Action>) -> Result<Self, CatalogError> {
        if actions.is_empty() {
            return Err(CatalogError::Empty);
        }
        if !actions.contains(&Action::Done) {
            return Err(CatalogError::MissingDone);
        }
        Ok(Self { actions })
    }

    /// The shared catalog over [`BASIC_ACTIONS`], built once per process.
    pub fn basic() -> Arc<Self> {
        BASIC_CATALOG.clone()
    }

    pub fn from_records(records: &[ActionRecord]) -> Result<Self, CatalogError> {
        Self::new(records.iter().map(|r| r.action).collect())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Action> {
        self.actions.get(index).copied()
    }

    pub fn index_of(&self, action: Action) -> Option<usize> {
        self.actions.iter().position(|a| *a == action)
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.iter().copied()
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        self.iter().map(ActionRecord::from).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic_catalog_is_shared() {
        let a = ActionCatalog::basic();
        let b = ActionCatalog::basic();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 7);
        assert_eq!(a.index_of(Action::Done), Some(6));
        assert_eq!(a.get(7), None);
    }

    #[test]
    fn records_use_simulator_identifiers() {
        let json = serde_json::to_string(&ActionCatalog::basic().records()).unwrap();
        assert!(json.starts_with(r#"[{"action":"MoveAhead"}"#));
        assert!(json.contains(r#"{"action":"FOUND"}"#));
        let records: Vec<ActionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(
            ActionCatalog::from_records(&records).unwrap(),
            *ActionCatalog::basic()
        );
    }

    #[test]
    fn catalog_without_done_is_rejected() {
        assert_eq!(ActionCatalog::new(vec![]), Err(CatalogError::Empty));
        assert_eq!(
            ActionCatalog::new(vec![Action::MoveAhead, Action::Found]),
            Err(CatalogError::MissingDone)
        );
    }
}
