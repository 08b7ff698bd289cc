// Workflow core: role checks and entity state machines, independent of the
// HTTP and persistence layers. Routes load the current state, ask this module
// whether a transition is legal, then persist the outcome.

pub mod actor;
pub mod application;
pub mod dispute;
pub mod guard;
pub mod ledger;
pub mod project;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Permission denied")]
    PermissionDenied,
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Allocation exceeds the available budget")]
    OverBudget,
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Dispute is already resolved")]
    AlreadyResolved,
}
