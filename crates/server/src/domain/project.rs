use serde::{Deserialize, Serialize};

use super::ledger::MilestoneStatus;
use super::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProjectStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Open => "open",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    pub fn can_transition(self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (InProgress, Completed) | (Open, Cancelled) | (InProgress, Cancelled)
        )
    }
}

pub fn ensure_transition(from: ProjectStatus, to: ProjectStatus) -> Result<(), DomainError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition(format!(
            "Cannot move a project from {} to {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

/// Projects can only be edited before they are awarded.
pub fn ensure_editable(status: ProjectStatus) -> Result<(), DomainError> {
    if status == ProjectStatus::Open {
        Ok(())
    } else {
        Err(DomainError::Conflict(
            "Only open projects can be edited".to_string(),
        ))
    }
}

/// A project only closes once every milestone has been delivered.
pub fn ensure_completable(milestones: &[MilestoneStatus]) -> Result<(), DomainError> {
    if milestones.iter().all(|m| *m == MilestoneStatus::Completed) {
        Ok(())
    } else {
        Err(DomainError::Conflict(
            "All milestones must be completed before closing the project".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(ensure_transition(ProjectStatus::Open, ProjectStatus::InProgress).is_ok());
        assert!(ensure_transition(ProjectStatus::InProgress, ProjectStatus::Completed).is_ok());
        assert!(ensure_transition(ProjectStatus::Open, ProjectStatus::Cancelled).is_ok());
        assert!(ensure_transition(ProjectStatus::InProgress, ProjectStatus::Cancelled).is_ok());
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        for from in [ProjectStatus::Completed, ProjectStatus::Cancelled] {
            for to in [
                ProjectStatus::Open,
                ProjectStatus::InProgress,
                ProjectStatus::Completed,
                ProjectStatus::Cancelled,
            ] {
                assert!(ensure_transition(from, to).is_err());
            }
        }
    }

    #[test]
    fn skipping_the_award_step_is_rejected() {
        assert!(ensure_transition(ProjectStatus::Open, ProjectStatus::Completed).is_err());
        assert!(ensure_transition(ProjectStatus::Completed, ProjectStatus::Open).is_err());
    }

    #[test]
    fn completion_requires_all_milestones_done() {
        use MilestoneStatus::*;
        assert!(ensure_completable(&[Completed, Completed]).is_ok());
        assert!(ensure_completable(&[]).is_ok());
        assert!(ensure_completable(&[Completed, InProgress]).is_err());
        assert!(ensure_completable(&[Pending]).is_err());
    }

    #[test]
    fn only_open_projects_are_editable() {
        assert!(ensure_editable(ProjectStatus::Open).is_ok());
        assert!(ensure_editable(ProjectStatus::InProgress).is_err());
        assert!(ensure_editable(ProjectStatus::Cancelled).is_err());
    }
}
