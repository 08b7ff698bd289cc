use serde::{Deserialize, Serialize};

use super::project::{ensure_transition, ProjectStatus};
use super::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

/// Everything that changes when a client picks a winner: the chosen
/// application, the siblings that lose by implication, and the project's new
/// status. Applied as one transaction by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub accepted_id: String,
    pub rejected_ids: Vec<String>,
    pub project_status: ProjectStatus,
}

pub fn ensure_open_for_applications(status: ProjectStatus) -> Result<(), DomainError> {
    if status == ProjectStatus::Open {
        Ok(())
    } else {
        Err(DomainError::Conflict(
            "Project is not accepting applications".to_string(),
        ))
    }
}

/// Resolves the competition for a project in one atomic decision. `siblings`
/// are all other applications for the same project.
pub fn accept(
    project_status: ProjectStatus,
    application_id: &str,
    application_status: ApplicationStatus,
    siblings: &[(String, ApplicationStatus)],
) -> Result<AcceptOutcome, DomainError> {
    match application_status {
        ApplicationStatus::Pending => {}
        ApplicationStatus::Accepted => {
            return Err(DomainError::Conflict(
                "Application is already accepted".to_string(),
            ))
        }
        ApplicationStatus::Rejected => {
            return Err(DomainError::Conflict(
                "A rejected application cannot be accepted".to_string(),
            ))
        }
    }

    if siblings.iter().any(|(_, s)| *s == ApplicationStatus::Accepted) {
        return Err(DomainError::Conflict(
            "Another application is already accepted for this project".to_string(),
        ));
    }

    ensure_open_for_applications(project_status)?;
    ensure_transition(project_status, ProjectStatus::InProgress)?;

    let rejected_ids = siblings
        .iter()
        .filter(|(_, s)| *s == ApplicationStatus::Pending)
        .map(|(id, _)| id.clone())
        .collect();

    Ok(AcceptOutcome {
        accepted_id: application_id.to_string(),
        rejected_ids,
        project_status: ProjectStatus::InProgress,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectOutcome {
    Rejected,
    /// Rejection is idempotent: repeating it reports the unchanged terminal
    /// state instead of failing.
    AlreadyRejected,
}

pub fn reject(status: ApplicationStatus) -> Result<RejectOutcome, DomainError> {
    match status {
        ApplicationStatus::Pending => Ok(RejectOutcome::Rejected),
        ApplicationStatus::Rejected => Ok(RejectOutcome::AlreadyRejected),
        ApplicationStatus::Accepted => Err(DomainError::Conflict(
            "An accepted application can no longer be rejected".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siblings(entries: &[(&str, ApplicationStatus)]) -> Vec<(String, ApplicationStatus)> {
        entries.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn accepting_one_rejects_the_rest_and_awards_the_project() {
        let others = siblings(&[("a2", ApplicationStatus::Pending)]);
        let outcome =
            accept(ProjectStatus::Open, "a1", ApplicationStatus::Pending, &others).unwrap();

        assert_eq!(outcome.accepted_id, "a1");
        assert_eq!(outcome.rejected_ids, vec!["a2".to_string()]);
        assert_eq!(outcome.project_status, ProjectStatus::InProgress);
    }

    #[test]
    fn already_decided_siblings_are_left_alone() {
        let others = siblings(&[
            ("a2", ApplicationStatus::Rejected),
            ("a3", ApplicationStatus::Pending),
        ]);
        let outcome =
            accept(ProjectStatus::Open, "a1", ApplicationStatus::Pending, &others).unwrap();
        assert_eq!(outcome.rejected_ids, vec!["a3".to_string()]);
    }

    #[test]
    fn a_second_accept_for_the_same_project_conflicts() {
        let others = siblings(&[("a1", ApplicationStatus::Accepted)]);
        let err = accept(ProjectStatus::Open, "a2", ApplicationStatus::Pending, &others);
        assert!(matches!(err, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn accepting_requires_an_open_project() {
        let err = accept(
            ProjectStatus::InProgress,
            "a1",
            ApplicationStatus::Pending,
            &[],
        );
        assert!(matches!(err, Err(DomainError::Conflict(_))));

        let err = accept(ProjectStatus::Cancelled, "a1", ApplicationStatus::Pending, &[]);
        assert!(matches!(err, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn accepting_a_decided_application_conflicts() {
        for status in [ApplicationStatus::Accepted, ApplicationStatus::Rejected] {
            let err = accept(ProjectStatus::Open, "a1", status, &[]);
            assert!(matches!(err, Err(DomainError::Conflict(_))));
        }
    }

    #[test]
    fn reject_is_idempotent() {
        assert_eq!(reject(ApplicationStatus::Pending), Ok(RejectOutcome::Rejected));
        assert_eq!(
            reject(ApplicationStatus::Rejected),
            Ok(RejectOutcome::AlreadyRejected)
        );
    }

    #[test]
    fn rejecting_the_winner_conflicts() {
        assert!(matches!(
            reject(ApplicationStatus::Accepted),
            Err(DomainError::Conflict(_))
        ));
    }
}
