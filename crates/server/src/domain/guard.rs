use super::actor::{Actor, Role};
use super::DomainError;

/// An action an actor may attempt, together with the ownership facts needed
/// to decide it. Ids are borrowed from the already-loaded entities.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    CreateProject,
    UpdateProject { owner: &'a str },
    DeleteProject,
    CancelProject { owner: &'a str },
    CompleteProject { owner: &'a str },
    SubmitApplication,
    ViewApplications { owner: &'a str },
    DecideApplication { owner: &'a str },
    CreateMilestone { owner: &'a str },
    UpdateMilestone { owner: &'a str, assignee: Option<&'a str> },
    RequestPayment { assignee: Option<&'a str> },
    ApprovePayment { owner: &'a str },
    ReleasePayment { owner: &'a str },
    DisputePayment { owner: &'a str, assignee: Option<&'a str> },
    ManageDisputes,
    ResolveDispute,
    ManageTeam,
    ManageUsers,
    AdministerPlatform,
}

pub fn can(actor: &Actor, action: &Action<'_>) -> bool {
    use Action::*;

    let owns = |owner: &str| actor.role == Role::Client && actor.id == owner;
    let assigned = |assignee: Option<&str>| {
        actor.role == Role::Freelancer && assignee == Some(actor.id.as_str())
    };

    match *action {
        CreateProject | ManageTeam => actor.role == Role::Client,
        SubmitApplication => actor.role == Role::Freelancer,
        UpdateProject { owner }
        | DecideApplication { owner }
        | ApprovePayment { owner }
        | CreateMilestone { owner } => owns(owner),
        ViewApplications { owner } => actor.is_admin() || owns(owner),
        CancelProject { owner } | CompleteProject { owner } | ReleasePayment { owner } => {
            actor.is_admin() || owns(owner)
        }
        RequestPayment { assignee } => assigned(assignee),
        UpdateMilestone { owner, assignee } => actor.is_admin() || owns(owner) || assigned(assignee),
        DisputePayment { owner, assignee } => owns(owner) || assigned(assignee),
        DeleteProject | ManageDisputes | ResolveDispute | ManageUsers | AdministerPlatform => {
            actor.is_admin()
        }
    }
}

/// Checks the table above; a denial is an error, never a silent no-op.
pub fn authorize(actor: &Actor, action: Action<'_>) -> Result<(), DomainError> {
    if can(actor, &action) {
        Ok(())
    } else {
        Err(DomainError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str, role: Role) -> Actor {
        Actor {
            id: id.to_string(),
            role,
            display_name: id.to_string(),
        }
    }

    #[test]
    fn only_clients_create_projects() {
        assert!(can(&actor("c1", Role::Client), &Action::CreateProject));
        assert!(!can(&actor("f1", Role::Freelancer), &Action::CreateProject));
        assert!(!can(&actor("a1", Role::Admin), &Action::CreateProject));
    }

    #[test]
    fn only_freelancers_submit_applications() {
        assert!(can(&actor("f1", Role::Freelancer), &Action::SubmitApplication));
        assert!(!can(&actor("c1", Role::Client), &Action::SubmitApplication));
        assert!(!can(&actor("a1", Role::Admin), &Action::SubmitApplication));
    }

    #[test]
    fn application_decisions_belong_to_the_project_owner() {
        let action = Action::DecideApplication { owner: "c1" };
        assert!(can(&actor("c1", Role::Client), &action));
        assert!(!can(&actor("c2", Role::Client), &action));
        assert!(!can(&actor("a1", Role::Admin), &action));
    }

    #[test]
    fn admins_override_payment_release() {
        let action = Action::ReleasePayment { owner: "c1" };
        assert!(can(&actor("c1", Role::Client), &action));
        assert!(can(&actor("a1", Role::Admin), &action));
        assert!(!can(&actor("c2", Role::Client), &action));
        assert!(!can(&actor("f1", Role::Freelancer), &action));
    }

    #[test]
    fn payment_requests_require_the_assigned_freelancer() {
        let action = Action::RequestPayment { assignee: Some("f1") };
        assert!(can(&actor("f1", Role::Freelancer), &action));
        assert!(!can(&actor("f2", Role::Freelancer), &action));
        assert!(!can(&actor("f1", Role::Client), &action));
        assert!(!can(&actor("f1", Role::Freelancer), &Action::RequestPayment { assignee: None }));
    }

    #[test]
    fn either_party_may_dispute_a_payment() {
        let action = Action::DisputePayment { owner: "c1", assignee: Some("f1") };
        assert!(can(&actor("c1", Role::Client), &action));
        assert!(can(&actor("f1", Role::Freelancer), &action));
        assert!(!can(&actor("f2", Role::Freelancer), &action));
    }

    #[test]
    fn dispute_resolution_and_user_management_are_admin_only() {
        for role in [Role::Client, Role::Freelancer] {
            assert!(!can(&actor("u1", role), &Action::ResolveDispute));
            assert!(!can(&actor("u1", role), &Action::ManageUsers));
            assert!(!can(&actor("u1", role), &Action::DeleteProject));
        }
        assert!(can(&actor("a1", Role::Admin), &Action::ResolveDispute));
        assert!(can(&actor("a1", Role::Admin), &Action::ManageUsers));
        assert!(can(&actor("a1", Role::Admin), &Action::DeleteProject));
    }

    #[test]
    fn denial_surfaces_as_an_error() {
        let err = authorize(&actor("f1", Role::Freelancer), Action::CreateProject);
        assert_eq!(err, Err(DomainError::PermissionDenied));
    }
}
