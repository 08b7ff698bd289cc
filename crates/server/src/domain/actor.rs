use serde::{Deserialize, Serialize};

/// Platform-wide role carried in the auth token. Back-office staff roles on a
/// client account are a separate concept, see [`TeamRole`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Client,
    Freelancer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Freelancer => "freelancer",
            Role::Admin => "admin",
        }
    }
}

/// The identity acting in a single request. Built from the verified token and
/// passed explicitly into every workflow decision, so tests can simulate any
/// number of sessions side by side.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub display_name: String,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Staff role inside a client's back office. `Owner` is implicit for the
/// client account itself and cannot be granted through an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TeamRole {
    Owner,
    ProjectManager,
    Assistant,
    Accountant,
}

impl TeamRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::ProjectManager => "project_manager",
            TeamRole::Assistant => "assistant",
            TeamRole::Accountant => "accountant",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TeamRole::Owner => "Owner",
            TeamRole::ProjectManager => "Project manager",
            TeamRole::Assistant => "Assistant",
            TeamRole::Accountant => "Accountant",
        }
    }

    /// Permission grants mirrored by the back-office UI.
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            TeamRole::Owner => &["all"],
            TeamRole::ProjectManager => {
                &["view_projects", "assign_tasks", "manage_budget", "view_applications"]
            }
            TeamRole::Assistant => &["view_projects", "view_applications"],
            TeamRole::Accountant => &["view_projects", "manage_budget", "view_payments"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TeamMemberStatus {
    PendingInvite,
    Active,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_holds_the_blanket_permission() {
        assert_eq!(TeamRole::Owner.permissions(), &["all"]);
    }

    #[test]
    fn accountant_manages_budget_but_not_applications() {
        let perms = TeamRole::Accountant.permissions();
        assert!(perms.contains(&"manage_budget"));
        assert!(!perms.contains(&"view_applications"));
    }
}
