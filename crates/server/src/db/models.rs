use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::domain::actor::{Role, TeamMemberStatus, TeamRole};
use crate::domain::application::ApplicationStatus;
use crate::domain::dispute::{DisputePriority, DisputeStatus, ResolutionKind};
use crate::domain::ledger::{MilestoneStatus, PaymentKind, PaymentStatus};
use crate::domain::project::ProjectStatus;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub verified: bool,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub client_id: String,
    pub freelancer_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget_min: i64,
    pub budget_max: i64,
    /// Fixed when an application is accepted; the escrow total budget.
    pub agreed_budget: Option<i64>,
    pub status: ProjectStatus,
    pub deadline: Option<NaiveDate>,
    pub skills: Json<Vec<String>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub project_id: String,
    pub freelancer_id: String,
    pub proposed_budget: i64,
    pub proposed_duration: String,
    pub cover_letter: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub budget: i64,
    pub spent: i64,
    pub status: MilestoneStatus,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub project_id: String,
    pub milestone_id: Option<String>,
    pub freelancer_id: String,
    pub amount: i64,
    /// Clawed back by dispute resolution; effective amount is `amount - refunded`.
    pub refunded: i64,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: String,
    pub project_id: String,
    pub payment_id: Option<String>,
    pub reported_by: String,
    pub against: String,
    pub reason: String,
    pub status: DisputeStatus,
    pub priority: DisputePriority,
    pub resolution: Option<ResolutionKind>,
    pub refund_amount: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DisputeMessage {
    pub id: String,
    pub dispute_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub client_owner_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: TeamRole,
    pub permissions: Json<Vec<String>>,
    pub status: TeamMemberStatus,
    pub invited_at: DateTime<Utc>,
}
