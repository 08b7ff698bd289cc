use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::{
    domain::actor::TeamRole,
    error::{ok, Envelope, Result},
    middleware::auth::AuthUser,
    AppState,
};

/// Categories a project can be posted under.
pub const CATEGORIES: [&str; 4] = ["Development", "Design", "Marketing", "Writing"];

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(options))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsResponse {
    pub categories: [&'static str; 4],
    pub project_statuses: [&'static str; 4],
    pub application_statuses: [&'static str; 3],
    pub milestone_statuses: [&'static str; 3],
    pub payment_statuses: [&'static str; 5],
    pub dispute_statuses: [&'static str; 4],
    pub dispute_priorities: [&'static str; 3],
    pub team_roles: Vec<TeamRoleOption>,
}

#[derive(Debug, Serialize)]
pub struct TeamRoleOption {
    pub id: &'static str,
    pub label: &'static str,
}

/// Enumerations the client uses to build its filter and form controls.
async fn options(_user: AuthUser) -> Result<Json<Envelope<OptionsResponse>>> {
    Ok(ok(OptionsResponse {
        categories: CATEGORIES,
        project_statuses: ["open", "in_progress", "completed", "cancelled"],
        application_statuses: ["pending", "accepted", "rejected"],
        milestone_statuses: ["pending", "in_progress", "completed"],
        payment_statuses: [
            "pending_approval",
            "pending_release",
            "released",
            "disputed",
            "refunded",
        ],
        dispute_statuses: ["open", "in_progress", "resolved", "dismissed"],
        dispute_priorities: ["high", "medium", "low"],
        team_roles: [TeamRole::ProjectManager, TeamRole::Assistant, TeamRole::Accountant]
            .iter()
            .map(|role| TeamRoleOption {
                id: role.as_str(),
                label: role.label(),
            })
            .collect(),
    }))
}
