use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json as DbJson;
use uuid::Uuid;

use crate::{
    db::models::TeamMember,
    domain::{
        actor::{TeamMemberStatus, TeamRole},
        guard::{self, Action},
        DomainError,
    },
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    routes::MessageResponse,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_members))
        .route("/invite", post(invite_member))
        .route("/roles", get(available_roles))
        .route("/:id/role", put(update_member_role))
        .route("/:id", delete(remove_member))
}

const INVITABLE_ROLES: [TeamRole; 3] =
    [TeamRole::ProjectManager, TeamRole::Assistant, TeamRole::Accountant];

async fn load_member(state: &AppState, id: &str, owner_id: &str) -> Result<TeamMember> {
    sqlx::query_as::<_, TeamMember>(
        "SELECT * FROM team_members WHERE id = ? AND client_owner_id = ?",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Team member not found".to_string()))
}

async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<Vec<TeamMember>>>> {
    guard::authorize(&user.actor(), Action::ManageTeam)?;

    let members = sqlx::query_as::<_, TeamMember>(
        "SELECT * FROM team_members WHERE client_owner_id = ? ORDER BY invited_at ASC",
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(ok(members))
}

#[derive(Debug, Deserialize)]
pub struct InviteMemberRequest {
    pub email: String,
    pub role: TeamRole,
}

async fn invite_member(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<InviteMemberRequest>,
) -> Result<Json<Envelope<TeamMember>>> {
    guard::authorize(&user.actor(), Action::ManageTeam)?;

    if body.email.is_empty() || !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if !INVITABLE_ROLES.contains(&body.role) {
        return Err(AppError::Validation(
            "Only project manager, assistant, and accountant roles can be invited".to_string(),
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM team_members WHERE client_owner_id = ? AND email = ?",
    )
    .bind(&user.id)
    .bind(&body.email)
    .fetch_one(&state.db.pool)
    .await?;

    if existing > 0 {
        return Err(AppError::Domain(DomainError::Conflict(
            "This address is already on the team".to_string(),
        )));
    }

    let member = TeamMember {
        id: Uuid::new_v4().to_string(),
        client_owner_id: user.id.clone(),
        email: body.email,
        name: None,
        role: body.role,
        permissions: DbJson(
            body.role
                .permissions()
                .iter()
                .map(|p| p.to_string())
                .collect(),
        ),
        status: TeamMemberStatus::PendingInvite,
        invited_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO team_members (id, client_owner_id, email, name, role, permissions, status, invited_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&member.id)
    .bind(&member.client_owner_id)
    .bind(&member.email)
    .bind(&member.name)
    .bind(member.role)
    .bind(member.permissions.clone())
    .bind(member.status)
    .bind(member.invited_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        "client {} invited {} as {}",
        user.id,
        member.email,
        member.role.as_str()
    );

    Ok(ok(member))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: TeamRole,
}

async fn update_member_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateMemberRoleRequest>,
) -> Result<Json<Envelope<TeamMember>>> {
    guard::authorize(&user.actor(), Action::ManageTeam)?;

    if !INVITABLE_ROLES.contains(&body.role) {
        return Err(AppError::Validation(
            "Only project manager, assistant, and accountant roles can be assigned".to_string(),
        ));
    }

    let mut member = load_member(&state, &id, &user.id).await?;

    let permissions = DbJson(
        body.role
            .permissions()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<String>>(),
    );

    sqlx::query("UPDATE team_members SET role = ?, permissions = ? WHERE id = ?")
        .bind(body.role)
        .bind(permissions.clone())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    member.role = body.role;
    member.permissions = permissions;
    Ok(ok(member))
}

async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<MessageResponse>>> {
    guard::authorize(&user.actor(), Action::ManageTeam)?;

    let member = load_member(&state, &id, &user.id).await?;

    sqlx::query("DELETE FROM team_members WHERE id = ?")
        .bind(&member.id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("client {} removed team member {}", user.id, member.email);

    Ok(ok(MessageResponse::new("Team member removed")))
}

#[derive(Debug, Serialize)]
pub struct RoleOption {
    pub id: &'static str,
    pub label: &'static str,
    pub permissions: &'static [&'static str],
}

async fn available_roles(user: AuthUser) -> Result<Json<Envelope<Vec<RoleOption>>>> {
    guard::authorize(&user.actor(), Action::ManageTeam)?;

    let roles = INVITABLE_ROLES
        .iter()
        .map(|role| RoleOption {
            id: role.as_str(),
            label: role.label(),
            permissions: role.permissions(),
        })
        .collect();

    Ok(ok(roles))
}
