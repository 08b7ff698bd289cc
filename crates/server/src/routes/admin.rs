use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::models::User,
    domain::{
        actor::Role,
        guard::{self, Action},
        project::ProjectStatus,
    },
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    routes::{MessageResponse, Paginated, Pagination},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/toggle-block", post(toggle_block))
        .route("/users/:id/verify", post(verify_user))
        .route("/projects", get(list_projects))
        .route("/analytics/dashboard", get(dashboard))
}

async fn load_user(state: &AppState, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct UserFilters {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub blocked: Option<bool>,
    pub verified: Option<bool>,
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &UserFilters) {
    if let Some(search) = &filters.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(email) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = filters.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(blocked) = filters.blocked {
        qb.push(" AND blocked = ").push_bind(blocked);
    }
    if let Some(verified) = filters.verified {
        qb.push(" AND verified = ").push_bind(verified);
    }
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<UserFilters>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Paginated<User>>>> {
    guard::authorize(&user.actor(), Action::ManageUsers)?;

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users WHERE 1 = 1");
    push_user_filters(&mut count_qb, &filters);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(&state.db.pool)
        .await?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE 1 = 1");
    push_user_filters(&mut qb, &filters);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let items = qb
        .build_query_as::<User>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ok(Paginated::new(items, total, &pagination)))
}

async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<User>>> {
    guard::authorize(&user.actor(), Action::ManageUsers)?;
    load_user(&state, &id).await.map(ok)
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub verified: Option<bool>,
}

async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<Envelope<User>>> {
    guard::authorize(&user.actor(), Action::ManageUsers)?;

    let target = load_user(&state, &id).await?;

    let name = body.name.unwrap_or(target.name);
    if name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    let role = body.role.unwrap_or(target.role);
    let verified = body.verified.unwrap_or(target.verified);

    sqlx::query("UPDATE users SET name = ?, role = ?, verified = ? WHERE id = ?")
        .bind(&name)
        .bind(role)
        .bind(verified)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("admin {} updated user {id}", user.id);

    load_user(&state, &id).await.map(ok)
}

async fn toggle_block(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<User>>> {
    guard::authorize(&user.actor(), Action::ManageUsers)?;

    if id == user.id {
        return Err(AppError::Validation(
            "Cannot block your own account".to_string(),
        ));
    }

    let target = load_user(&state, &id).await?;

    sqlx::query("UPDATE users SET blocked = NOT blocked WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::warn!(
        "admin {} {} user {id}",
        user.id,
        if target.blocked { "unblocked" } else { "blocked" }
    );

    load_user(&state, &id).await.map(ok)
}

async fn verify_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<User>>> {
    guard::authorize(&user.actor(), Action::ManageUsers)?;

    let target = load_user(&state, &id).await?;

    sqlx::query("UPDATE users SET verified = 1 WHERE id = ?")
        .bind(&target.id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("admin {} verified user {id}", user.id);

    load_user(&state, &id).await.map(ok)
}

async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<MessageResponse>>> {
    guard::authorize(&user.actor(), Action::ManageUsers)?;

    if id == user.id {
        return Err(AppError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::warn!("admin {} deleted user {id}", user.id);

    Ok(ok(MessageResponse::new("User deleted")))
}

#[derive(Debug, Deserialize)]
pub struct AdminProjectFilters {
    pub status: Option<ProjectStatus>,
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminProjectRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: ProjectStatus,
    pub client_id: String,
    pub client_name: String,
    pub freelancer_id: Option<String>,
    pub freelancer_name: Option<String>,
    pub budget_min: i64,
    pub budget_max: i64,
    pub agreed_budget: Option<i64>,
    pub created_at: DateTime<Utc>,
}

const ADMIN_PROJECT_SELECT: &str = "SELECT p.id, p.title, p.description, p.category, p.status, \
    p.client_id, uc.name AS client_name, p.freelancer_id, uf.name AS freelancer_name, \
    p.budget_min, p.budget_max, p.agreed_budget, p.created_at \
    FROM projects p \
    JOIN users uc ON p.client_id = uc.id \
    LEFT JOIN users uf ON p.freelancer_id = uf.id";

const ADMIN_PROJECT_COUNT: &str = "SELECT COUNT(*) \
    FROM projects p \
    JOIN users uc ON p.client_id = uc.id \
    LEFT JOIN users uf ON p.freelancer_id = uf.id";

fn push_project_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &AdminProjectFilters) {
    if let Some(status) = filters.status {
        qb.push(" AND p.status = ").push_bind(status);
    }
    if let Some(category) = &filters.category {
        qb.push(" AND p.category = ").push_bind(category.clone());
    }
    if let Some(search) = &filters.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(p.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(p.description) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(uc.name) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Platform-wide project oversight. Cancellation and completion reuse the
/// regular project endpoints, where the guard grants admins the override.
async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<AdminProjectFilters>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Paginated<AdminProjectRow>>>> {
    guard::authorize(&user.actor(), Action::AdministerPlatform)?;

    let mut count_qb = QueryBuilder::<Sqlite>::new(ADMIN_PROJECT_COUNT);
    count_qb.push(" WHERE 1 = 1");
    push_project_filters(&mut count_qb, &filters);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(&state.db.pool)
        .await?;

    let mut qb = QueryBuilder::<Sqlite>::new(ADMIN_PROJECT_SELECT);
    qb.push(" WHERE 1 = 1");
    push_project_filters(&mut qb, &filters);
    qb.push(" ORDER BY p.created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let items = qb
        .build_query_as::<AdminProjectRow>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ok(Paginated::new(items, total, &pagination)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub total_users: i64,
    pub new_users: i64,
    pub active_projects: i64,
    pub completed_projects: i64,
    pub open_disputes: i64,
    pub monthly_revenue: i64,
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<DashboardResponse>>> {
    guard::authorize(&user.actor(), Action::AdministerPlatform)?;

    let cutoff = Utc::now() - chrono::Duration::days(30);

    let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db.pool)
        .await?;

    let new_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE created_at >= ?")
        .bind(cutoff)
        .fetch_one(&state.db.pool)
        .await?;

    let active_projects =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE status = ?")
            .bind(ProjectStatus::InProgress)
            .fetch_one(&state.db.pool)
            .await?;

    let completed_projects =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE status = ?")
            .bind(ProjectStatus::Completed)
            .fetch_one(&state.db.pool)
            .await?;

    let open_disputes = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM disputes WHERE status IN ('open', 'in_progress')",
    )
    .fetch_one(&state.db.pool)
    .await?;

    let monthly_revenue = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount - refunded), 0) FROM payments WHERE status IN ('released', 'refunded') AND released_at >= ?",
    )
    .bind(cutoff)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(ok(DashboardResponse {
        total_users,
        new_users,
        active_projects,
        completed_projects,
        open_disputes,
        monthly_revenue,
    }))
}
