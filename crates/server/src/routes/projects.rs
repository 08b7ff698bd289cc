use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json as DbJson, QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    db::models::Project,
    domain::{
        application::ApplicationStatus,
        guard::{self, Action},
        ledger::MilestoneStatus,
        project::{self, ProjectStatus},
    },
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    routes::{meta::CATEGORIES, MessageResponse, Paginated, Pagination},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/mine", get(my_projects))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/cancel", post(cancel_project))
        .route("/:id/complete", post(complete_project))
}

const PROJECT_SELECT: &str = "SELECT p.id, p.client_id, p.freelancer_id, p.title, p.description, \
    p.category, p.budget_min, p.budget_max, p.agreed_budget, p.status, p.deadline, p.skills, \
    p.cancel_reason, p.created_at, p.updated_at, \
    (SELECT COUNT(*) FROM applications a WHERE a.project_id = p.id) AS proposal_count \
    FROM projects p";

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    pub id: String,
    pub client_id: String,
    pub freelancer_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget_min: i64,
    pub budget_max: i64,
    pub agreed_budget: Option<i64>,
    pub status: ProjectStatus,
    pub deadline: Option<NaiveDate>,
    pub skills: DbJson<Vec<String>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub proposal_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilters {
    pub category: Option<String>,
    pub min_budget: Option<i64>,
    pub max_budget: Option<i64>,
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &ProjectFilters) {
    if let Some(category) = &filters.category {
        qb.push(" AND p.category = ").push_bind(category.clone());
    }
    if let Some(min) = filters.min_budget {
        qb.push(" AND p.budget_max >= ").push_bind(min);
    }
    if let Some(max) = filters.max_budget {
        qb.push(" AND p.budget_min <= ").push_bind(max);
    }
    if let Some(search) = &filters.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(p.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(p.description) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Marketplace listing; shows open projects unless a status filter is given.
async fn list_projects(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filters): Query<ProjectFilters>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Paginated<ProjectResponse>>>> {
    let status = filters.status.unwrap_or(ProjectStatus::Open);

    let mut count_qb =
        QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects p WHERE p.status = ");
    count_qb.push_bind(status);
    push_filters(&mut count_qb, &filters);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(&state.db.pool)
        .await?;

    let mut qb = QueryBuilder::<Sqlite>::new(PROJECT_SELECT);
    qb.push(" WHERE p.status = ").push_bind(status);
    push_filters(&mut qb, &filters);
    qb.push(" ORDER BY p.created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let items = qb
        .build_query_as::<ProjectResponse>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ok(Paginated::new(items, total, &pagination)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget_min: i64,
    pub budget_max: i64,
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub skills: Vec<String>,
}

fn validate_project_fields(
    title: &str,
    description: &str,
    category: &str,
    budget_min: i64,
    budget_max: i64,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if description.trim().is_empty() {
        return Err(AppError::Validation("Description is required".to_string()));
    }
    if !CATEGORIES.contains(&category) {
        return Err(AppError::Validation("Unknown category".to_string()));
    }
    if budget_min <= 0 {
        return Err(AppError::Validation(
            "Minimum budget must be positive".to_string(),
        ));
    }
    if budget_max < budget_min {
        return Err(AppError::Validation(
            "Maximum budget must not be below the minimum".to_string(),
        ));
    }
    Ok(())
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<Envelope<ProjectResponse>>> {
    guard::authorize(&user.actor(), Action::CreateProject)?;
    validate_project_fields(
        &body.title,
        &body.description,
        &body.category,
        body.budget_min,
        body.budget_max,
    )?;

    let project_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO projects (id, client_id, title, description, category, budget_min, budget_max, status, deadline, skills, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&project_id)
    .bind(&user.id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(&body.category)
    .bind(body.budget_min)
    .bind(body.budget_max)
    .bind(ProjectStatus::Open)
    .bind(body.deadline)
    .bind(DbJson(body.skills))
    .bind(now)
    .bind(now)
    .execute(&state.db.pool)
    .await?;

    tracing::info!("client {} created project {project_id}", user.id);

    fetch_project_response(&state, &project_id).await.map(ok)
}

async fn fetch_project_response(state: &AppState, id: &str) -> Result<ProjectResponse> {
    let mut qb = QueryBuilder::<Sqlite>::new(PROJECT_SELECT);
    qb.push(" WHERE p.id = ").push_bind(id.to_string());
    qb.build_query_as::<ProjectResponse>()
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn get_project(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProjectResponse>>> {
    fetch_project_response(&state, &id).await.map(ok)
}

/// Own projects: the ones a client posted, or the ones a freelancer was
/// awarded.
async fn my_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<Vec<ProjectResponse>>>> {
    let column = match user.role {
        crate::domain::actor::Role::Freelancer => "p.freelancer_id",
        _ => "p.client_id",
    };

    let mut qb = QueryBuilder::<Sqlite>::new(PROJECT_SELECT);
    qb.push(" WHERE ")
        .push(column)
        .push(" = ")
        .push_bind(user.id.clone())
        .push(" ORDER BY p.updated_at DESC");

    let projects = qb
        .build_query_as::<ProjectResponse>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ok(projects))
}

async fn load_project(state: &AppState, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub deadline: Option<NaiveDate>,
    pub skills: Option<Vec<String>>,
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Envelope<ProjectResponse>>> {
    let project = load_project(&state, &id).await?;
    guard::authorize(&user.actor(), Action::UpdateProject { owner: &project.client_id })?;
    project::ensure_editable(project.status)?;

    let title = body.title.unwrap_or(project.title);
    let description = body.description.unwrap_or(project.description);
    let category = body.category.unwrap_or(project.category);
    let budget_min = body.budget_min.unwrap_or(project.budget_min);
    let budget_max = body.budget_max.unwrap_or(project.budget_max);
    let deadline = body.deadline.or(project.deadline);
    let skills = body.skills.map(DbJson).unwrap_or(project.skills);

    validate_project_fields(&title, &description, &category, budget_min, budget_max)?;

    sqlx::query(
        "UPDATE projects SET title = ?, description = ?, category = ?, budget_min = ?, budget_max = ?, deadline = ?, skills = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&title)
    .bind(&description)
    .bind(&category)
    .bind(budget_min)
    .bind(budget_max)
    .bind(deadline)
    .bind(skills)
    .bind(Utc::now())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    fetch_project_response(&state, &id).await.map(ok)
}

/// Cancellation is a status, not removal; physical deletion is reserved for
/// administrators.
async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<MessageResponse>>> {
    guard::authorize(&user.actor(), Action::DeleteProject)?;

    let deleted = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Project not found".to_string()));
    }

    tracing::warn!("admin {} deleted project {id}", user.id);

    Ok(ok(MessageResponse::new("Project deleted")))
}

#[derive(Debug, Deserialize)]
pub struct CancelProjectRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelProjectResponse {
    pub id: String,
    pub status: ProjectStatus,
    pub rejected_applications: u64,
}

async fn cancel_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CancelProjectRequest>,
) -> Result<Json<Envelope<CancelProjectResponse>>> {
    let project = load_project(&state, &id).await?;
    guard::authorize(&user.actor(), Action::CancelProject { owner: &project.client_id })?;

    if body.reason.trim().is_empty() {
        return Err(AppError::Validation(
            "A cancellation reason is required".to_string(),
        ));
    }

    project::ensure_transition(project.status, ProjectStatus::Cancelled)?;

    let now = Utc::now();
    let mut tx = state.db.pool.begin().await?;

    sqlx::query("UPDATE projects SET status = ?, cancel_reason = ?, updated_at = ? WHERE id = ?")
        .bind(ProjectStatus::Cancelled)
        .bind(body.reason.trim())
        .bind(now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    // Applications still waiting on a decision lose by implication.
    let rejected = sqlx::query(
        "UPDATE applications SET status = ?, decided_at = ? WHERE project_id = ? AND status = ?",
    )
    .bind(ApplicationStatus::Rejected)
    .bind(now)
    .bind(&id)
    .bind(ApplicationStatus::Pending)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::warn!(
        "{} cancelled project {id}, rejecting {} pending applications",
        user.id,
        rejected.rows_affected()
    );

    Ok(ok(CancelProjectResponse {
        id,
        status: ProjectStatus::Cancelled,
        rejected_applications: rejected.rows_affected(),
    }))
}

async fn complete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProjectResponse>>> {
    let project = load_project(&state, &id).await?;
    guard::authorize(&user.actor(), Action::CompleteProject { owner: &project.client_id })?;

    project::ensure_transition(project.status, ProjectStatus::Completed)?;

    let milestones = sqlx::query_scalar::<_, MilestoneStatus>(
        "SELECT status FROM milestones WHERE project_id = ?",
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    project::ensure_completable(&milestones)?;

    sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
        .bind(ProjectStatus::Completed)
        .bind(Utc::now())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("{} marked project {id} completed", user.id);

    fetch_project_response(&state, &id).await.map(ok)
}
