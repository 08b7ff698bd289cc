use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::{Application, Project},
    domain::{
        application::{self, ApplicationStatus, RejectOutcome},
        guard::{self, Action},
        project::ProjectStatus,
    },
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_application))
        .route("/mine", get(my_applications))
        .route("/project/:project_id", get(list_project_applications))
        .route("/:id/accept", post(accept_application))
        .route("/:id/reject", post(reject_application))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitApplicationRequest {
    pub project_id: String,
    pub proposed_budget: i64,
    pub proposed_duration: String,
    #[serde(default)]
    pub cover_letter: String,
}

async fn load_project(state: &AppState, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn load_application(state: &AppState, id: &str) -> Result<Application> {
    sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))
}

async fn submit_application(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SubmitApplicationRequest>,
) -> Result<Json<Envelope<Application>>> {
    guard::authorize(&user.actor(), Action::SubmitApplication)?;

    if body.proposed_budget <= 0 {
        return Err(AppError::Validation(
            "Proposed budget must be positive".to_string(),
        ));
    }
    if body.proposed_duration.trim().is_empty() {
        return Err(AppError::Validation(
            "Proposed duration is required".to_string(),
        ));
    }

    let project = load_project(&state, &body.project_id).await?;
    application::ensure_open_for_applications(project.status)?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM applications WHERE project_id = ? AND freelancer_id = ?",
    )
    .bind(&body.project_id)
    .bind(&user.id)
    .fetch_one(&state.db.pool)
    .await?;

    if existing > 0 {
        return Err(AppError::Domain(crate::domain::DomainError::Conflict(
            "You have already applied to this project".to_string(),
        )));
    }

    let application = Application {
        id: Uuid::new_v4().to_string(),
        project_id: body.project_id,
        freelancer_id: user.id.clone(),
        proposed_budget: body.proposed_budget,
        proposed_duration: body.proposed_duration,
        cover_letter: body.cover_letter,
        status: ApplicationStatus::Pending,
        submitted_at: Utc::now(),
        decided_at: None,
    };

    sqlx::query(
        "INSERT INTO applications (id, project_id, freelancer_id, proposed_budget, proposed_duration, cover_letter, status, submitted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&application.id)
    .bind(&application.project_id)
    .bind(&application.freelancer_id)
    .bind(application.proposed_budget)
    .bind(&application.proposed_duration)
    .bind(&application.cover_letter)
    .bind(application.status)
    .bind(application.submitted_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        "freelancer {} applied to project {}",
        user.id,
        application.project_id
    );

    Ok(ok(application))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MyApplicationResponse {
    pub id: String,
    pub project_id: String,
    pub project_title: String,
    pub proposed_budget: i64,
    pub proposed_duration: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

async fn my_applications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<Vec<MyApplicationResponse>>>> {
    let applications = sqlx::query_as::<_, MyApplicationResponse>(
        r#"
        SELECT a.id, a.project_id, p.title AS project_title, a.proposed_budget,
               a.proposed_duration, a.status, a.submitted_at
        FROM applications a
        JOIN projects p ON a.project_id = p.id
        WHERE a.freelancer_id = ?
        ORDER BY a.submitted_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(ok(applications))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectApplicationResponse {
    pub id: String,
    pub project_id: String,
    pub freelancer_id: String,
    pub freelancer_name: String,
    pub proposed_budget: i64,
    pub proposed_duration: String,
    pub cover_letter: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

async fn list_project_applications(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Envelope<Vec<ProjectApplicationResponse>>>> {
    let project = load_project(&state, &project_id).await?;
    guard::authorize(&user.actor(), Action::ViewApplications { owner: &project.client_id })?;

    let applications = sqlx::query_as::<_, ProjectApplicationResponse>(
        r#"
        SELECT a.id, a.project_id, a.freelancer_id, u.name AS freelancer_name,
               a.proposed_budget, a.proposed_duration, a.cover_letter, a.status, a.submitted_at
        FROM applications a
        JOIN users u ON a.freelancer_id = u.id
        WHERE a.project_id = ?
        ORDER BY a.submitted_at DESC
        "#,
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(ok(applications))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptApplicationResponse {
    pub application_id: String,
    pub application_status: ApplicationStatus,
    pub rejected_application_ids: Vec<String>,
    pub project_status: ProjectStatus,
}

/// One atomic competition resolution: the winner is accepted, every other
/// pending application is rejected, and the project is awarded.
async fn accept_application(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<AcceptApplicationResponse>>> {
    let application = load_application(&state, &id).await?;
    let project = load_project(&state, &application.project_id).await?;
    guard::authorize(&user.actor(), Action::DecideApplication { owner: &project.client_id })?;

    let siblings = sqlx::query_as::<_, (String, ApplicationStatus)>(
        "SELECT id, status FROM applications WHERE project_id = ? AND id != ?",
    )
    .bind(&application.project_id)
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    let outcome = application::accept(project.status, &id, application.status, &siblings)?;

    let now = Utc::now();
    let mut tx = state.db.pool.begin().await?;

    sqlx::query("UPDATE applications SET status = ?, decided_at = ? WHERE id = ?")
        .bind(ApplicationStatus::Accepted)
        .bind(now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE applications SET status = ?, decided_at = ? WHERE project_id = ? AND status = ? AND id != ?",
    )
    .bind(ApplicationStatus::Rejected)
    .bind(now)
    .bind(&application.project_id)
    .bind(ApplicationStatus::Pending)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE projects SET status = ?, freelancer_id = ?, agreed_budget = ?, updated_at = ? WHERE id = ?",
    )
    .bind(outcome.project_status)
    .bind(&application.freelancer_id)
    .bind(application.proposed_budget)
    .bind(now)
    .bind(&application.project_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "client {} accepted application {id} on project {}, rejecting {} others",
        user.id,
        application.project_id,
        outcome.rejected_ids.len()
    );

    Ok(ok(AcceptApplicationResponse {
        application_id: outcome.accepted_id,
        application_status: ApplicationStatus::Accepted,
        rejected_application_ids: outcome.rejected_ids,
        project_status: outcome.project_status,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectApplicationResponse {
    pub application_id: String,
    pub status: ApplicationStatus,
}

async fn reject_application(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<RejectApplicationResponse>>> {
    let application = load_application(&state, &id).await?;
    let project = load_project(&state, &application.project_id).await?;
    guard::authorize(&user.actor(), Action::DecideApplication { owner: &project.client_id })?;

    match application::reject(application.status)? {
        RejectOutcome::Rejected => {
            sqlx::query("UPDATE applications SET status = ?, decided_at = ? WHERE id = ?")
                .bind(ApplicationStatus::Rejected)
                .bind(Utc::now())
                .bind(&id)
                .execute(&state.db.pool)
                .await?;

            tracing::info!("client {} rejected application {id}", user.id);
        }
        RejectOutcome::AlreadyRejected => {}
    }

    Ok(ok(RejectApplicationResponse {
        application_id: id,
        status: ApplicationStatus::Rejected,
    }))
}
