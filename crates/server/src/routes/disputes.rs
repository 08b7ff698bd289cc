use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    db::models::{Dispute, DisputeMessage, Payment, Project},
    domain::{
        actor::Role,
        dispute::{self, DisputePriority, DisputeStatus, Resolution, ResolutionKind},
        guard::{self, Action},
        ledger::{self, PaymentStatus},
        DomainError,
    },
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    routes::{Paginated, Pagination},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_disputes).post(create_dispute))
        .route("/mine", get(my_disputes))
        .route("/:id", get(get_dispute))
        .route("/:id/status", put(update_status))
        .route("/:id/resolve", post(resolve_dispute))
        .route("/:id/messages", get(list_messages).post(add_message))
}

async fn load_project(state: &AppState, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn load_dispute(state: &AppState, id: &str) -> Result<Dispute> {
    sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Dispute not found".to_string()))
}

fn ensure_party(dispute: &Dispute, user: &AuthUser) -> Result<()> {
    let involved =
        user.role == Role::Admin || dispute.reported_by == user.id || dispute.against == user.id;
    if involved {
        Ok(())
    } else {
        Err(AppError::Domain(DomainError::PermissionDenied))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDisputeRequest {
    pub project_id: String,
    pub payment_id: Option<String>,
    pub reason: String,
    pub priority: Option<DisputePriority>,
}

/// Any involved party may open a dispute against the other; attaching a
/// payment freezes it until the dispute resolves.
async fn create_dispute(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateDisputeRequest>,
) -> Result<Json<Envelope<Dispute>>> {
    let project = load_project(&state, &body.project_id).await?;
    guard::authorize(
        &user.actor(),
        Action::DisputePayment {
            owner: &project.client_id,
            assignee: project.freelancer_id.as_deref(),
        },
    )?;

    if body.reason.trim().is_empty() {
        return Err(AppError::Validation("A reason is required".to_string()));
    }

    let against = if user.id == project.client_id {
        project.freelancer_id.clone().ok_or_else(|| {
            AppError::Domain(DomainError::Conflict(
                "Project has no assigned freelancer to dispute against".to_string(),
            ))
        })?
    } else {
        project.client_id.clone()
    };

    // When a payment is attached it must belong to the project and be frozen
    // alongside the dispute.
    let frozen_payment = match &body.payment_id {
        Some(payment_id) => {
            let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
                .bind(payment_id)
                .fetch_optional(&state.db.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
            if payment.project_id != body.project_id {
                return Err(AppError::Validation(
                    "Payment does not belong to this project".to_string(),
                ));
            }
            Some((payment.id.clone(), ledger::dispute_payment(payment.status)?))
        }
        None => None,
    };

    let dispute = Dispute {
        id: Uuid::new_v4().to_string(),
        project_id: body.project_id,
        payment_id: body.payment_id,
        reported_by: user.id.clone(),
        against,
        reason: body.reason.trim().to_string(),
        status: DisputeStatus::Open,
        priority: body.priority.unwrap_or(DisputePriority::Medium),
        resolution: None,
        refund_amount: None,
        notes: None,
        created_at: Utc::now(),
        resolved_at: None,
        resolved_by: None,
    };

    let mut tx = state.db.pool.begin().await?;

    if let Some((payment_id, status)) = &frozen_payment {
        sqlx::query("UPDATE payments SET status = ? WHERE id = ?")
            .bind(status)
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "INSERT INTO disputes (id, project_id, payment_id, reported_by, against, reason, status, priority, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&dispute.id)
    .bind(&dispute.project_id)
    .bind(&dispute.payment_id)
    .bind(&dispute.reported_by)
    .bind(&dispute.against)
    .bind(&dispute.reason)
    .bind(dispute.status)
    .bind(dispute.priority)
    .bind(dispute.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::warn!(
        "{} opened dispute {} on project {}",
        user.id,
        dispute.id,
        dispute.project_id
    );

    Ok(ok(dispute))
}

#[derive(Debug, Deserialize)]
pub struct DisputeFilters {
    pub status: Option<DisputeStatus>,
    pub priority: Option<DisputePriority>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DisputeListItem {
    pub id: String,
    pub project_id: String,
    pub project_title: String,
    pub payment_id: Option<String>,
    pub reported_by: String,
    pub reported_by_name: String,
    pub against: String,
    pub against_name: String,
    pub reason: String,
    pub status: DisputeStatus,
    pub priority: DisputePriority,
    pub resolution: Option<ResolutionKind>,
    pub created_at: DateTime<Utc>,
}

const DISPUTE_SELECT: &str = "SELECT d.id, d.project_id, p.title AS project_title, d.payment_id, \
    d.reported_by, ur.name AS reported_by_name, d.against, ua.name AS against_name, d.reason, \
    d.status, d.priority, d.resolution, d.created_at \
    FROM disputes d \
    JOIN projects p ON d.project_id = p.id \
    JOIN users ur ON d.reported_by = ur.id \
    JOIN users ua ON d.against = ua.id";

const DISPUTE_COUNT: &str = "SELECT COUNT(*) FROM disputes d";

fn push_dispute_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &DisputeFilters) {
    if let Some(status) = filters.status {
        qb.push(" AND d.status = ").push_bind(status);
    }
    if let Some(priority) = filters.priority {
        qb.push(" AND d.priority = ").push_bind(priority);
    }
}

/// Admin triage queue.
async fn list_disputes(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<DisputeFilters>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Paginated<DisputeListItem>>>> {
    guard::authorize(&user.actor(), Action::ManageDisputes)?;

    let mut count_qb = QueryBuilder::<Sqlite>::new(DISPUTE_COUNT);
    count_qb.push(" WHERE 1 = 1");
    push_dispute_filters(&mut count_qb, &filters);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(&state.db.pool)
        .await?;

    let mut qb = QueryBuilder::<Sqlite>::new(DISPUTE_SELECT);
    qb.push(" WHERE 1 = 1");
    push_dispute_filters(&mut qb, &filters);
    qb.push(" ORDER BY d.created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let items = qb
        .build_query_as::<DisputeListItem>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ok(Paginated::new(items, total, &pagination)))
}

async fn my_disputes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<Vec<Dispute>>>> {
    let disputes = sqlx::query_as::<_, Dispute>(
        "SELECT * FROM disputes WHERE reported_by = ? OR against = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(ok(disputes))
}

async fn get_dispute(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Dispute>>> {
    let dispute = load_dispute(&state, &id).await?;
    ensure_party(&dispute, &user)?;
    Ok(ok(dispute))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDisputeStatusRequest {
    pub status: DisputeStatus,
}

/// An admin takes an open dispute under review; terminal states are only
/// reached through the resolve endpoint.
async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateDisputeStatusRequest>,
) -> Result<Json<Envelope<Dispute>>> {
    guard::authorize(&user.actor(), Action::ManageDisputes)?;

    let mut dispute = load_dispute(&state, &id).await?;

    if body.status != DisputeStatus::InProgress {
        return Err(AppError::Validation(
            "Disputes are closed through the resolve endpoint".to_string(),
        ));
    }

    let status = dispute::begin_review(dispute.status)?;

    sqlx::query("UPDATE disputes SET status = ? WHERE id = ?")
        .bind(status)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("admin {} took dispute {id} under review", user.id);

    dispute.status = status;
    Ok(ok(dispute))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDisputeRequest {
    pub resolution: ResolutionKind,
    pub refund_amount: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDisputeResponse {
    pub dispute_id: String,
    pub status: DisputeStatus,
    pub resolution: ResolutionKind,
    pub refund_amount: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
}

async fn resolve_dispute(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ResolveDisputeRequest>,
) -> Result<Json<Envelope<ResolveDisputeResponse>>> {
    guard::authorize(&user.actor(), Action::ResolveDispute)?;

    let dispute = load_dispute(&state, &id).await?;

    let resolution = match body.resolution {
        ResolutionKind::ClientFavor => Resolution::ClientFavor,
        ResolutionKind::FreelancerFavor => Resolution::FreelancerFavor,
        ResolutionKind::Dismiss => Resolution::Dismiss,
        ResolutionKind::Refund => {
            let amount = body.refund_amount.ok_or_else(|| {
                AppError::Validation("A refund amount is required".to_string())
            })?;
            Resolution::Refund(amount)
        }
    };

    let payment = match &dispute.payment_id {
        Some(payment_id) => {
            let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
                .bind(payment_id)
                .fetch_optional(&state.db.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
            Some(payment)
        }
        None => None,
    };

    let outcome = dispute::resolve(
        dispute.status,
        &resolution,
        payment
            .as_ref()
            .map(|p| (p.amount - p.refunded, p.status)),
    )?;

    let now = Utc::now();
    let notes = body.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let refund_amount = (outcome.refund > 0).then_some(outcome.refund);

    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        "UPDATE disputes SET status = ?, resolution = ?, refund_amount = ?, notes = ?, resolved_at = ?, resolved_by = ? WHERE id = ?",
    )
    .bind(outcome.dispute_status)
    .bind(resolution.kind())
    .bind(refund_amount)
    .bind(notes)
    .bind(now)
    .bind(&user.id)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    if let (Some(payment), Some(status)) = (&payment, outcome.payment_status) {
        sqlx::query("UPDATE payments SET status = ?, refunded = refunded + ? WHERE id = ?")
            .bind(status)
            .bind(outcome.refund)
            .bind(&payment.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "admin {} resolved dispute {id} as {}",
        user.id,
        match resolution.kind() {
            ResolutionKind::ClientFavor => "client_favor",
            ResolutionKind::FreelancerFavor => "freelancer_favor",
            ResolutionKind::Refund => "refund",
            ResolutionKind::Dismiss => "dismiss",
        }
    );

    Ok(ok(ResolveDisputeResponse {
        dispute_id: id,
        status: outcome.dispute_status,
        resolution: resolution.kind(),
        refund_amount,
        payment_status: outcome.payment_status,
        notes: notes.map(str::to_string),
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<DisputeMessage>>>> {
    let dispute = load_dispute(&state, &id).await?;
    ensure_party(&dispute, &user)?;

    let messages = sqlx::query_as::<_, DisputeMessage>(
        "SELECT * FROM dispute_messages WHERE dispute_id = ? ORDER BY created_at ASC",
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(ok(messages))
}

#[derive(Debug, Deserialize)]
pub struct AddMessageRequest {
    pub message: String,
}

async fn add_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AddMessageRequest>,
) -> Result<Json<Envelope<DisputeMessage>>> {
    let dispute = load_dispute(&state, &id).await?;
    ensure_party(&dispute, &user)?;

    if body.message.trim().is_empty() {
        return Err(AppError::Validation("Message is required".to_string()));
    }

    let message = DisputeMessage {
        id: Uuid::new_v4().to_string(),
        dispute_id: dispute.id,
        author_id: user.id,
        body: body.message.trim().to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO dispute_messages (id, dispute_id, author_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(&message.dispute_id)
    .bind(&message.author_id)
    .bind(&message.body)
    .bind(message.created_at)
    .execute(&state.db.pool)
    .await?;

    Ok(ok(message))
}
