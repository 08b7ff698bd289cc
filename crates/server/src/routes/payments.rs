use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    db::models::{Dispute, Milestone, Payment, Project},
    domain::{
        actor::Role,
        dispute::{DisputePriority, DisputeStatus},
        guard::{self, Action},
        ledger::{self, Ledger, MilestoneStatus, PaymentKind, PaymentStatus},
        project::ProjectStatus,
        DomainError,
    },
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    routes::{Paginated, Pagination},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/project/:project_id/summary", get(budget_summary))
        .route("/project/:project_id/milestones", post(create_milestone))
        .route("/project/:project_id/request", post(request_project_payment))
        .route("/milestones/:id/start", post(start_milestone))
        .route("/milestones/:id/complete", post(complete_milestone))
        .route("/milestones/:id/request", post(request_milestone_payment))
        .route("/history", get(payment_history))
        .route("/:id/approve", post(approve_payment))
        .route("/:id/release", post(release_payment))
        .route("/:id/dispute", post(dispute_payment))
}

async fn load_project(state: &AppState, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn load_milestone(state: &AppState, id: &str) -> Result<Milestone> {
    sqlx::query_as::<_, Milestone>("SELECT * FROM milestones WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Milestone not found".to_string()))
}

async fn load_payment(state: &AppState, id: &str) -> Result<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
}

/// Assembles the escrow totals for an awarded project.
async fn load_ledger(state: &AppState, project: &Project) -> Result<Ledger> {
    let total_budget = project.agreed_budget.ok_or_else(|| {
        AppError::Domain(DomainError::Conflict(
            "Project has not been awarded yet".to_string(),
        ))
    })?;

    let allocated = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(budget), 0) FROM milestones WHERE project_id = ?",
    )
    .bind(&project.id)
    .fetch_one(&state.db.pool)
    .await?;

    let spent = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(spent), 0) FROM milestones WHERE project_id = ?",
    )
    .bind(&project.id)
    .fetch_one(&state.db.pool)
    .await?;

    let released = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount - refunded), 0) FROM payments WHERE project_id = ? AND status IN ('released', 'refunded')",
    )
    .bind(&project.id)
    .fetch_one(&state.db.pool)
    .await?;

    let pending = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE project_id = ? AND status IN ('pending_approval', 'pending_release')",
    )
    .bind(&project.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Ledger {
        total_budget,
        allocated,
        spent,
        released,
        pending,
    })
}

fn ensure_involved(project: &Project, user: &AuthUser) -> Result<()> {
    let involved = user.role == Role::Admin
        || project.client_id == user.id
        || project.freelancer_id.as_deref() == Some(user.id.as_str());
    if involved {
        Ok(())
    } else {
        Err(AppError::Domain(DomainError::PermissionDenied))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummaryResponse {
    pub project_id: String,
    pub total_budget: i64,
    pub allocated: i64,
    pub spent: i64,
    pub remaining: i64,
    pub escrow: i64,
    pub released: i64,
    pub pending: i64,
    pub milestones: Vec<Milestone>,
}

async fn budget_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Envelope<BudgetSummaryResponse>>> {
    let project = load_project(&state, &project_id).await?;
    ensure_involved(&project, &user)?;

    let ledger = load_ledger(&state, &project).await?;

    let milestones = sqlx::query_as::<_, Milestone>(
        "SELECT * FROM milestones WHERE project_id = ? ORDER BY created_at ASC",
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(ok(BudgetSummaryResponse {
        project_id,
        total_budget: ledger.total_budget,
        allocated: ledger.allocated,
        spent: ledger.spent,
        remaining: ledger.remaining(),
        escrow: ledger.escrow(),
        released: ledger.released,
        pending: ledger.pending,
        milestones,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMilestoneRequest {
    pub title: String,
    pub budget: i64,
    pub due_date: Option<NaiveDate>,
}

/// Allocates a slice of the agreed budget to a new milestone.
async fn create_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateMilestoneRequest>,
) -> Result<Json<Envelope<Milestone>>> {
    let project = load_project(&state, &project_id).await?;
    guard::authorize(&user.actor(), Action::CreateMilestone { owner: &project.client_id })?;

    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if project.status != ProjectStatus::InProgress {
        return Err(AppError::Domain(DomainError::Conflict(
            "Milestones can only be added to an active project".to_string(),
        )));
    }

    let ledger = load_ledger(&state, &project).await?;
    ledger.check_allocate(body.budget)?;

    let milestone = Milestone {
        id: Uuid::new_v4().to_string(),
        project_id,
        title: body.title,
        budget: body.budget,
        spent: 0,
        status: MilestoneStatus::Pending,
        due_date: body.due_date,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO milestones (id, project_id, title, budget, spent, status, due_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&milestone.id)
    .bind(&milestone.project_id)
    .bind(&milestone.title)
    .bind(milestone.budget)
    .bind(milestone.spent)
    .bind(milestone.status)
    .bind(milestone.due_date)
    .bind(milestone.created_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        "allocated {} to milestone {} on project {}",
        milestone.budget,
        milestone.id,
        milestone.project_id
    );

    Ok(ok(milestone))
}

async fn transition_milestone(
    state: &AppState,
    user: &AuthUser,
    id: &str,
    next: fn(MilestoneStatus) -> std::result::Result<MilestoneStatus, DomainError>,
) -> Result<Milestone> {
    let mut milestone = load_milestone(state, id).await?;
    let project = load_project(state, &milestone.project_id).await?;
    guard::authorize(
        &user.actor(),
        Action::UpdateMilestone {
            owner: &project.client_id,
            assignee: project.freelancer_id.as_deref(),
        },
    )?;

    let status = next(milestone.status)?;

    sqlx::query("UPDATE milestones SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("milestone {id} moved to {}", status.as_str());

    milestone.status = status;
    Ok(milestone)
}

async fn start_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Milestone>>> {
    transition_milestone(&state, &user, &id, ledger::start_milestone)
        .await
        .map(ok)
}

async fn complete_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Milestone>>> {
    transition_milestone(&state, &user, &id, ledger::complete_milestone)
        .await
        .map(ok)
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

/// The assigned freelancer requests payment against a milestone; the spend is
/// recorded immediately and only the approval/release flow remains.
async fn request_milestone_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<Envelope<Payment>>> {
    let milestone = load_milestone(&state, &id).await?;
    let project = load_project(&state, &milestone.project_id).await?;
    guard::authorize(
        &user.actor(),
        Action::RequestPayment { assignee: project.freelancer_id.as_deref() },
    )?;

    let ledger_state = load_ledger(&state, &project).await?;
    ledger_state.check_payment_request(body.amount)?;
    ledger::check_spend(milestone.budget, milestone.spent, body.amount)?;
    let kind = ledger::payment_kind(Some(milestone.status))?;

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        milestone_id: Some(milestone.id.clone()),
        freelancer_id: user.id.clone(),
        amount: body.amount,
        refunded: 0,
        status: PaymentStatus::PendingApproval,
        kind,
        description: body.description,
        created_at: Utc::now(),
        released_at: None,
    };

    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        "INSERT INTO payments (id, project_id, milestone_id, freelancer_id, amount, refunded, status, kind, description, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment.id)
    .bind(&payment.project_id)
    .bind(&payment.milestone_id)
    .bind(&payment.freelancer_id)
    .bind(payment.amount)
    .bind(payment.refunded)
    .bind(payment.status)
    .bind(payment.kind)
    .bind(&payment.description)
    .bind(payment.created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE milestones SET spent = spent + ? WHERE id = ?")
        .bind(payment.amount)
        .bind(&milestone.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "freelancer {} requested {} against milestone {}",
        user.id,
        payment.amount,
        milestone.id
    );

    Ok(ok(payment))
}

/// Payment request for the project as a whole, outside any milestone.
async fn request_project_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<Envelope<Payment>>> {
    let project = load_project(&state, &project_id).await?;
    guard::authorize(
        &user.actor(),
        Action::RequestPayment { assignee: project.freelancer_id.as_deref() },
    )?;

    let ledger_state = load_ledger(&state, &project).await?;
    ledger_state.check_payment_request(body.amount)?;
    let kind = ledger::payment_kind(None)?;

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        project_id,
        milestone_id: None,
        freelancer_id: user.id.clone(),
        amount: body.amount,
        refunded: 0,
        status: PaymentStatus::PendingApproval,
        kind,
        description: body.description,
        created_at: Utc::now(),
        released_at: None,
    };

    sqlx::query(
        "INSERT INTO payments (id, project_id, milestone_id, freelancer_id, amount, refunded, status, kind, description, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment.id)
    .bind(&payment.project_id)
    .bind(&payment.milestone_id)
    .bind(&payment.freelancer_id)
    .bind(payment.amount)
    .bind(payment.refunded)
    .bind(payment.status)
    .bind(payment.kind)
    .bind(&payment.description)
    .bind(payment.created_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        "freelancer {} requested {} on project {}",
        user.id,
        payment.amount,
        payment.project_id
    );

    Ok(ok(payment))
}

async fn approve_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Payment>>> {
    let mut payment = load_payment(&state, &id).await?;
    let project = load_project(&state, &payment.project_id).await?;
    guard::authorize(&user.actor(), Action::ApprovePayment { owner: &project.client_id })?;

    let status = ledger::approve_payment(payment.status)?;

    sqlx::query("UPDATE payments SET status = ? WHERE id = ?")
        .bind(status)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("client {} approved payment {id}", user.id);

    payment.status = status;
    Ok(ok(payment))
}

/// Irreversible: moves the amount from pending to released escrow.
async fn release_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Payment>>> {
    let mut payment = load_payment(&state, &id).await?;
    let project = load_project(&state, &payment.project_id).await?;
    guard::authorize(&user.actor(), Action::ReleasePayment { owner: &project.client_id })?;

    let status = ledger::release_payment(payment.status)?;
    let now = Utc::now();

    sqlx::query("UPDATE payments SET status = ?, released_at = ? WHERE id = ?")
        .bind(status)
        .bind(now)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!("{} released payment {id} of {}", user.id, payment.amount);

    payment.status = status;
    payment.released_at = Some(now);
    Ok(ok(payment))
}

#[derive(Debug, Deserialize)]
pub struct DisputePaymentRequest {
    pub reason: String,
    pub priority: Option<DisputePriority>,
}

/// Freezes the payment and opens a dispute against the other party.
async fn dispute_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<DisputePaymentRequest>,
) -> Result<Json<Envelope<Dispute>>> {
    let payment = load_payment(&state, &id).await?;
    let project = load_project(&state, &payment.project_id).await?;
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

    let status = ledger::dispute_payment(payment.status)?;

    let against = if user.id == project.client_id {
        payment.freelancer_id.clone()
    } else {
        project.client_id.clone()
    };

    let dispute = Dispute {
        id: Uuid::new_v4().to_string(),
        project_id: payment.project_id.clone(),
        payment_id: Some(payment.id.clone()),
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

    sqlx::query("UPDATE payments SET status = ? WHERE id = ?")
        .bind(status)
        .bind(&payment.id)
        .execute(&mut *tx)
        .await?;

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
        "{} disputed payment {} on project {}",
        user.id,
        payment.id,
        payment.project_id
    );

    Ok(ok(dispute))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryItem {
    pub id: String,
    pub project_id: String,
    pub project_title: String,
    pub freelancer_id: String,
    pub freelancer_name: String,
    pub amount: i64,
    pub refunded: i64,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

const HISTORY_SELECT: &str = "SELECT pay.id, pay.project_id, pr.title AS project_title, \
    pay.freelancer_id, u.name AS freelancer_name, pay.amount, pay.refunded, pay.status, \
    pay.kind, pay.description, pay.created_at \
    FROM payments pay \
    JOIN projects pr ON pay.project_id = pr.id \
    JOIN users u ON pay.freelancer_id = u.id";

const HISTORY_COUNT: &str = "SELECT COUNT(*) \
    FROM payments pay \
    JOIN projects pr ON pay.project_id = pr.id \
    JOIN users u ON pay.freelancer_id = u.id";

fn push_history_scope(qb: &mut QueryBuilder<'_, Sqlite>, user: &AuthUser) {
    match user.role {
        Role::Client => {
            qb.push(" WHERE pr.client_id = ").push_bind(user.id.clone());
        }
        Role::Freelancer => {
            qb.push(" WHERE pay.freelancer_id = ").push_bind(user.id.clone());
        }
        Role::Admin => {}
    }
}

/// Role-scoped payment history, newest first.
async fn payment_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Paginated<PaymentHistoryItem>>>> {
    let mut count_qb = QueryBuilder::<Sqlite>::new(HISTORY_COUNT);
    push_history_scope(&mut count_qb, &user);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(&state.db.pool)
        .await?;

    let mut qb = QueryBuilder::<Sqlite>::new(HISTORY_SELECT);
    push_history_scope(&mut qb, &user);
    qb.push(" ORDER BY pay.created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let items = qb
        .build_query_as::<PaymentHistoryItem>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(ok(Paginated::new(items, total, &pagination)))
}
