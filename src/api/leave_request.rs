use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::leave_request::{
        LEAVE_SELECT, LeaveRequest, LeaveStatus, LeaveType, ReviewDecision, ReviewError, review_reason,
        validate_review,
    },
    utils::{
        db_utils::{Filter, bind_scalar_values, bind_values},
        pagination::PageWindow,
        validation::Violations,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const MAX_REASON_LEN: usize = 1000;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeave {
    pub leave_type: LeaveType,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "سفر خانوادگی")]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLeave {
    pub status: ReviewDecision,
    /// Required when rejecting
    pub rejection_reason: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LeaveFilter {
    /// Filter by owner (admins and managers only)
    pub user_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 12)]
    pub user_id: u64,
    pub user_name: Option<String>,
    #[schema(value_type = LeaveType)]
    pub leave_type: String,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    /// Inclusive day count
    #[schema(example = 3)]
    pub days: i64,
    pub reason: Option<String>,
    #[schema(value_type = LeaveStatus)]
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl From<LeaveRequest> for LeaveResponse {
    fn from(leave: LeaveRequest) -> Self {
        Self {
            days: leave.days(),
            id: leave.id,
            user_id: leave.user_id,
            user_name: leave.user_name,
            leave_type: leave.leave_type,
            start_date: leave.start_date,
            end_date: leave.end_date,
            reason: leave.reason,
            status: leave.status,
            rejection_reason: leave.rejection_reason,
            reviewed_by: leave.reviewed_by,
            reviewed_at: leave.reviewed_at,
            created_at: leave.created_at,
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::MissingReason => ApiError::validation_with(
                "Invalid input",
                json!([{ "field": "rejectionReason", "message": "is required when rejecting" }]),
            ),
            ReviewError::AlreadyProcessed(status) => ApiError::validation_with(
                "Leave request already processed",
                json!({ "status": status }),
            ),
        }
    }
}

fn validate_create(payload: &CreateLeave, today: NaiveDate) -> ApiResult<()> {
    let mut v = Violations::new();
    v.check(
        payload.start_date <= payload.end_date,
        "startDate",
        "startDate cannot be after endDate",
    );
    v.check(payload.start_date >= today, "startDate", "cannot be in the past");
    v.optional_text("reason", payload.reason.as_deref(), MAX_REASON_LEN);
    v.into_result()
}

async fn find_leave(pool: &MySqlPool, id: u64) -> ApiResult<LeaveRequest> {
    sqlx::query_as::<_, LeaveRequest>(&format!("{} WHERE lr.id = ?", LEAVE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave-requests",
    request_body(content = CreateLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Overlaps another pending or approved request")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> ApiResult<HttpResponse> {
    validate_create(&payload, Utc::now().date_naive())?;

    let overlapping: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM leave_requests
        WHERE user_id = ?
          AND status IN ('PENDING', 'APPROVED')
          AND start_date <= ?
          AND end_date >= ?
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_one(pool.get_ref())
    .await?;

    if overlapping > 0 {
        return Err(ApiError::conflict("Overlaps an existing pending or approved leave request"));
    }

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (user_id, leave_type, start_date, end_date, reason, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(reason)
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Failed to create leave request", e))?;

    let leave = find_leave(pool.get_ref(), result.last_insert_id()).await?;
    info!(leave_id = leave.id, user_id = auth.user_id, "Leave request submitted");

    Ok(HttpResponse::Created().json(LeaveResponse::from(leave)))
}

/* =========================
Review leave (Admin/Manager)
========================= */
#[utoipa::path(
    patch,
    path = "/api/leave-requests/{leave_id}/review",
    params(("leave_id" = u64, Path, description = "ID of the leave request to review")),
    request_body = ReviewLeave,
    responses(
        (status = 200, description = "Leave reviewed", body = LeaveResponse),
        (status = 400, description = "Missing rejection reason or already processed", body = Object, example = json!({
            "message": "Leave request already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn review_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReviewLeave>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;
    let leave_id = path.into_inner();

    review_reason(payload.status, payload.rejection_reason.as_deref())?;

    let leave = find_leave(pool.get_ref(), leave_id).await?;
    let current = leave
        .status()
        .ok_or_else(|| ApiError::internal("Unknown leave status", &leave.status))?;
    let rejection_reason = validate_review(current, payload.status, payload.rejection_reason.as_deref())?;
    let next: LeaveStatus = payload.status.into();

    // the status guard makes a concurrent second review a no-op
    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, rejection_reason = ?, reviewed_by = ?, reviewed_at = ?
        WHERE id = ?
          AND status = 'PENDING'
        "#,
    )
    .bind(next.as_ref())
    .bind(rejection_reason)
    .bind(auth.user_id)
    .bind(Utc::now())
    .bind(leave_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Review leave failed", e))?;

    if result.rows_affected() == 0 {
        return Err(ReviewError::AlreadyProcessed(current).into());
    }

    info!(leave_id, reviewer = auth.user_id, status = %next, "Leave reviewed");

    let leave = find_leave(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(LeaveResponse::from(leave)))
}

#[utoipa::path(
    post,
    path = "/api/leave-requests/{leave_id}/cancel",
    params(("leave_id" = u64, Path, description = "ID of the leave request to cancel")),
    responses(
        (status = 200, description = "Leave cancelled", body = LeaveResponse),
        (status = 400, description = "Only pending requests can be cancelled"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave_id = path.into_inner();
    let leave = find_leave(pool.get_ref(), leave_id).await?;

    if leave.user_id != auth.user_id {
        return Err(ApiError::forbidden("Only the requester can cancel a leave request"));
    }

    let result = sqlx::query(
        "UPDATE leave_requests SET status = 'CANCELLED' WHERE id = ? AND status = 'PENDING'",
    )
    .bind(leave_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Cancel leave failed", e))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation("Only pending requests can be cancelled"));
    }

    let leave = find_leave(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(LeaveResponse::from(leave)))
}

#[utoipa::path(
    get,
    path = "/api/leave-requests/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave = find_leave(pool.get_ref(), path.into_inner()).await?;

    if !auth.can_access_user(leave.user_id) {
        return Err(ApiError::forbidden("Not allowed to view this leave request"));
    }

    Ok(HttpResponse::Ok().json(LeaveResponse::from(leave)))
}

#[utoipa::path(
    get,
    path = "/api/leave-requests",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = Object),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page);

    let mut filter = Filter::new();
    if auth.is_admin_or_manager() {
        if let Some(user_id) = query.user_id {
            filter.push("lr.user_id = ?", user_id);
        }
    } else {
        filter.push("lr.user_id = ?", auth.user_id);
    }
    if let Some(status) = query.status {
        filter.push("lr.status = ?", status.as_ref());
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests lr{}", where_clause);
    let total = bind_scalar_values(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "{}{} ORDER BY lr.created_at DESC LIMIT ? OFFSET ?",
        LEAVE_SELECT, where_clause
    );
    let leaves = bind_values(sqlx::query_as::<_, LeaveRequest>(&data_sql), &filter.values)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    let data = leaves.into_iter().map(LeaveResponse::from).collect();
    Ok(HttpResponse::Ok().json(window.wrap::<LeaveResponse>(data, total)))
}
