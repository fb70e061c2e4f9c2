use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::attendance::Attendance,
    utils::{
        db_utils::{Filter, bind_scalar_values, bind_values},
        pagination::PageWindow,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page, at most 100
    pub per_page: Option<u64>,
    /// Only honoured for admins and managers
    pub user_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

const OPEN_ATTENDANCE: &str = r#"
    SELECT id, user_id, check_in, check_out
    FROM attendance
    WHERE user_id = ? AND check_out IS NULL
    ORDER BY check_in DESC
    LIMIT 1
"#;

async fn open_attendance(pool: &MySqlPool, user_id: u64) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(OPEN_ATTENDANCE)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    responses(
        (status = 201, description = "Clocked in", body = Attendance),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already clocked in", body = Object, example = json!({
            "message": "Already clocked in"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_in(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let mut tx = pool.begin().await?;

    // serializes concurrent clock-ins of the same user
    let locked: Option<u64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(auth.user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Err(ApiError::unauthorized("User not found"));
    }

    let open = sqlx::query_as::<_, Attendance>(&format!("{} FOR UPDATE", OPEN_ATTENDANCE))
        .bind(auth.user_id)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(open) = open {
        return Err(ApiError::conflict_with(
            "Already clocked in",
            json!({ "attendanceId": open.id, "checkIn": open.check_in }),
        ));
    }

    let now = Utc::now();
    let result = sqlx::query("INSERT INTO attendance (user_id, check_in) VALUES (?, ?)")
        .bind(auth.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::internal("Clock-in failed", e))?;

    tx.commit().await?;
    info!(user_id = auth.user_id, "Clocked in");

    Ok(HttpResponse::Created().json(Attendance {
        id: result.last_insert_id(),
        user_id: auth.user_id,
        check_in: now,
        check_out: None,
    }))
}

#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    responses(
        (status = 200, description = "Clocked out", body = Attendance),
        (status = 400, description = "No open attendance", body = Object, example = json!({
            "message": "No active clock-in found"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_out(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let open = open_attendance(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::validation("No active clock-in found"))?;

    let now = Utc::now();
    let result = sqlx::query("UPDATE attendance SET check_out = ? WHERE id = ? AND check_out IS NULL")
        .bind(now)
        .bind(open.id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::internal("Clock-out failed", e))?;

    // a concurrent clock-out already closed it
    if result.rows_affected() == 0 {
        return Err(ApiError::validation("No active clock-in found"));
    }

    let closed = Attendance {
        check_out: Some(now),
        ..open
    };
    info!(
        user_id = auth.user_id,
        minutes = closed.worked_minutes(now),
        "Clocked out"
    );

    Ok(HttpResponse::Ok().json(closed))
}

#[utoipa::path(
    get,
    path = "/api/attendance/status",
    responses((status = 200, description = "Open attendance row or null", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_status(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let open = open_attendance(pool.get_ref(), auth.user_id).await?;
    let worked_minutes = open.as_ref().map(|a| a.worked_minutes(Utc::now()));

    Ok(HttpResponse::Ok().json(json!({
        "clockedIn": open.is_some(),
        "attendance": open,
        "workedMinutes": worked_minutes,
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance, newest first", body = Object),
        (status = 400, description = "from is after to"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> ApiResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page);

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::validation("from cannot be after to"));
        }
    }

    let mut filter = Filter::new();
    if auth.is_admin_or_manager() {
        if let Some(user_id) = query.user_id {
            filter.push("user_id = ?", user_id);
        }
    } else {
        filter.push("user_id = ?", auth.user_id);
    }
    if let Some(from) = query.from {
        filter.push("check_in >= ?", from);
    }
    if let Some(to) = query.to.and_then(|d| d.checked_add_days(Days::new(1))) {
        filter.push("check_in < ?", to);
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM attendance{}", where_clause);
    let total = bind_scalar_values(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT id, user_id, check_in, check_out FROM attendance{} ORDER BY check_in DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let rows = bind_values(sqlx::query_as::<_, Attendance>(&data_sql), &filter.values)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(window.wrap(rows, total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::testing::{TestDb, bearer, lazy_pool, test_config};
    use actix_web::{App, http::StatusCode, test as actix_test};

    #[actix_web::test]
    async fn clock_in_requires_a_session() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/attendance/clock-in", web::post().to(clock_in)),
        )
        .await;

        let req = actix_test::TestRequest::post().uri("/api/attendance/clock-in").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn inverted_range_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/attendance", web::get().to(list_attendance)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/api/attendance?from=2024-05-10&to=2024-05-01")
            .insert_header(bearer(4, &[Role::Employee]))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn concurrent_clock_ins_leave_one_open_row() {
        let Some(db) = TestDb::start().await else { return };
        let employee = db.insert_user("mina@shabra.ir", &[Role::Employee], None).await;

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(db.pool.clone()))
                .app_data(web::Data::new(test_config()))
                .route("/api/attendance/clock-in", web::post().to(clock_in)),
        )
        .await;
        let clock_in_req = || {
            actix_test::TestRequest::post()
                .uri("/api/attendance/clock-in")
                .insert_header(bearer(employee, &[Role::Employee]))
                .to_request()
        };

        let (first, second) = futures::join!(
            actix_test::call_service(&app, clock_in_req()),
            actix_test::call_service(&app, clock_in_req()),
        );
        let mut statuses = vec![first.status(), second.status()];
        statuses.sort_by_key(|s| s.as_u16());
        assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);

        let resp = actix_test::call_service(&app, clock_in_req()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        assert_eq!(
            db.count("SELECT COUNT(*) FROM attendance WHERE check_out IS NULL").await,
            1
        );
    }
}
