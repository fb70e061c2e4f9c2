use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::announcement::Announcement,
    utils::{pagination::PageWindow, validation::Violations},
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const ANNOUNCEMENT_SELECT: &str = r#"
    SELECT a.id, a.title, a.content, a.is_pinned, a.author_id,
           CONCAT(u.first_name, ' ', u.last_name) AS author_name, a.created_at
    FROM announcements a
    JOIN users u ON u.id = a.author_id
"#;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncement {
    #[schema(example = "تعطیلی نوروز")]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/api/announcements",
    request_body = CreateAnnouncement,
    responses(
        (status = 201, description = "Announcement published", body = Announcement),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
pub async fn create_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAnnouncement>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;

    let mut v = Violations::new();
    v.require_text("title", &payload.title, 200);
    v.require_text("content", &payload.content, 10_000);
    v.into_result()?;

    let result = sqlx::query("INSERT INTO announcements (title, content, is_pinned, author_id) VALUES (?, ?, ?, ?)")
        .bind(payload.title.trim())
        .bind(payload.content.trim())
        .bind(payload.is_pinned)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::internal("Create announcement failed", e))?;

    let announcement = sqlx::query_as::<_, Announcement>(&format!("{} WHERE a.id = ?", ANNOUNCEMENT_SELECT))
        .bind(result.last_insert_id())
        .fetch_one(pool.get_ref())
        .await?;

    info!(
        announcement_id = announcement.id,
        pinned = announcement.is_pinned,
        author = auth.user_id,
        "Announcement published"
    );
    Ok(HttpResponse::Created().json(announcement))
}

#[utoipa::path(
    get,
    path = "/api/announcements",
    params(AnnouncementQuery),
    responses((status = 200, description = "Pinned first, then newest", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
pub async fn list_announcements(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AnnouncementQuery>,
) -> ApiResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM announcements")
        .fetch_one(pool.get_ref())
        .await?;

    let rows = sqlx::query_as::<_, Announcement>(&format!(
        "{} ORDER BY a.is_pinned DESC, a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
        ANNOUNCEMENT_SELECT
    ))
    .bind(window.per_page)
    .bind(window.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(window.wrap(rows, total)))
}

#[utoipa::path(
    delete,
    path = "/api/announcements/{announcement_id}",
    params(("announcement_id" = u64, Path, description = "Announcement ID")),
    responses(
        (status = 204, description = "Announcement removed"),
        (status = 403, description = "Only the author or an admin"),
        (status = 404, description = "Announcement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
pub async fn delete_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let announcement_id = path.into_inner();

    let author_id: u64 = sqlx::query_scalar("SELECT author_id FROM announcements WHERE id = ?")
        .bind(announcement_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Announcement not found"))?;

    if author_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden("Only the author or an admin can delete an announcement"));
    }

    sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(announcement_id)
        .execute(pool.get_ref())
        .await?;

    info!(announcement_id, deleted_by = auth.user_id, "Announcement deleted");
    Ok(HttpResponse::NoContent().finish())
}
