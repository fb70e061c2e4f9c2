use crate::{
    auth::auth::{AuthUser, bearer_token},
    config::Config,
    error::{ApiError, ApiResult, is_duplicate_key},
    model::instagram::{InstagramReel, TrackedInstagramPage, is_http_url, normalize_username, short_code_from_url},
    utils::{
        db_utils::{Filter, bind_scalar_values, bind_values},
        pagination::PageWindow,
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

const MAX_REELS_PER_RESULT: usize = 500;

const PAGE_SELECT: &str = r#"
    SELECT p.id, p.username, p.follower_count, p.last_scraped_at, COUNT(r.id) AS reel_count, p.created_at
    FROM tracked_instagram_pages p
    LEFT JOIN instagram_reels r ON r.page_id = p.id
"#;

const PAGE_GROUP_BY: &str = " GROUP BY p.id, p.username, p.follower_count, p.last_scraped_at, p.created_at";

#[derive(Deserialize, ToSchema)]
pub struct AddPage {
    #[schema(example = "@shabra.agency")]
    pub username: String,
}

#[derive(Deserialize, Clone, Copy, Default, PartialEq, Eq, Debug, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReelSort {
    #[default]
    Views,
    Recent,
}

impl ReelSort {
    fn order_by(self) -> &'static str {
        match self {
            ReelSort::Views => "view_count DESC, published_at DESC",
            ReelSort::Recent => "published_at DESC, view_count DESC",
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ReelQuery {
    pub page_id: Option<u64>,
    /// `views` (default) or `recent`
    #[serde(default)]
    pub sort: ReelSort,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    #[schema(example = "shabra.agency")]
    pub username: String,
    #[schema(example = 15400)]
    pub follower_count: u64,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedReel {
    #[schema(example = "https://www.instagram.com/reel/C1a2b3c4d5e/")]
    pub post_url: String,
    /// Derived from `postUrl` when missing or empty
    pub short_code: Option<String>,
    #[serde(default)]
    pub view_count: u64,
    #[schema(value_type = String, format = "date-time")]
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SaveResultPayload {
    pub page: ScrapedPage,
    #[serde(default)]
    pub reels: Vec<ScrapedReel>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq, Eq)]
pub struct ReelTally {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedPage {
    pub username: String,
    pub follower_count: u64,
}

#[derive(Serialize, ToSchema)]
pub struct SaveResultResponse {
    pub success: bool,
    pub page: SavedPage,
    pub reels: ReelTally,
}

/// A reel row ready for upsert.
#[derive(Debug, PartialEq, Eq)]
struct ReelRow<'a> {
    post_url: &'a str,
    short_code: String,
    thumbnail_url: Option<&'a str>,
}

fn prepare_reel(reel: &ScrapedReel) -> Option<ReelRow<'_>> {
    let post_url = reel.post_url.trim();
    if !is_http_url(post_url) {
        return None;
    }

    let short_code = reel
        .short_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| short_code_from_url(post_url))?;

    let thumbnail_url = reel
        .thumbnail_url
        .as_deref()
        .map(str::trim)
        .filter(|u| is_http_url(u));

    Some(ReelRow {
        post_url,
        short_code,
        thumbnail_url,
    })
}

/// Static bearer secret shared with the scraper workflow.
fn webhook_authorized(req: &HttpRequest, secret: Option<&str>) -> bool {
    match (bearer_token(req), secret) {
        (Some(token), Some(secret)) => token.as_bytes().ct_eq(secret.as_bytes()).into(),
        _ => false,
    }
}

async fn find_page(pool: &MySqlPool, id: u64) -> ApiResult<TrackedInstagramPage> {
    sqlx::query_as::<_, TrackedInstagramPage>(&format!("{} WHERE p.id = ?{}", PAGE_SELECT, PAGE_GROUP_BY))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Page not found"))
}

/* =========================
Tracked pages
========================= */
#[utoipa::path(
    post,
    path = "/api/instapulse/pages",
    request_body = AddPage,
    responses(
        (status = 201, description = "Page tracked", body = TrackedInstagramPage),
        (status = 400, description = "Invalid username"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Page already tracked")
    ),
    security(("bearer_auth" = [])),
    tag = "InstaPulse"
)]
pub async fn add_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<AddPage>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let username = normalize_username(&payload.username).ok_or_else(|| {
        ApiError::validation_with(
            "Invalid input",
            json!([{ "field": "username", "message": "must match [a-z0-9._]{1,30}" }]),
        )
    })?;

    let result = sqlx::query("INSERT INTO tracked_instagram_pages (username) VALUES (?)")
        .bind(&username)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict("Page is already tracked")
            } else {
                ApiError::internal("Add page failed", e)
            }
        })?;

    let page = find_page(pool.get_ref(), result.last_insert_id()).await?;
    info!(page_id = page.id, %username, "Instagram page tracked");

    Ok(HttpResponse::Created().json(page))
}

#[utoipa::path(
    get,
    path = "/api/instapulse/pages",
    responses((status = 200, description = "Tracked pages with reel counts", body = [TrackedInstagramPage])),
    security(("bearer_auth" = [])),
    tag = "InstaPulse"
)]
pub async fn list_pages(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let pages = sqlx::query_as::<_, TrackedInstagramPage>(&format!(
        "{}{} ORDER BY p.username ASC",
        PAGE_SELECT, PAGE_GROUP_BY
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(pages))
}

#[utoipa::path(
    delete,
    path = "/api/instapulse/pages/{page_id}",
    params(("page_id" = u64, Path, description = "Tracked page ID")),
    responses(
        (status = 204, description = "Page and its reels removed"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Page not found")
    ),
    security(("bearer_auth" = [])),
    tag = "InstaPulse"
)]
pub async fn delete_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let page_id = path.into_inner();

    // reels go with the page (ON DELETE CASCADE)
    let result = sqlx::query("DELETE FROM tracked_instagram_pages WHERE id = ?")
        .bind(page_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Page not found"));
    }

    info!(page_id, deleted_by = auth.user_id, "Instagram page removed");
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/instapulse/reels",
    params(ReelQuery),
    responses((status = 200, description = "Paginated reels", body = Object)),
    security(("bearer_auth" = [])),
    tag = "InstaPulse"
)]
pub async fn list_reels(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReelQuery>,
) -> ApiResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page);

    let mut filter = Filter::new();
    if let Some(page_id) = query.page_id {
        filter.push("page_id = ?", page_id);
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM instagram_reels{}", where_clause);
    let total = bind_scalar_values(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        r#"
        SELECT id, page_id, post_url, short_code, view_count, published_at, thumbnail_url, updated_at
        FROM instagram_reels{}
        ORDER BY {}
        LIMIT ? OFFSET ?
        "#,
        where_clause,
        query.sort.order_by()
    );
    let reels = bind_values(sqlx::query_as::<_, InstagramReel>(&data_sql), &filter.values)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(window.wrap(reels, total)))
}

/* =========================
Scraper webhook
========================= */
#[utoipa::path(
    post,
    path = "/api/instapulse/save-result",
    request_body = SaveResultPayload,
    responses(
        (status = 200, description = "Result stored", body = SaveResultResponse),
        (status = 400, description = "Invalid payload or page not tracked", body = Object, example = json!({
            "message": "Page not found"
        })),
        (status = 401, description = "Missing or wrong webhook token")
    ),
    security(("webhook_token" = [])),
    tag = "InstaPulse"
)]
#[instrument(skip_all)]
pub async fn save_result(
    req: HttpRequest,
    config: web::Data<Config>,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SaveResultPayload>,
) -> ApiResult<HttpResponse> {
    if !webhook_authorized(&req, config.instapulse_webhook_secret.as_deref()) {
        warn!("Rejected InstaPulse webhook call");
        return Err(ApiError::unauthorized("Unauthorized"));
    }

    let payload = payload.into_inner();
    let username = normalize_username(&payload.page.username).ok_or_else(|| {
        ApiError::validation_with(
            "Invalid input",
            json!([{ "field": "page.username", "message": "must match [a-z0-9._]{1,30}" }]),
        )
    })?;

    if payload.reels.len() > MAX_REELS_PER_RESULT {
        return Err(ApiError::validation_with(
            "Invalid input",
            json!([{ "field": "reels", "message": format!("at most {} reels per result", MAX_REELS_PER_RESULT) }]),
        ));
    }

    let mut tx = pool.begin().await?;

    let page_id: Option<u64> =
        sqlx::query_scalar("SELECT id FROM tracked_instagram_pages WHERE username = ? FOR UPDATE")
            .bind(&username)
            .fetch_optional(&mut *tx)
            .await?;

    let Some(page_id) = page_id else {
        tx.rollback().await?;
        return Err(ApiError::validation("Page not found"));
    };

    sqlx::query("UPDATE tracked_instagram_pages SET follower_count = ?, last_scraped_at = ? WHERE id = ?")
        .bind(payload.page.follower_count)
        .bind(Utc::now())
        .bind(page_id)
        .execute(&mut *tx)
        .await?;

    let mut tally = ReelTally {
        processed: 0,
        failed: 0,
        total: payload.reels.len(),
    };

    for reel in &payload.reels {
        let Some(row) = prepare_reel(reel) else {
            warn!(post_url = %reel.post_url, "Skipping reel with unusable URL or short code");
            tally.failed += 1;
            continue;
        };

        // a failed statement leaves the transaction usable for the next reel
        let upsert = sqlx::query(
            r#"
            INSERT INTO instagram_reels (page_id, post_url, short_code, view_count, published_at, thumbnail_url)
            VALUES (?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                page_id = VALUES(page_id),
                short_code = VALUES(short_code),
                view_count = VALUES(view_count),
                published_at = VALUES(published_at),
                thumbnail_url = VALUES(thumbnail_url)
            "#,
        )
        .bind(page_id)
        .bind(row.post_url)
        .bind(&row.short_code)
        .bind(reel.view_count)
        .bind(reel.published_at)
        .bind(row.thumbnail_url)
        .execute(&mut *tx)
        .await;

        match upsert {
            Ok(_) => tally.processed += 1,
            Err(e) => {
                warn!(post_url = row.post_url, error = %e, "Reel upsert failed");
                tally.failed += 1;
            }
        }
    }

    tx.commit().await?;

    info!(
        %username,
        followers = payload.page.follower_count,
        processed = tally.processed,
        failed = tally.failed,
        "InstaPulse result saved"
    );

    Ok(HttpResponse::Ok().json(SaveResultResponse {
        success: true,
        page: SavedPage {
            username,
            follower_count: payload.page.follower_count,
        },
        reels: tally,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestDb, WEBHOOK_SECRET, lazy_pool, test_config, webhook_bearer};
    use actix_web::{App, http::StatusCode, test as actix_test};
    use serde_json::Value;

    fn reel(post_url: &str, short_code: Option<&str>) -> ScrapedReel {
        ScrapedReel {
            post_url: post_url.to_string(),
            short_code: short_code.map(str::to_string),
            view_count: 10,
            published_at: Utc::now(),
            thumbnail_url: Some("not a url".into()),
        }
    }

    fn sample_payload() -> serde_json::Value {
        json!({
            "page": { "username": "shabra.agency", "followerCount": 1200 },
            "reels": [{
                "postUrl": "https://www.instagram.com/reel/abc123/",
                "viewCount": 900,
                "publishedAt": "2026-02-01T10:00:00Z"
            }]
        })
    }

    #[test]
    fn short_code_is_derived_when_blank() {
        let r = reel("https://www.instagram.com/reel/abc123/", Some("  "));
        let row = prepare_reel(&r).unwrap();
        assert_eq!(row.short_code, "abc123");
        assert_eq!(row.thumbnail_url, None);

        let r = reel("https://www.instagram.com/p/xyz/", Some("given"));
        assert_eq!(prepare_reel(&r).unwrap().short_code, "given");
    }

    #[test]
    fn unusable_reels_are_skipped() {
        assert!(prepare_reel(&reel("ftp://instagram.com/p/abc", None)).is_none());
        assert!(prepare_reel(&reel("https://instagram.com/explore/", None)).is_none());
    }

    #[test]
    fn sort_parses_lowercase() {
        let q: ReelQuery = serde_json::from_value(json!({ "sort": "recent" })).unwrap();
        assert_eq!(q.sort, ReelSort::Recent);
        assert_eq!(ReelSort::default().order_by(), "view_count DESC, published_at DESC");
    }

    async fn call_webhook(auth: Option<&str>) -> StatusCode {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/instapulse/save-result", web::post().to(save_result)),
        )
        .await;

        let mut req = actix_test::TestRequest::post()
            .uri("/api/instapulse/save-result")
            .set_json(sample_payload());
        if let Some(token) = auth {
            req = req.insert_header(("Authorization", format!("Bearer {}", token)));
        }

        actix_test::call_service(&app, req.to_request()).await.status()
    }

    #[actix_web::test]
    async fn webhook_without_token_is_unauthorized() {
        assert_eq!(call_webhook(None).await, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn webhook_with_wrong_token_is_unauthorized() {
        assert_eq!(call_webhook(Some("not-the-secret")).await, StatusCode::UNAUTHORIZED);
        let almost = &WEBHOOK_SECRET[..WEBHOOK_SECRET.len() - 1];
        assert_eq!(call_webhook(Some(almost)).await, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn webhook_rejects_bad_username_after_auth() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/instapulse/save-result", web::post().to(save_result)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/instapulse/save-result")
            .insert_header(webhook_bearer())
            .set_json(json!({ "page": { "username": "bad name!", "followerCount": 1 }, "reels": [] }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    fn scraped(username: &str, followers: u64, views: u64) -> Value {
        json!({
            "page": { "username": username, "followerCount": followers },
            "reels": [{
                "postUrl": "https://www.instagram.com/reel/C7xYz12AbCd/",
                "viewCount": views,
                "publishedAt": "2026-02-01T10:00:00Z"
            }]
        })
    }

    #[actix_web::test]
    async fn untracked_page_is_rejected_without_writes() {
        let Some(db) = TestDb::start().await else { return };
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(db.pool.clone()))
                .app_data(web::Data::new(test_config()))
                .route("/api/instapulse/save-result", web::post().to(save_result)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/instapulse/save-result")
            .insert_header(webhook_bearer())
            .set_json(scraped("ghost.page", 10, 5))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Page not found");
        assert_eq!(db.count("SELECT COUNT(*) FROM tracked_instagram_pages").await, 0);
        assert_eq!(db.count("SELECT COUNT(*) FROM instagram_reels").await, 0);
    }

    #[actix_web::test]
    async fn reels_are_upserted_by_post_url() {
        let Some(db) = TestDb::start().await else { return };
        sqlx::query("INSERT INTO tracked_instagram_pages (username) VALUES ('foo')")
            .execute(&db.pool)
            .await
            .unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(db.pool.clone()))
                .app_data(web::Data::new(test_config()))
                .route("/api/instapulse/save-result", web::post().to(save_result)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/instapulse/save-result")
            .insert_header(webhook_bearer())
            .set_json(scraped("foo", 120, 1000))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["page"]["followerCount"], 120);
        assert_eq!(body["reels"], json!({ "processed": 1, "failed": 0, "total": 1 }));

        let followers: u64 = sqlx::query_scalar("SELECT follower_count FROM tracked_instagram_pages WHERE username = 'foo'")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(followers, 120);

        // the scraper runs again with fresh counts
        let req = actix_test::TestRequest::post()
            .uri("/api/instapulse/save-result")
            .insert_header(webhook_bearer())
            .set_json(scraped("@FOO", 135, 2500))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let rows: Vec<(String, u64)> = sqlx::query_as("SELECT short_code, view_count FROM instagram_reels")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, vec![("C7xYz12AbCd".to_string(), 2500)]);
    }
}
