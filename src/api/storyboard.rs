use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_duplicate_key, is_row_referenced},
    model::story::{STORY_COLUMNS, Story, StoryStatus, StoryType},
    utils::{db_utils::UpdateBuilder, validation::Violations},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const MAX_TITLE_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 5000;

#[derive(Deserialize, ToSchema)]
pub struct CreateStoryType {
    #[schema(example = "پشت صحنه")]
    pub name: String,
    #[schema(example = "🎬")]
    pub icon: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStory {
    pub title: String,
    pub notes: Option<String>,
    #[serde(alias = "day")]
    #[schema(value_type = String, format = "date", example = "2026-03-21")]
    pub story_date: NaiveDate,
    pub story_type_id: Option<u64>,
    pub project_id: Option<u64>,
    /// Appended after the day's last story when absent
    pub order: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStory {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub status: Option<StoryStatus>,
    #[serde(default, with = "crate::utils::double_option")]
    #[schema(value_type = Option<u64>)]
    pub story_type_id: Option<Option<u64>>,
    pub order: Option<i32>,
}

#[derive(Deserialize, IntoParams)]
pub struct StoryQuery {
    /// Stories planned for this day (YYYY-MM-DD)
    pub day: Option<NaiveDate>,
}

async fn ensure_story_type(pool: &MySqlPool, id: u64) -> ApiResult<()> {
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM story_types WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if exists == 0 {
        return Err(ApiError::validation("Story type not found"));
    }
    Ok(())
}

async fn find_story(pool: &MySqlPool, id: u64) -> ApiResult<Story> {
    sqlx::query_as::<_, Story>(&format!("SELECT {} FROM stories WHERE id = ?", STORY_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))
}

/* =========================
Story types
========================= */
#[utoipa::path(
    post,
    path = "/api/story-types",
    request_body = CreateStoryType,
    responses(
        (status = 201, description = "Story type created", body = StoryType),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Name already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn create_story_type(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateStoryType>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;

    let mut v = Violations::new();
    v.require_text("name", &payload.name, 100);
    v.optional_text("icon", payload.icon.as_deref(), 100);
    v.into_result()?;

    let result = sqlx::query("INSERT INTO story_types (name, icon) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(payload.icon.as_deref())
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict("A story type with this name already exists")
            } else {
                ApiError::internal("Create story type failed", e)
            }
        })?;

    let story_type = sqlx::query_as::<_, StoryType>(
        "SELECT id, name, icon, CAST(0 AS SIGNED) AS story_count, created_at FROM story_types WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(pool.get_ref())
    .await?;

    info!(story_type_id = story_type.id, "Story type created");
    Ok(HttpResponse::Created().json(story_type))
}

#[utoipa::path(
    get,
    path = "/api/story-types",
    responses((status = 200, description = "Story types with story counts", body = [StoryType])),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn list_story_types(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let types = sqlx::query_as::<_, StoryType>(
        r#"
        SELECT st.id, st.name, st.icon, COUNT(s.id) AS story_count, st.created_at
        FROM story_types st
        LEFT JOIN stories s ON s.story_type_id = st.id
        GROUP BY st.id, st.name, st.icon, st.created_at
        ORDER BY st.name ASC
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(types))
}

async fn count_stories(conn: &mut MySqlConnection, type_id: u64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM stories WHERE story_type_id = ?")
        .bind(type_id)
        .fetch_one(conn)
        .await
}

fn story_type_in_use(story_count: i64) -> HttpResponse {
    HttpResponse::Conflict().json(json!({
        "message": "Story type has stories",
        "storyCount": story_count,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/story-types/{type_id}",
    params(("type_id" = u64, Path, description = "Story type ID")),
    responses(
        (status = 204, description = "Story type deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Story type not found"),
        (status = 409, description = "Story type still has stories", body = Object, example = json!({
            "message": "Story type has stories", "storyCount": 4
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn delete_story_type(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let type_id = path.into_inner();

    let mut tx = pool.begin().await?;

    // the lock keeps new stories from referencing the type until commit
    let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM story_types WHERE id = ? FOR UPDATE")
        .bind(type_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Story type not found"));
    }

    let story_count = count_stories(&mut tx, type_id).await?;
    if story_count > 0 {
        return Ok(story_type_in_use(story_count));
    }

    let deleted = sqlx::query("DELETE FROM story_types WHERE id = ?")
        .bind(type_id)
        .execute(&mut *tx)
        .await;

    match deleted {
        Ok(_) => tx.commit().await?,
        Err(e) if is_row_referenced(&e) => {
            let story_count = count_stories(&mut tx, type_id).await?;
            return Ok(story_type_in_use(story_count));
        }
        Err(e) => return Err(e.into()),
    }

    info!(type_id, deleted_by = auth.user_id, "Story type deleted");
    Ok(HttpResponse::NoContent().finish())
}

/* =========================
Stories
========================= */
#[utoipa::path(
    post,
    path = "/api/stories",
    request_body = CreateStory,
    responses(
        (status = 201, description = "Story planned", body = Story),
        (status = 400, description = "Invalid input or unknown type/project")
    ),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn create_story(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateStory>,
) -> ApiResult<HttpResponse> {
    let mut v = Violations::new();
    v.require_text("title", &payload.title, MAX_TITLE_LEN);
    v.optional_text("notes", payload.notes.as_deref(), MAX_NOTES_LEN);
    v.into_result()?;

    if let Some(type_id) = payload.story_type_id {
        ensure_story_type(pool.get_ref(), type_id).await?;
    }
    if let Some(project_id) = payload.project_id {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(pool.get_ref())
            .await?;
        if exists == 0 {
            return Err(ApiError::validation("Project not found"));
        }
    }

    let order = match payload.order {
        Some(order) => order,
        None => {
            let next: i64 = sqlx::query_scalar(
                "SELECT CAST(COALESCE(MAX(sort_order), -1) + 1 AS SIGNED) FROM stories WHERE story_date = ?",
            )
            .bind(payload.story_date)
            .fetch_one(pool.get_ref())
            .await?;
            i32::try_from(next).unwrap_or(i32::MAX)
        }
    };

    let result = sqlx::query(
        r#"
        INSERT INTO stories (title, notes, story_date, status, story_type_id, project_id, sort_order, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.notes.as_deref())
    .bind(payload.story_date)
    .bind(StoryStatus::Draft.as_ref())
    .bind(payload.story_type_id)
    .bind(payload.project_id)
    .bind(order)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Create story failed", e))?;

    let story = find_story(pool.get_ref(), result.last_insert_id()).await?;
    info!(story_id = story.id, day = %story.story_date, "Story planned");

    Ok(HttpResponse::Created().json(story))
}

#[utoipa::path(
    get,
    path = "/api/stories",
    params(StoryQuery),
    responses((status = 200, description = "Stories ordered by day and position", body = [Story])),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn list_stories(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StoryQuery>,
) -> ApiResult<HttpResponse> {
    let stories = match query.day {
        Some(day) => {
            sqlx::query_as::<_, Story>(&format!(
                "SELECT {} FROM stories WHERE story_date = ? ORDER BY sort_order ASC, id ASC",
                STORY_COLUMNS
            ))
            .bind(day)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, Story>(&format!(
                "SELECT {} FROM stories ORDER BY story_date DESC, sort_order ASC, id ASC",
                STORY_COLUMNS
            ))
            .fetch_all(pool.get_ref())
            .await?
        }
    };

    Ok(HttpResponse::Ok().json(stories))
}

#[utoipa::path(
    patch,
    path = "/api/stories/{story_id}",
    params(("story_id" = u64, Path, description = "Story ID")),
    request_body = UpdateStory,
    responses(
        (status = 200, description = "Story updated", body = Story),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Story not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn update_story(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateStory>,
) -> ApiResult<HttpResponse> {
    let story_id = path.into_inner();
    let payload = payload.into_inner();

    let story = find_story(pool.get_ref(), story_id).await?;
    if story.created_by != auth.user_id && !auth.is_admin_or_manager() {
        return Err(ApiError::forbidden("Not allowed to edit this story"));
    }

    let mut v = Violations::new();
    if let Some(title) = &payload.title {
        v.require_text("title", title, MAX_TITLE_LEN);
    }
    v.optional_text("notes", payload.notes.as_deref(), MAX_NOTES_LEN);
    v.into_result()?;

    if let Some(Some(type_id)) = payload.story_type_id {
        ensure_story_type(pool.get_ref(), type_id).await?;
    }

    let mut update = UpdateBuilder::new("stories");
    update
        .set_opt("title", payload.title.map(|t| t.trim().to_string()))
        .set_opt("notes", payload.notes)
        .set_opt("status", payload.status.map(|s| s.to_string()))
        .set_opt("story_type_id", payload.story_type_id)
        .set_opt("sort_order", payload.order);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    update.execute(pool.get_ref(), story_id).await?;
    let story = find_story(pool.get_ref(), story_id).await?;

    Ok(HttpResponse::Ok().json(story))
}

#[utoipa::path(
    delete,
    path = "/api/stories/{story_id}",
    params(("story_id" = u64, Path, description = "Story ID")),
    responses(
        (status = 204, description = "Story deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Story not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Storyboard"
)]
pub async fn delete_story(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let story_id = path.into_inner();
    let story = find_story(pool.get_ref(), story_id).await?;

    if story.created_by != auth.user_id && !auth.is_admin_or_manager() {
        return Err(ApiError::forbidden("Not allowed to delete this story"));
    }

    sqlx::query("DELETE FROM stories WHERE id = ?")
        .bind(story_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}
