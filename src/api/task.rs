use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::task::{TASK_COLUMNS, Task, TaskBoard, TaskStatus},
    utils::{
        db_utils::{Filter, UpdateBuilder, bind_scalar_values, bind_values},
        pagination::PageWindow,
        validation::Violations,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    #[schema(example = "طراحی پست معرفی محصول")]
    pub title: String,
    pub description: Option<String>,
    /// Defaults to the caller
    pub assigned_to: Option<u64>,
    #[serde(default)]
    pub status: TaskStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub due_date: Option<DateTime<Utc>>,
    pub project_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    /// `null` clears the due date
    #[serde(default, with = "crate::utils::double_option")]
    #[schema(value_type = Option<String>, format = "date-time")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub assigned_to: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub project_id: Option<u64>,
    pub assigned_to: Option<u64>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Employees see what is assigned to them or what they created.
fn visibility_filter(auth: &AuthUser, query: &TaskQuery) -> Filter {
    let mut filter = Filter::new();
    if !auth.is_admin_or_manager() {
        filter.push_many(
            "(assigned_to = ? OR created_by = ?)",
            vec![auth.user_id.into(), auth.user_id.into()],
        );
    }
    if let Some(status) = query.status {
        filter.push("status = ?", status.as_ref());
    }
    if let Some(project_id) = query.project_id {
        filter.push("project_id = ?", project_id);
    }
    if let Some(assigned_to) = query.assigned_to {
        filter.push("assigned_to = ?", assigned_to);
    }
    filter
}

async fn ensure_active_user(pool: &MySqlPool, user_id: u64) -> ApiResult<()> {
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match active {
        Some(true) => Ok(()),
        _ => Err(ApiError::validation("assignedTo must be an active user")),
    }
}

async fn find_task(pool: &MySqlPool, id: u64) -> ApiResult<Task> {
    sqlx::query_as::<_, Task>(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid input, inactive assignee or unknown project"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTask>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();

    let mut v = Violations::new();
    v.require_text("title", &payload.title, MAX_TITLE_LEN);
    v.optional_text("description", payload.description.as_deref(), MAX_DESCRIPTION_LEN);
    v.into_result()?;

    let assigned_to = payload.assigned_to.unwrap_or(auth.user_id);
    ensure_active_user(pool.get_ref(), assigned_to).await?;

    if let Some(project_id) = payload.project_id {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(pool.get_ref())
            .await?;
        if exists == 0 {
            return Err(ApiError::validation("Project not found"));
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, description, status, assigned_to, created_by, due_date, project_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.description.as_deref())
    .bind(payload.status.as_ref())
    .bind(assigned_to)
    .bind(auth.user_id)
    .bind(payload.due_date)
    .bind(payload.project_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Create task failed", e))?;

    let task = find_task(pool.get_ref(), result.last_insert_id()).await?;
    info!(task_id = task.id, assigned_to, created_by = auth.user_id, "Task created");

    Ok(HttpResponse::Created().json(task))
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskQuery),
    responses((status = 200, description = "Paginated tasks", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn list_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskQuery>,
) -> ApiResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page);
    let filter = visibility_filter(&auth, &query);
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM tasks{}", where_clause);
    let total = bind_scalar_values(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {} FROM tasks{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        TASK_COLUMNS, where_clause
    );
    let tasks = bind_values(sqlx::query_as::<_, Task>(&data_sql), &filter.values)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(window.wrap(tasks, total)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/board",
    params(TaskQuery),
    responses((status = 200, description = "Tasks grouped by status column", body = TaskBoard)),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn task_board(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskQuery>,
) -> ApiResult<HttpResponse> {
    let filter = visibility_filter(&auth, &query);

    let sql = format!(
        "SELECT {} FROM tasks{} ORDER BY due_date IS NULL, due_date ASC, created_at DESC",
        TASK_COLUMNS,
        filter.where_clause()
    );
    let tasks = bind_values(sqlx::query_as::<_, Task>(&sql), &filter.values)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(TaskBoard::from_tasks(tasks)))
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = UpdateTask,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Not the assignee, creator or a reviewer"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTask>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let payload = payload.into_inner();

    let task = find_task(pool.get_ref(), task_id).await?;
    if !task.editable_by(auth.user_id, auth.is_admin_or_manager()) {
        return Err(ApiError::forbidden("Not allowed to edit this task"));
    }

    let mut v = Violations::new();
    if let Some(title) = &payload.title {
        v.require_text("title", title, MAX_TITLE_LEN);
    }
    v.optional_text("description", payload.description.as_deref(), MAX_DESCRIPTION_LEN);
    v.into_result()?;

    if let Some(assigned_to) = payload.assigned_to {
        if assigned_to != task.assigned_to {
            ensure_active_user(pool.get_ref(), assigned_to).await?;
        }
    }

    let mut update = UpdateBuilder::new("tasks");
    update
        .set_opt("title", payload.title.map(|t| t.trim().to_string()))
        .set_opt("description", payload.description)
        .set_opt("status", payload.status.map(|s| s.to_string()))
        .set_opt("due_date", payload.due_date)
        .set_opt("assigned_to", payload.assigned_to);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    update.execute(pool.get_ref(), task_id).await?;
    let updated = find_task(pool.get_ref(), task_id).await?;

    if updated.status() != task.status() {
        info!(task_id, from = %task.status(), to = %updated.status(), by = auth.user_id, "Task moved");
    }

    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Only the creator or an admin"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let task = find_task(pool.get_ref(), task_id).await?;

    if task.created_by != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden("Only the creator or an admin can delete a task"));
    }

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool.get_ref())
        .await?;

    info!(task_id, deleted_by = auth.user_id, "Task deleted");
    Ok(HttpResponse::NoContent().finish())
}
