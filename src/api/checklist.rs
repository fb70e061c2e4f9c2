use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, is_duplicate_key},
    model::{
        checklist::{
            AssigneeCandidates, ChecklistStatus, ChecklistTemplate, ChecklistTemplateTask, EMPLOYEE_CHECKLIST_SELECT,
            EmployeeChecklist, due_date, resolve_assignee,
        },
        role::Role,
        task::{TASK_COLUMNS, Task, TaskStatus},
        user::User,
    },
    utils::{
        db_utils::{Filter, bind_scalar_values, bind_values},
        pagination::PageWindow,
        validation::Violations,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const MAX_NAME_LEN: usize = 150;
const MAX_TASK_TITLE_LEN: usize = 200;

const TEMPLATE_COLUMNS: &str = "id, name, description, is_active, created_by, created_at";
const TEMPLATE_TASK_COLUMNS: &str =
    "id, template_id, title, description, default_assignee_role, estimated_days, sort_order";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateTaskInput {
    #[schema(example = "امضای قرارداد")]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_assignee")]
    pub default_assignee_role: Role,
    #[schema(example = 3, minimum = 1)]
    pub estimated_days: Option<u32>,
    /// Position in the checklist; defaults to the index in the list
    pub order: Option<i32>,
}

fn default_assignee() -> Role {
    Role::Employee
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePayload {
    #[schema(example = "Onboarding")]
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub tasks: Vec<TemplateTaskInput>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResponse {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<ChecklistTemplateTask>,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    pub task_count: i64,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TemplateQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignChecklist {
    pub template_id: u64,
    pub employee_id: u64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignedChecklist {
    pub checklist: EmployeeChecklist,
    pub tasks: Vec<Task>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeChecklistQuery {
    pub employee_id: Option<u64>,
    pub status: Option<ChecklistStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChecklistStatusUpdate {
    pub status: ChecklistStatus,
}

fn validate_template(payload: &TemplatePayload) -> ApiResult<()> {
    let mut v = Violations::new();
    v.require_text("name", &payload.name, MAX_NAME_LEN);
    v.check(!payload.tasks.is_empty(), "tasks", "at least one task is required");

    for (i, task) in payload.tasks.iter().enumerate() {
        let title = task.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TASK_TITLE_LEN {
            v.add("tasks", format!("task {}: title must be 1..{} characters", i + 1, MAX_TASK_TITLE_LEN));
        }
        if task.estimated_days == Some(0) {
            v.add("tasks", format!("task {}: estimatedDays must be at least 1", i + 1));
        }
    }

    v.into_result()
}

async fn insert_template_tasks(
    conn: &mut MySqlConnection,
    template_id: u64,
    tasks: &[TemplateTaskInput],
) -> Result<(), sqlx::Error> {
    for (i, task) in tasks.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO checklist_template_tasks
                (template_id, title, description, default_assignee_role, estimated_days, sort_order)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(template_id)
        .bind(task.title.trim())
        .bind(task.description.as_deref())
        .bind(task.default_assignee_role.as_ref())
        .bind(task.estimated_days)
        .bind(task.order.unwrap_or(i as i32))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_template(conn: &mut MySqlConnection, id: u64) -> ApiResult<TemplateResponse> {
    let template = sqlx::query_as::<_, ChecklistTemplate>(&format!(
        "SELECT {} FROM checklist_templates WHERE id = ?",
        TEMPLATE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Template not found"))?;

    let tasks = template_tasks(&mut *conn, id).await?;

    Ok(TemplateResponse {
        id: template.id,
        name: template.name,
        description: template.description,
        is_active: template.is_active,
        created_by: template.created_by,
        created_at: template.created_at,
        tasks,
    })
}

async fn template_tasks(conn: &mut MySqlConnection, template_id: u64) -> Result<Vec<ChecklistTemplateTask>, sqlx::Error> {
    sqlx::query_as::<_, ChecklistTemplateTask>(&format!(
        "SELECT {} FROM checklist_template_tasks WHERE template_id = ? ORDER BY sort_order ASC, id ASC",
        TEMPLATE_TASK_COLUMNS
    ))
    .bind(template_id)
    .fetch_all(conn)
    .await
}

fn duplicate_name(err: sqlx::Error) -> ApiError {
    if is_duplicate_key(&err) {
        ApiError::conflict("A template with this name already exists")
    } else {
        err.into()
    }
}

/* =========================
Templates
========================= */
#[utoipa::path(
    post,
    path = "/api/checklists/templates",
    request_body = TemplatePayload,
    responses(
        (status = 201, description = "Template created", body = TemplateResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Duplicate name")
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn create_template(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<TemplatePayload>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    validate_template(&payload)?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO checklist_templates (name, description, is_active, created_by) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(payload.description.as_deref())
    .bind(payload.is_active)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(duplicate_name)?;

    let template_id = result.last_insert_id();
    insert_template_tasks(&mut tx, template_id, &payload.tasks).await?;
    let template = load_template(&mut tx, template_id).await?;

    tx.commit().await?;
    info!(template_id, tasks = template.tasks.len(), "Checklist template created");

    Ok(HttpResponse::Created().json(template))
}

#[utoipa::path(
    get,
    path = "/api/checklists/templates",
    params(TemplateQuery),
    responses(
        (status = 200, description = "Templates with task counts", body = [TemplateSummary]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn list_templates(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TemplateQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;

    let where_clause = if query.include_inactive {
        ""
    } else {
        " WHERE t.is_active = TRUE"
    };

    let templates = sqlx::query_as::<_, TemplateSummary>(&format!(
        r#"
        SELECT t.id, t.name, t.description, t.is_active, t.created_by, t.created_at,
               COUNT(tt.id) AS task_count
        FROM checklist_templates t
        LEFT JOIN checklist_template_tasks tt ON tt.template_id = t.id
        {}
        GROUP BY t.id, t.name, t.description, t.is_active, t.created_by, t.created_at
        ORDER BY t.name ASC
        "#,
        where_clause
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(templates))
}

#[utoipa::path(
    get,
    path = "/api/checklists/templates/{template_id}",
    params(("template_id" = u64, Path, description = "Template ID")),
    responses(
        (status = 200, description = "Template with ordered tasks", body = TemplateResponse),
        (status = 404, description = "Template not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn get_template(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;

    let mut conn = pool.acquire().await?;
    let template = load_template(&mut conn, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(template))
}

#[utoipa::path(
    put,
    path = "/api/checklists/templates/{template_id}",
    params(("template_id" = u64, Path, description = "Template ID")),
    request_body = TemplatePayload,
    responses(
        (status = 200, description = "Template replaced", body = TemplateResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Template not found"),
        (status = 409, description = "Duplicate name")
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn update_template(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<TemplatePayload>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    validate_template(&payload)?;
    let template_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM checklist_templates WHERE id = ? FOR UPDATE")
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Template not found"));
    }

    sqlx::query("UPDATE checklist_templates SET name = ?, description = ?, is_active = ? WHERE id = ?")
        .bind(payload.name.trim())
        .bind(payload.description.as_deref())
        .bind(payload.is_active)
        .bind(template_id)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_name)?;

    sqlx::query("DELETE FROM checklist_template_tasks WHERE template_id = ?")
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
    insert_template_tasks(&mut tx, template_id, &payload.tasks).await?;

    let template = load_template(&mut tx, template_id).await?;
    tx.commit().await?;

    info!(template_id, "Checklist template replaced");
    Ok(HttpResponse::Ok().json(template))
}

#[utoipa::path(
    delete,
    path = "/api/checklists/templates/{template_id}",
    params(("template_id" = u64, Path, description = "Template ID")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found"),
        (status = 409, description = "Template has been assigned", body = Object, example = json!({
            "message": "Template has assignments", "details": { "assignmentCount": 3 }
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn delete_template(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let template_id = path.into_inner();

    let assignments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employee_checklists WHERE template_id = ?")
        .bind(template_id)
        .fetch_one(pool.get_ref())
        .await?;

    if assignments > 0 {
        return Err(ApiError::conflict_with(
            "Template has assignments",
            json!({ "assignmentCount": assignments }),
        ));
    }

    let result = sqlx::query("DELETE FROM checklist_templates WHERE id = ?")
        .bind(template_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Template not found"));
    }

    info!(template_id, deleted_by = auth.user_id, "Checklist template deleted");
    Ok(HttpResponse::NoContent().finish())
}

/* =========================
Assignment
========================= */
#[utoipa::path(
    post,
    path = "/api/checklists/assign",
    request_body = AssignChecklist,
    responses(
        (status = 201, description = "Checklist assigned and tasks generated", body = AssignedChecklist),
        (status = 400, description = "Template inactive, employee inactive or already assigned"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Template or employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn assign_checklist(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<AssignChecklist>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;
    let AssignChecklist {
        template_id,
        employee_id,
    } = payload.into_inner();

    // everything below commits together or not at all
    let mut tx = pool.begin().await?;

    let template = sqlx::query_as::<_, ChecklistTemplate>(&format!(
        "SELECT {} FROM checklist_templates WHERE id = ? FOR UPDATE",
        TEMPLATE_COLUMNS
    ))
    .bind(template_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Template not found"))?;

    if !template.is_active {
        return Err(ApiError::validation("Template is not active"));
    }

    let employee = User::find_by_id(&mut *tx, employee_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    if !employee.is_active {
        return Err(ApiError::validation("Employee is not active"));
    }

    let open: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM employee_checklists
        WHERE template_id = ? AND employee_id = ? AND status IN ('PENDING', 'IN_PROGRESS')
        "#,
    )
    .bind(template_id)
    .bind(employee_id)
    .fetch_one(&mut *tx)
    .await?;

    if open > 0 {
        return Err(ApiError::validation("Checklist already assigned to this employee"));
    }

    let template_tasks = template_tasks(&mut tx, template_id).await?;

    let needs_admin = template_tasks
        .iter()
        .any(|t| t.default_assignee_role.parse::<Role>() == Ok(Role::Admin));
    let first_admin_id = if needs_admin {
        User::first_admin(&mut *tx).await?.map(|u| u.id)
    } else {
        None
    };

    let candidates = AssigneeCandidates {
        employee_id,
        manager_id: employee.manager_id,
        first_admin_id,
        caller_id: auth.user_id,
    };

    let checklist_id = sqlx::query(
        "INSERT INTO employee_checklists (template_id, employee_id, assigned_by, status) VALUES (?, ?, ?, ?)",
    )
    .bind(template_id)
    .bind(employee_id)
    .bind(auth.user_id)
    .bind(ChecklistStatus::Pending.as_ref())
    .execute(&mut *tx)
    .await?
    .last_insert_id();

    let now = Utc::now();
    for template_task in &template_tasks {
        let role = template_task.default_assignee_role.parse().unwrap_or(Role::Employee);
        let assignee = resolve_assignee(role, &candidates);

        sqlx::query(
            r#"
            INSERT INTO tasks (title, description, status, assigned_to, created_by, due_date, employee_checklist_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template_task.title)
        .bind(template_task.description.as_deref())
        .bind(TaskStatus::Todo.as_ref())
        .bind(assignee)
        .bind(auth.user_id)
        .bind(due_date(now, template_task.estimated_days))
        .bind(checklist_id)
        .execute(&mut *tx)
        .await?;

        debug!(checklist_id, assignee, role = %role, "Checklist task generated");
    }

    let checklist = sqlx::query_as::<_, EmployeeChecklist>(&format!("{} WHERE ec.id = ?", EMPLOYEE_CHECKLIST_SELECT))
        .bind(checklist_id)
        .fetch_one(&mut *tx)
        .await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE employee_checklist_id = ? ORDER BY id ASC",
        TASK_COLUMNS
    ))
    .bind(checklist_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        checklist_id,
        template_id,
        employee_id,
        tasks = tasks.len(),
        assigned_by = auth.user_id,
        "Checklist assigned"
    );

    Ok(HttpResponse::Created().json(AssignedChecklist { checklist, tasks }))
}

/* =========================
Employee checklists
========================= */
#[utoipa::path(
    get,
    path = "/api/checklists/employee",
    params(EmployeeChecklistQuery),
    responses((status = 200, description = "Paginated employee checklists", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn list_employee_checklists(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeChecklistQuery>,
) -> ApiResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page);

    let mut filter = Filter::new();
    if auth.is_admin_or_manager() {
        if let Some(employee_id) = query.employee_id {
            filter.push("ec.employee_id = ?", employee_id);
        }
    } else {
        filter.push("ec.employee_id = ?", auth.user_id);
    }
    if let Some(status) = query.status {
        filter.push("ec.status = ?", status.as_ref());
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM employee_checklists ec{}", where_clause);
    let total = bind_scalar_values(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "{}{} ORDER BY ec.created_at DESC LIMIT ? OFFSET ?",
        EMPLOYEE_CHECKLIST_SELECT, where_clause
    );
    let rows = bind_values(sqlx::query_as::<_, EmployeeChecklist>(&data_sql), &filter.values)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(window.wrap(rows, total)))
}

#[utoipa::path(
    patch,
    path = "/api/checklists/employee/{checklist_id}/status",
    params(("checklist_id" = u64, Path, description = "Employee checklist ID")),
    request_body = ChecklistStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = EmployeeChecklist),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Checklist not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Checklists"
)]
pub async fn update_checklist_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ChecklistStatusUpdate>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;
    let checklist_id = path.into_inner();
    let next = payload.status;

    let checklist = sqlx::query_as::<_, EmployeeChecklist>(&format!("{} WHERE ec.id = ?", EMPLOYEE_CHECKLIST_SELECT))
        .bind(checklist_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Checklist not found"))?;

    let current: ChecklistStatus = checklist
        .status
        .parse()
        .map_err(|e| ApiError::internal("Unknown checklist status", e))?;

    if !current.can_transition_to(next) {
        return Err(ApiError::validation_with(
            "Status transition not allowed",
            json!({ "from": current, "to": next }),
        ));
    }

    let completed_at = (next == ChecklistStatus::Completed).then(Utc::now);
    let result = sqlx::query("UPDATE employee_checklists SET status = ?, completed_at = ? WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(completed_at)
        .bind(checklist_id)
        .bind(current.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation("Checklist status changed concurrently"));
    }

    info!(checklist_id, from = %current, to = %next, by = auth.user_id, "Checklist status changed");

    Ok(HttpResponse::Ok().json(EmployeeChecklist {
        status: next.to_string(),
        completed_at,
        ..checklist
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestDb, bearer, lazy_pool, test_config};
    use actix_web::{App, http::StatusCode, test as actix_test};
    use chrono::Duration;
    use serde_json::Value;

    fn task(title: &str, days: Option<u32>) -> TemplateTaskInput {
        task_for(Role::Employee, title, days)
    }

    fn task_for(role: Role, title: &str, days: Option<u32>) -> TemplateTaskInput {
        TemplateTaskInput {
            title: title.to_string(),
            description: None,
            default_assignee_role: role,
            estimated_days: days,
            order: None,
        }
    }

    async fn insert_template(db: &TestDb, name: &str, active: bool, created_by: u64, tasks: &[TemplateTaskInput]) -> u64 {
        let template_id =
            sqlx::query("INSERT INTO checklist_templates (name, is_active, created_by) VALUES (?, ?, ?)")
                .bind(name)
                .bind(active)
                .bind(created_by)
                .execute(&db.pool)
                .await
                .unwrap()
                .last_insert_id();

        let mut conn = db.pool.acquire().await.unwrap();
        insert_template_tasks(&mut conn, template_id, tasks).await.unwrap();
        template_id
    }

    fn assign_request(caller: u64, template_id: u64, employee_id: u64) -> actix_test::TestRequest {
        actix_test::TestRequest::post()
            .uri("/api/checklists/assign")
            .insert_header(bearer(caller, &[Role::Manager]))
            .set_json(json!({ "templateId": template_id, "employeeId": employee_id }))
    }

    #[test]
    fn template_needs_name_and_tasks() {
        let empty = TemplatePayload {
            name: " ".into(),
            description: None,
            is_active: true,
            tasks: vec![],
        };
        assert!(validate_template(&empty).is_err());

        let zero_days = TemplatePayload {
            name: "Onboarding".into(),
            description: None,
            is_active: true,
            tasks: vec![task("Laptop", Some(0))],
        };
        assert!(validate_template(&zero_days).is_err());

        let ok = TemplatePayload {
            tasks: vec![task("Laptop", Some(2)), task("Contract", None)],
            ..zero_days
        };
        assert!(validate_template(&ok).is_ok());
    }

    #[test]
    fn assignee_role_defaults_to_employee() {
        let input: TemplateTaskInput = serde_json::from_value(json!({ "title": "Badge" })).unwrap();
        assert_eq!(input.default_assignee_role, Role::Employee);

        let input: TemplateTaskInput =
            serde_json::from_value(json!({ "title": "Sign", "defaultAssigneeRole": "MANAGER", "order": 2 })).unwrap();
        assert_eq!(input.default_assignee_role, Role::Manager);
        assert_eq!(input.order, Some(2));
    }

    #[actix_web::test]
    async fn employees_cannot_assign() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/checklists/assign", web::post().to(assign_checklist)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/checklists/assign")
            .insert_header(bearer(7, &[Role::Employee]))
            .set_json(json!({ "templateId": 1, "employeeId": 7 }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn managers_cannot_create_templates() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/checklists/templates", web::post().to(create_template)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/checklists/templates")
            .insert_header(bearer(3, &[Role::Manager]))
            .set_json(json!({ "name": "Offboarding", "tasks": [{ "title": "Return laptop" }] }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn template_without_tasks_is_rejected_before_the_database() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/checklists/templates", web::post().to(create_template)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/checklists/templates")
            .insert_header(bearer(1, &[Role::Admin]))
            .set_json(json!({ "name": "Empty", "tasks": [] }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn assignment_generates_one_task_per_template_task() {
        let Some(db) = TestDb::start().await else { return };
        let admin = db.insert_user("admin@shabra.ir", &[Role::Admin], None).await;
        let manager = db.insert_user("manager@shabra.ir", &[Role::Manager], None).await;
        let employee = db.insert_user("sara@shabra.ir", &[Role::Employee], Some(manager)).await;
        let template_id = insert_template(
            &db,
            "Onboarding",
            true,
            admin,
            &[
                task_for(Role::Employee, "Laptop setup", Some(2)),
                task_for(Role::Manager, "Intro meeting", None),
                task_for(Role::Admin, "Create accounts", Some(5)),
            ],
        )
        .await;

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(db.pool.clone()))
                .app_data(web::Data::new(test_config()))
                .route("/api/checklists/assign", web::post().to(assign_checklist)),
        )
        .await;

        let before = Utc::now();
        let resp = actix_test::call_service(&app, assign_request(manager, template_id, employee).to_request()).await;
        let after = Utc::now();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["checklist"]["status"], "PENDING");
        assert_eq!(body["tasks"].as_array().map(Vec::len), Some(3));
        let checklist_id = body["checklist"]["id"].as_u64().unwrap();

        let rows: Vec<(u64, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT assigned_to, status, due_date FROM tasks WHERE employee_checklist_id = ? ORDER BY id",
        )
        .bind(checklist_id)
        .fetch_all(&db.pool)
        .await
        .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![employee, manager, admin]);

        // DATETIME drops sub-second precision
        let slack = Duration::seconds(1);
        for ((_, status, due), days) in rows.iter().zip([2, 7, 5]) {
            assert_eq!(status, "Todo");
            let due = due.unwrap();
            assert!(due >= before + Duration::days(days) - slack, "due {} too early", due);
            assert!(due <= after + Duration::days(days) + slack, "due {} too late", due);
        }
    }

    #[actix_web::test]
    async fn open_or_inactive_templates_are_not_assigned() {
        let Some(db) = TestDb::start().await else { return };
        let manager = db.insert_user("manager@shabra.ir", &[Role::Manager], None).await;
        let employee = db.insert_user("reza@shabra.ir", &[Role::Employee], Some(manager)).await;
        let active = insert_template(&db, "Offboarding", true, manager, &[task("Return laptop", None)]).await;
        let inactive = insert_template(&db, "Legacy", false, manager, &[task("Old step", None)]).await;

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(db.pool.clone()))
                .app_data(web::Data::new(test_config()))
                .route("/api/checklists/assign", web::post().to(assign_checklist)),
        )
        .await;

        let resp = actix_test::call_service(&app, assign_request(manager, inactive, employee).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = actix_test::call_service(&app, assign_request(manager, active, employee).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        // still PENDING
        let resp = actix_test::call_service(&app, assign_request(manager, active, employee).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        sqlx::query("UPDATE employee_checklists SET status = 'IN_PROGRESS'")
            .execute(&db.pool)
            .await
            .unwrap();
        let resp = actix_test::call_service(&app, assign_request(manager, active, employee).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert_eq!(db.count("SELECT COUNT(*) FROM employee_checklists").await, 1);
        assert_eq!(db.count("SELECT COUNT(*) FROM tasks").await, 1);
    }

    #[actix_web::test]
    async fn pending_checklist_cannot_jump_to_completed() {
        let Some(db) = TestDb::start().await else { return };
        let manager = db.insert_user("manager@shabra.ir", &[Role::Manager], None).await;
        let employee = db.insert_user("neda@shabra.ir", &[Role::Employee], Some(manager)).await;
        let template_id = insert_template(&db, "Onboarding", true, manager, &[task("Badge", None)]).await;
        let checklist_id = sqlx::query(
            "INSERT INTO employee_checklists (template_id, employee_id, assigned_by) VALUES (?, ?, ?)",
        )
        .bind(template_id)
        .bind(employee)
        .bind(manager)
        .execute(&db.pool)
        .await
        .unwrap()
        .last_insert_id();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(db.pool.clone()))
                .app_data(web::Data::new(test_config()))
                .route(
                    "/api/checklists/employee/{id}/status",
                    web::patch().to(update_checklist_status),
                ),
        )
        .await;

        let patch = |status: &str| {
            actix_test::TestRequest::patch()
                .uri(&format!("/api/checklists/employee/{}/status", checklist_id))
                .insert_header(bearer(manager, &[Role::Manager]))
                .set_json(json!({ "status": status }))
                .to_request()
        };

        let resp = actix_test::call_service(&app, patch("COMPLETED")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = actix_test::call_service(&app, patch("IN_PROGRESS")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = actix_test::call_service(&app, patch("COMPLETED")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["status"], "COMPLETED");
        assert!(!body["completedAt"].is_null());
    }
}
