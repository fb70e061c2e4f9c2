use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::task::Project,
    utils::validation::Violations,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const PROJECT_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.created_by, p.created_at,
           CAST(COALESCE(SUM(t.status = 'Todo'), 0) AS SIGNED) AS todo_count,
           CAST(COALESCE(SUM(t.status = 'InProgress'), 0) AS SIGNED) AS in_progress_count,
           CAST(COALESCE(SUM(t.status = 'Done'), 0) AS SIGNED) AS done_count
    FROM projects p
    LEFT JOIN tasks t ON t.project_id = p.id
"#;

const PROJECT_GROUP_BY: &str = " GROUP BY p.id, p.name, p.description, p.created_by, p.created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateProject {
    #[schema(example = "کمپین نوروز")]
    pub name: String,
    pub description: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProject,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Projects"
)]
pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateProject>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;

    let mut v = Violations::new();
    v.require_text("name", &payload.name, 150);
    v.optional_text("description", payload.description.as_deref(), 5000);
    v.into_result()?;

    let result = sqlx::query("INSERT INTO projects (name, description, created_by) VALUES (?, ?, ?)")
        .bind(payload.name.trim())
        .bind(payload.description.as_deref())
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::internal("Create project failed", e))?;

    let project_id = result.last_insert_id();
    let project = sqlx::query_as::<_, Project>(&format!("{} WHERE p.id = ?{}", PROJECT_SELECT, PROJECT_GROUP_BY))
        .bind(project_id)
        .fetch_one(pool.get_ref())
        .await?;

    info!(project_id, created_by = auth.user_id, "Project created");
    Ok(HttpResponse::Created().json(project))
}

#[utoipa::path(
    get,
    path = "/api/projects",
    responses((status = 200, description = "Projects with task counts per status", body = [Project])),
    security(("bearer_auth" = [])),
    tag = "Projects"
)]
pub async fn list_projects(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let projects = sqlx::query_as::<_, Project>(&format!(
        "{}{} ORDER BY p.created_at DESC",
        PROJECT_SELECT, PROJECT_GROUP_BY
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(projects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::testing::{bearer, lazy_pool, test_config};
    use actix_web::{App, http::StatusCode, test as actix_test};
    use serde_json::json;

    #[actix_web::test]
    async fn employees_cannot_create_projects() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/projects", web::post().to(create_project)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/projects")
            .insert_header(bearer(9, &[Role::Employee]))
            .set_json(json!({ "name": "Launch" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
