use crate::{
    auth::{auth::AuthUser, password::hash_password},
    error::{ApiError, ApiResult, is_duplicate_key},
    model::{
        role::{Role, join_roles},
        user::{USER_COLUMNS, User, UserResponse},
    },
    utils::{
        db_utils::{Filter, UpdateBuilder, bind_scalar_values, bind_values},
        email_cache, email_filter,
        pagination::PageWindow,
        validation::{Violations, is_valid_email},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    #[schema(example = "سارا")]
    pub first_name: String,
    #[schema(example = "احمدی")]
    pub last_name: String,
    #[schema(example = "sara@shabra.ir")]
    pub email: String,
    #[schema(example = "a-long-password")]
    pub password: String,
    pub roles: Vec<Role>,
    pub manager_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub roles: Option<Vec<Role>>,
    /// `null` clears the manager, absent leaves it unchanged
    #[serde(default, with = "crate::utils::double_option")]
    #[schema(value_type = Option<u64>)]
    pub manager_id: Option<Option<u64>>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Matches first name, last name or email
    pub search: Option<String>,
}

const MIN_PASSWORD_LEN: usize = 8;

/// true => email can be registered.
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> ApiResult<bool> {
    let email = email_filter::normalize(email);

    // filter says "never seen" with certainty
    if !email_filter::might_exist(&email) {
        return Ok(true);
    }

    if email_cache::is_taken(&email).await {
        return Ok(false);
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(pool)
        .await
        .map_err(|e| ApiError::internal("Failed to check email availability", e))?;

    if count > 0 {
        email_cache::mark_taken(&email).await;
    }
    Ok(count == 0)
}

fn validate_create(payload: &CreateUser) -> ApiResult<()> {
    let mut v = Violations::new();
    v.require_text("firstName", &payload.first_name, 100);
    v.require_text("lastName", &payload.last_name, 100);
    v.check(is_valid_email(&payload.email), "email", "must be a valid email address");
    v.check(
        payload.password.chars().count() >= MIN_PASSWORD_LEN,
        "password",
        "must be at least 8 characters",
    );
    v.check(!payload.roles.is_empty(), "roles", "must contain at least one role");
    v.into_result()
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    validate_create(&payload)?;

    let email = email_filter::normalize(&payload.email);

    if !is_email_available(&email, pool.get_ref()).await? {
        return Err(ApiError::conflict("Email already registered"));
    }

    if let Some(manager_id) = payload.manager_id {
        match User::find_by_id(pool.get_ref(), manager_id).await? {
            Some(m) if m.is_active => {}
            _ => return Err(ApiError::validation("Manager not found or inactive")),
        }
    }

    let hashed = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("Failed to hash password", e))?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, roles, manager_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&email)
    .bind(hashed)
    .bind(join_roles(&payload.roles))
    .bind(payload.manager_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            ApiError::conflict("Email already registered")
        } else {
            ApiError::internal("Failed to create user", e)
        }
    })?;

    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    let user = User::find_by_id(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or_else(|| ApiError::internal("Created user vanished", result.last_insert_id()))?;

    info!(user_id = user.id, created_by = auth.user_id, "User created");

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated users", body = Object),
        (status = 403, description = "Admin/Manager only")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;

    let window = PageWindow::new(query.page, query.per_page);

    let mut filter = Filter::new();
    if let Some(role) = query.role {
        filter.push("FIND_IN_SET(?, roles) > 0", role.as_ref());
    }
    if let Some(active) = query.is_active {
        filter.push("is_active = ?", active);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = format!("%{}%", search);
        filter.push_many(
            "(first_name LIKE ? OR last_name LIKE ? OR email LIKE ?)",
            vec![like.clone().into(), like.clone().into(), like.into()],
        );
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM users{}", where_clause);
    debug!(sql = %count_sql, "Counting users");
    let total: i64 = bind_scalar_values(sqlx::query_scalar::<_, i64>(&count_sql), &filter.values)
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {} FROM users{} ORDER BY id DESC LIMIT ? OFFSET ?",
        USER_COLUMNS, where_clause
    );
    let users = bind_values(sqlx::query_as::<_, User>(&data_sql), &filter.values)
        .bind(window.per_page)
        .bind(window.offset())
        .fetch_all(pool.get_ref())
        .await?;

    let data = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(window.wrap(data, total)))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses((status = 200, description = "Caller profile", body = UserResponse)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let user = User::find_by_id(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Not allowed to view this user"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    if !auth.can_access_user(user_id) {
        return Err(ApiError::forbidden("Not allowed to view this user"));
    }

    let user = User::find_by_id(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[utoipa::path(
    patch,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();
    let payload = payload.into_inner();

    let mut v = Violations::new();
    if let Some(first) = &payload.first_name {
        v.require_text("firstName", first, 100);
    }
    if let Some(last) = &payload.last_name {
        v.require_text("lastName", last, 100);
    }
    if let Some(roles) = &payload.roles {
        v.check(!roles.is_empty(), "roles", "must contain at least one role");
    }
    v.check(
        payload.manager_id != Some(Some(user_id)),
        "managerId",
        "a user cannot manage themselves",
    );
    v.check(
        !(user_id == auth.user_id && payload.is_active == Some(false)),
        "isActive",
        "you cannot deactivate your own account",
    );
    v.into_result()?;

    if let Some(Some(manager_id)) = payload.manager_id {
        if User::find_by_id(pool.get_ref(), manager_id).await?.is_none() {
            return Err(ApiError::validation("Manager not found"));
        }
    }

    let mut update = UpdateBuilder::new("users");
    update
        .set_opt("first_name", payload.first_name.map(|s| s.trim().to_string()))
        .set_opt("last_name", payload.last_name.map(|s| s.trim().to_string()))
        .set_opt("roles", payload.roles.as_deref().map(join_roles))
        .set_opt("manager_id", payload.manager_id)
        .set_opt("is_active", payload.is_active);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let affected = update.execute(pool.get_ref(), user_id).await?;
    let user = User::find_by_id(pool.get_ref(), user_id).await?;

    match user {
        Some(user) => {
            info!(user_id, affected, updated_by = auth.user_id, "User updated");
            Ok(HttpResponse::Ok().json(UserResponse::from(user)))
        }
        None => Err(ApiError::not_found("User not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bearer, lazy_pool, test_config};
    use actix_web::{App, http::StatusCode, test as actix_test};

    #[test]
    fn create_payload_validation() {
        let payload = CreateUser {
            first_name: "".into(),
            last_name: "Karimi".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            roles: vec![],
            manager_id: None,
        };
        match validate_create(&payload) {
            Err(ApiError::Validation { details: Some(d), .. }) => {
                assert_eq!(d.as_array().map(Vec::len), Some(4))
            }
            _ => panic!("expected validation error"),
        }
    }

    #[test]
    fn manager_id_null_is_distinguished_from_absent() {
        let cleared: UpdateUser = serde_json::from_str(r#"{"managerId": null}"#).unwrap();
        assert_eq!(cleared.manager_id, Some(None));

        let untouched: UpdateUser = serde_json::from_str(r#"{"isActive": true}"#).unwrap();
        assert_eq!(untouched.manager_id, None);
    }

    #[actix_web::test]
    async fn employees_cannot_create_users() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/users", web::post().to(create_user)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/users")
            .insert_header(bearer(3, &[Role::Employee]))
            .set_json(serde_json::json!({
                "firstName": "Ali", "lastName": "Rezaei", "email": "ali@shabra.ir",
                "password": "long-enough", "roles": ["EMPLOYEE"]
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn self_deactivation_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/api/users/{id}", web::patch().to(update_user)),
        )
        .await;

        let req = actix_test::TestRequest::patch()
            .uri("/api/users/1")
            .insert_header(bearer(1, &[Role::Admin]))
            .set_json(serde_json::json!({ "isActive": false }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
