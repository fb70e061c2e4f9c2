use crate::{
    auth::{
        auth::bearer_token,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::role::{Role, parse_roles},
    models::{Claims, LoginReqDto, TokenType, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

/// Issues a token pair and stores the refresh token's jti.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    user_id: u64,
    email: &str,
    roles: &[Role],
) -> ApiResult<LoginResponse> {
    let access_token =
        generate_access_token(user_id, email, roles, &config.jwt_secret, config.access_token_ttl)
            .map_err(|e| ApiError::internal("Failed to sign access token", e))?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(user_id, email, roles, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(|e| ApiError::internal("Failed to sign refresh token", e))?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(|e| ApiError::internal("Failed to store refresh token", e))?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    let email = user.email.trim().to_lowercase();
    if email.is_empty() || user.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, email, password_hash, roles, is_active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Database error while fetching user", e))?;

    let db_user = match db_user {
        Some(u) if u.is_active => u,
        Some(_) => {
            info!("Login refused: user is deactivated");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        None => {
            info!("Invalid credentials: user not found");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let roles = parse_roles(&db_user.roles);
    let tokens = issue_tokens(pool.get_ref(), &config, db_user.id, &db_user.email, &roles).await?;

    // not fatal for the login itself
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(tokens))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let token = bearer_token(req)?;
    let claims = verify_token(token, &config.jwt_secret).ok()?;
    (claims.token_type == TokenType::Refresh).then_some(claims)
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = LoginResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let claims = refresh_claims(&req, &config)
        .ok_or_else(|| ApiError::unauthorized("Refresh token required"))?;

    // revoking in the same statement that checks the flag makes reuse fail
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND user_id = ? AND revoked = FALSE
        "#,
    )
    .bind(&claims.jti)
    .bind(claims.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Failed to revoke refresh token", e))?;

    if revoked.rows_affected() == 0 {
        info!(user_id = claims.user_id, "Refresh with unknown or revoked token");
        return Err(ApiError::unauthorized("Refresh token revoked"));
    }

    // roles may have changed since the token was issued
    let current = sqlx::query_as::<_, UserSql>(
        "SELECT id, email, password_hash, roles, is_active FROM users WHERE id = ?",
    )
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| ApiError::internal("Failed to load user for refresh", e))?;

    let user = match current {
        Some(u) if u.is_active => u,
        _ => return Err(ApiError::unauthorized("User is not active")),
    };

    let roles = parse_roles(&user.roles);
    let tokens = issue_tokens(pool.get_ref(), &config, user.id, &user.email, &roles).await?;

    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{lazy_pool, test_config};
    use actix_web::{App, http::StatusCode, test as actix_test};

    #[actix_web::test]
    async fn refresh_without_token_is_unauthorized() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/auth/refresh", web::post().to(refresh_token)),
        )
        .await;

        let req = actix_test::TestRequest::post().uri("/auth/refresh").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_rejects_access_tokens() {
        let config = test_config();
        let access =
            generate_access_token(1, "a@b.ir", &[Role::Admin], &config.jwt_secret, 60).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config))
                .route("/auth/refresh", web::post().to(refresh_token)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {}", access)))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_without_token_is_no_content() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/auth/logout", web::post().to(logout)),
        )
        .await;

        let req = actix_test::TestRequest::post().uri("/auth/logout").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn login_requires_both_fields() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({"email": " ", "password": ""}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
