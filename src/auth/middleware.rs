use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

fn reject(req: ServiceRequest, resp: HttpResponse) -> Result<ServiceResponse<BoxBody>, Error> {
    Ok(req.into_response(resp.map_into_boxed_body()))
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => match h.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => {
                let resp = HttpResponse::Unauthorized()
                    .json(json!({"message": "Invalid Authorization header encoding"}));
                return reject(req, resp);
            }
        },
        None => {
            let resp =
                HttpResponse::Unauthorized().json(json!({"message": "Missing Authorization header"}));
            return reject(req, resp);
        }
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t.trim(),
        None => {
            let resp = HttpResponse::Unauthorized()
                .json(json!({"message": "Authorization header must start with Bearer"}));
            return reject(req, resp);
        }
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            let resp = HttpResponse::Unauthorized()
                .json(json!({"message": "Invalid or expired token"}));
            return reject(req, resp);
        }
    };

    let auth_user = match AuthUser::from_claims(claims) {
        Ok(user) => user,
        Err(e) => {
            let resp = HttpResponse::Unauthorized().json(json!({"message": e.to_string()}));
            return reject(req, resp);
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

/// Rejects browser requests whose `Origin` is not in `TRUSTED_ORIGINS`.
/// Requests without an `Origin` header (server-to-server, curl) pass.
pub async fn origin_guard(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let allowed = match req.app_data::<Data<Config>>() {
        Some(config) => {
            let origin = req
                .headers()
                .get("Origin")
                .and_then(|h| h.to_str().ok())
                .map(|o| o.trim_end_matches('/').to_string());
            is_origin_allowed(&config.trusted_origins, origin.as_deref())
        }
        None => true,
    };

    if !allowed {
        tracing::warn!(path = %req.path(), "request from untrusted origin rejected");
        let resp = HttpResponse::Forbidden().json(json!({"message": "Origin not allowed"}));
        return reject(req, resp);
    }

    next.call(req).await
}

pub fn is_origin_allowed(trusted: &[String], origin: Option<&str>) -> bool {
    match origin {
        _ if trusted.is_empty() => true,
        None => true,
        Some(origin) => trusted.iter().any(|t| t.eq_ignore_ascii_case(origin)),
    }
}
