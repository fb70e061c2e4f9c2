use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::{Role, parse_roles};
use crate::models::{Claims, TokenType};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub roles: Vec<Role>,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::unauthorized("Access token required"));
        }

        let roles = parse_roles(&claims.roles);
        if roles.is_empty() {
            return Err(ApiError::unauthorized("Invalid role"));
        }

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            roles,
        })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_admin_or_manager(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Manager)
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }

    pub fn require_admin_or_manager(&self) -> Result<(), ApiError> {
        if self.is_admin_or_manager() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin/Manager only"))
        }
    }

    /// Reviewers may see anyone's records, everyone else only their own.
    pub fn can_access_user(&self, user_id: u64) -> bool {
        self.user_id == user_id || self.is_admin_or_manager()
    }
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on the protected scope
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match bearer_token(req) {
            Some(t) => t,
            None => return ready(Err(ApiError::unauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ApiError::internal("Request guard", "Config missing"))),
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ApiError::unauthorized("Invalid token"))),
        };

        ready(AuthUser::from_claims(claims))
    }
}
