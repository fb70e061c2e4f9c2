use actix_web::{
    HttpRequest, HttpResponse, ResponseError,
    error::{JsonPayloadError, QueryPayloadError},
    http::StatusCode,
};
use derive_more::Display;
use serde_json::{Value, json};
use sqlx::mysql::MySqlDatabaseError;

/// Error returned by every API handler. Bodies are always
/// `{"message": ..., "details"?: ...}`.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", message)]
    Validation {
        message: String,
        details: Option<Value>,
    },
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", message)]
    Conflict {
        message: String,
        details: Option<Value>,
    },
    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict_with(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Logs the underlying cause and hides it from the client.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{}", context);
        Self::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation {
                message,
                details: Some(details),
            }
            | ApiError::Conflict {
                message,
                details: Some(details),
            } => json!({ "message": message, "details": details }),
            other => json!({ "message": other.to_string() }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// MySQL `ER_DUP_ENTRY`. SQLSTATE 23000 alone also covers foreign-key failures.
const ER_DUP_ENTRY: u16 = 1062;
/// MySQL `ER_ROW_IS_REFERENCED_2`: a parent delete blocked by a child row.
const ER_ROW_IS_REFERENCED: u16 = 1451;

fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(MySqlDatabaseError::number),
        _ => None,
    }
}

pub fn is_duplicate_key(err: &sqlx::Error) -> bool {
    mysql_error_number(err) == Some(ER_DUP_ENTRY)
}

pub fn is_row_referenced(err: &sqlx::Error) -> bool {
    mysql_error_number(err) == Some(ER_ROW_IS_REFERENCED)
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("Record not found"),
            ref e if is_duplicate_key(e) => ApiError::conflict("Record already exists"),
            e => ApiError::internal("Database error", e),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `web::JsonConfig` hook: malformed bodies get the same shape as every
/// other validation error.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "Rejected JSON body");
    ApiError::validation_with("Invalid request body", json!({ "reason": err.to_string() })).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::validation_with("Invalid query string", json!({ "reason": err.to_string() })).into()
}
