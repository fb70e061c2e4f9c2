use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, FromRow, MySql};
use utoipa::ToSchema;

use crate::model::role::{Role, parse_roles};

pub const USER_COLUMNS: &str =
    "id, first_name, last_name, email, roles, manager_id, is_active, last_login_at, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: String,
    pub manager_id: Option<u64>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role_set(&self) -> Vec<Role> {
        parse_roles(&self.roles)
    }

    pub async fn find_by_id<'e, E>(db: E, id: u64) -> Result<Option<User>, sqlx::Error>
    where
        E: Executor<'e, Database = MySql>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Oldest active user holding the ADMIN role.
    pub async fn first_admin<'e, E>(db: E) -> Result<Option<User>, sqlx::Error>
    where
        E: Executor<'e, Database = MySql>,
    {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE FIND_IN_SET('ADMIN', roles) > 0 AND is_active = TRUE ORDER BY id ASC LIMIT 1",
            USER_COLUMNS
        ))
        .fetch_optional(db)
        .await
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "سارا")]
    pub first_name: String,
    #[schema(example = "احمدی")]
    pub last_name: String,
    #[schema(example = "sara@shabra.ir")]
    pub email: String,
    pub roles: Vec<Role>,
    #[schema(example = 3, nullable = true)]
    pub manager_id: Option<u64>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let roles = user.role_set();
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            roles,
            manager_id: user.manager_id,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
