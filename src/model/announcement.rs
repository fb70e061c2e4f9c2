use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: u64,
    #[schema(example = "تعطیلی نوروز")]
    pub title: String,
    pub content: String,
    pub is_pinned: bool,
    pub author_id: u64,
    pub author_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
