use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    #[default]
    Draft,
    Ready,
    Published,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryType {
    pub id: u64,
    pub name: String,
    pub icon: Option<String>,
    pub story_count: i64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: u64,
    pub title: String,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub story_date: NaiveDate,
    #[schema(value_type = StoryStatus)]
    pub status: String,
    pub story_type_id: Option<u64>,
    pub project_id: Option<u64>,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const STORY_COLUMNS: &str =
    "id, title, notes, story_date, status, story_type_id, project_id, sort_order, created_by, created_at";
