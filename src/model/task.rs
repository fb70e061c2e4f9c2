use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Kanban column. Wire and column text are PascalCase (`InProgress`).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = TaskStatus)]
    pub status: String,
    pub assigned_to: u64,
    pub created_by: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub due_date: Option<DateTime<Utc>>,
    pub project_id: Option<u64>,
    pub employee_checklist_id: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const TASK_COLUMNS: &str = "id, title, description, status, assigned_to, created_by, due_date, \
     project_id, employee_checklist_id, created_at";

impl Task {
    pub fn status(&self) -> TaskStatus {
        self.status.parse().unwrap_or_default()
    }

    /// Assignee, creator and reviewers may edit a task.
    pub fn editable_by(&self, user_id: u64, is_reviewer: bool) -> bool {
        is_reviewer || self.assigned_to == user_id || self.created_by == user_id
    }
}

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskBoard {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl TaskBoard {
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut board = TaskBoard::default();
        for task in tasks {
            match task.status() {
                TaskStatus::Todo => board.todo.push(task),
                TaskStatus::InProgress => board.in_progress.push(task),
                TaskStatus::Done => board.done.push(task),
            }
        }
        board
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    pub todo_count: i64,
    pub in_progress_count: i64,
    pub done_count: i64,
}
