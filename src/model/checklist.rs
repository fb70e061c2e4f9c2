use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::role::Role;

/// Due date offset when a template task has no estimate.
pub const DEFAULT_ESTIMATED_DAYS: u32 = 7;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChecklistStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ChecklistStatus {
    /// PENDING → IN_PROGRESS → COMPLETED; any open state may be CANCELLED.
    pub fn can_transition_to(self, next: ChecklistStatus) -> bool {
        use ChecklistStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChecklistTemplate {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistTemplateTask {
    pub id: u64,
    pub template_id: u64,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Role)]
    pub default_assignee_role: String,
    pub estimated_days: Option<u32>,
    #[serde(rename = "order")]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeChecklist {
    pub id: u64,
    pub template_id: u64,
    pub template_name: String,
    pub employee_id: u64,
    pub assigned_by: u64,
    #[schema(value_type = ChecklistStatus)]
    pub status: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub completed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const EMPLOYEE_CHECKLIST_SELECT: &str = r#"
    SELECT ec.id, ec.template_id, t.name AS template_name, ec.employee_id, ec.assigned_by,
           ec.status, ec.completed_at, ec.created_at
    FROM employee_checklists ec
    JOIN checklist_templates t ON t.id = ec.template_id
"#;

/// People the assignee switch can choose from.
#[derive(Debug, Clone, Copy)]
pub struct AssigneeCandidates {
    pub employee_id: u64,
    pub manager_id: Option<u64>,
    pub first_admin_id: Option<u64>,
    pub caller_id: u64,
}

/// EMPLOYEE → the employee; MANAGER → their manager, else the caller;
/// ADMIN → the first admin, else the caller.
pub fn resolve_assignee(role: Role, candidates: &AssigneeCandidates) -> u64 {
    match role {
        Role::Employee => candidates.employee_id,
        Role::Manager => candidates.manager_id.unwrap_or(candidates.caller_id),
        Role::Admin => candidates.first_admin_id.unwrap_or(candidates.caller_id),
    }
}

pub fn due_date(now: DateTime<Utc>, estimated_days: Option<u32>) -> DateTime<Utc> {
    now + Duration::days(i64::from(estimated_days.unwrap_or(DEFAULT_ESTIMATED_DAYS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidates(manager: Option<u64>, admin: Option<u64>) -> AssigneeCandidates {
        AssigneeCandidates {
            employee_id: 20,
            manager_id: manager,
            first_admin_id: admin,
            caller_id: 5,
        }
    }

    #[test]
    fn employee_tasks_go_to_the_employee() {
        assert_eq!(resolve_assignee(Role::Employee, &candidates(Some(9), Some(1))), 20);
    }

    #[test]
    fn manager_tasks_fall_back_to_caller() {
        assert_eq!(resolve_assignee(Role::Manager, &candidates(Some(9), None)), 9);
        assert_eq!(resolve_assignee(Role::Manager, &candidates(None, None)), 5);
    }

    #[test]
    fn admin_tasks_fall_back_to_caller() {
        assert_eq!(resolve_assignee(Role::Admin, &candidates(None, Some(1))), 1);
        assert_eq!(resolve_assignee(Role::Admin, &candidates(None, None)), 5);
    }

    #[test]
    fn due_date_defaults_to_a_week() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(due_date(now, None), Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap());
        assert_eq!(due_date(now, Some(2)), Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn terminal_states_are_final() {
        use ChecklistStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(Pending));
    }

    #[test]
    fn pending_cannot_skip_in_progress() {
        use ChecklistStatus::*;
        assert!(!Pending.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Completed));
    }
}
