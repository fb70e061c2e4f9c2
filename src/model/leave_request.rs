use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
    Emergency,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Decision a reviewer may record on a pending request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl From<ReviewDecision> for LeaveStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approved => LeaveStatus::Approved,
            ReviewDecision::Rejected => LeaveStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<u64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Only present when the query joins `users`
    #[sqlx(default)]
    pub user_name: Option<String>,
}

pub const LEAVE_SELECT: &str = r#"
    SELECT lr.id, lr.user_id, lr.leave_type, lr.start_date, lr.end_date, lr.reason, lr.status,
           lr.rejection_reason, lr.reviewed_by, lr.reviewed_at, lr.created_at,
           CONCAT(u.first_name, ' ', u.last_name) AS user_name
    FROM leave_requests lr
    JOIN users u ON u.id = lr.user_id
"#;

impl LeaveRequest {
    pub fn status(&self) -> Option<LeaveStatus> {
        self.status.parse().ok()
    }

    /// Inclusive number of calendar days covered.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// Body-level check: a rejection needs a non-blank reason. Returns the
/// trimmed reason to store (approvals store none).
pub fn review_reason(
    decision: ReviewDecision,
    rejection_reason: Option<&str>,
) -> Result<Option<String>, ReviewError> {
    let reason = rejection_reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    match decision {
        ReviewDecision::Rejected if reason.is_none() => Err(ReviewError::MissingReason),
        ReviewDecision::Rejected => Ok(reason),
        ReviewDecision::Approved => Ok(None),
    }
}

/// Checks a reviewer decision against the current status. Only PENDING
/// requests can be decided.
pub fn validate_review(
    current: LeaveStatus,
    decision: ReviewDecision,
    rejection_reason: Option<&str>,
) -> Result<Option<String>, ReviewError> {
    let reason = review_reason(decision, rejection_reason)?;

    if current != LeaveStatus::Pending {
        return Err(ReviewError::AlreadyProcessed(current));
    }

    Ok(reason)
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReviewError {
    MissingReason,
    AlreadyProcessed(LeaveStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_pending() {
        assert_eq!(
            validate_review(LeaveStatus::Pending, ReviewDecision::Approved, Some("ignored")),
            Ok(None)
        );
    }

    #[test]
    fn reject_needs_reason() {
        assert_eq!(
            validate_review(LeaveStatus::Pending, ReviewDecision::Rejected, None),
            Err(ReviewError::MissingReason)
        );
        assert_eq!(
            validate_review(LeaveStatus::Pending, ReviewDecision::Rejected, Some("   ")),
            Err(ReviewError::MissingReason)
        );
        assert_eq!(
            validate_review(LeaveStatus::Pending, ReviewDecision::Rejected, Some(" busy week ")),
            Ok(Some("busy week".to_string()))
        );
    }

    #[test]
    fn decided_requests_are_final() {
        for status in [LeaveStatus::Approved, LeaveStatus::Rejected, LeaveStatus::Cancelled] {
            assert_eq!(
                validate_review(status, ReviewDecision::Approved, None),
                Err(ReviewError::AlreadyProcessed(status))
            );
        }
    }

    #[test]
    fn status_round_trips_through_column_text() {
        assert_eq!(LeaveStatus::Cancelled.to_string(), "CANCELLED");
        assert_eq!("APPROVED".parse::<LeaveStatus>(), Ok(LeaveStatus::Approved));
        assert_eq!(LeaveType::Emergency.as_ref(), "EMERGENCY");
    }

    #[test]
    fn day_span_is_inclusive() {
        let leave = LeaveRequest {
            id: 1,
            user_id: 1,
            leave_type: "ANNUAL".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 19).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
            reason: None,
            status: "APPROVED".into(),
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
            user_name: None,
        };
        assert_eq!(leave.days(), 3);
    }
}
