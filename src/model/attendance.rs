use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 12)]
    pub user_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
}

impl Attendance {
    /// Worked minutes; an open row counts up to `now`.
    pub fn worked_minutes(&self, now: DateTime<Utc>) -> i64 {
        let end = self.check_out.unwrap_or(now);
        (end - self.check_in).num_minutes().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn open_row_counts_until_now() {
        let check_in = Utc.with_ymd_and_hms(2024, 5, 4, 8, 0, 0).unwrap();
        let row = Attendance {
            id: 1,
            user_id: 2,
            check_in,
            check_out: None,
        };

        let now = Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 0).unwrap();
        assert_eq!(row.worked_minutes(now), 270);

        let closed = Attendance {
            check_out: Some(Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap()),
            ..row
        };
        assert_eq!(closed.worked_minutes(now), 60);
    }
}
