use std::collections::HashSet;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

/// Longest window the forecast will compute, inclusive.
pub const MAX_FORECAST_DAYS: i64 = 92;

/// The office week ends on Friday.
const WEEKEND: Weekday = Weekday::Fri;

#[derive(Deserialize, IntoParams)]
pub struct ForecastQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovedLeave {
    pub user_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DayCapacity {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub is_working_day: bool,
    pub total_employees: i64,
    pub on_leave: i64,
    pub available: i64,
    /// 0..100, one decimal
    pub capacity_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSummary {
    pub working_days: usize,
    pub average_capacity: f64,
    pub lowest_capacity_day: Option<DayCapacity>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Forecast {
    pub days: Vec<DayCapacity>,
    pub summary: ForecastSummary,
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn validate_range(from: NaiveDate, to: NaiveDate) -> ApiResult<()> {
    if from > to {
        return Err(ApiError::validation("from cannot be after to"));
    }
    let span = (to - from).num_days() + 1;
    if span > MAX_FORECAST_DAYS {
        return Err(ApiError::validation(format!(
            "range cannot exceed {} days",
            MAX_FORECAST_DAYS
        )));
    }
    Ok(())
}

/// Per-day team capacity for `from..=to`. A person counts once per day no
/// matter how many approved requests cover it.
pub fn forecast_capacity(
    from: NaiveDate,
    to: NaiveDate,
    total_employees: i64,
    leaves: &[ApprovedLeave],
) -> Vec<DayCapacity> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|date| {
            let absent: HashSet<u64> = leaves
                .iter()
                .filter(|l| l.start_date <= date && date <= l.end_date)
                .map(|l| l.user_id)
                .collect();

            let on_leave = (absent.len() as i64).min(total_employees.max(0));
            let available = total_employees.max(0) - on_leave;
            let capacity_percent = if total_employees > 0 {
                round_one_decimal(available as f64 * 100.0 / total_employees as f64)
            } else {
                0.0
            };

            DayCapacity {
                date,
                is_working_day: date.weekday() != WEEKEND,
                total_employees,
                on_leave,
                available,
                capacity_percent,
            }
        })
        .collect()
}

pub fn summarize(days: &[DayCapacity]) -> ForecastSummary {
    let working: Vec<&DayCapacity> = days.iter().filter(|d| d.is_working_day).collect();

    let average_capacity = if working.is_empty() {
        0.0
    } else {
        round_one_decimal(working.iter().map(|d| d.capacity_percent).sum::<f64>() / working.len() as f64)
    };

    // earliest day wins a tie
    let lowest_capacity_day = working
        .iter()
        .copied()
        .fold(None::<&DayCapacity>, |low, day| match low {
            Some(l) if l.capacity_percent <= day.capacity_percent => Some(l),
            _ => Some(day),
        })
        .cloned();

    ForecastSummary {
        working_days: working.len(),
        average_capacity,
        lowest_capacity_day,
    }
}

#[utoipa::path(
    get,
    path = "/api/calendar/forecast",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Daily capacity with summary", body = Forecast),
        (status = 400, description = "Invalid range"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Calendar"
)]
pub async fn capacity_forecast(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ForecastQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin_or_manager()?;
    let ForecastQuery { from, to } = query.into_inner();
    validate_range(from, to)?;

    let total_employees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
        .fetch_one(pool.get_ref())
        .await?;

    let leaves = sqlx::query_as::<_, ApprovedLeave>(
        r#"
        SELECT lr.user_id, lr.start_date, lr.end_date
        FROM leave_requests lr
        JOIN users u ON u.id = lr.user_id
        WHERE lr.status = 'APPROVED'
          AND u.is_active = TRUE
          AND lr.start_date <= ?
          AND lr.end_date >= ?
        "#,
    )
    .bind(to)
    .bind(from)
    .fetch_all(pool.get_ref())
    .await?;

    debug!(%from, %to, total_employees, leaves = leaves.len(), "Computing capacity forecast");

    let days = forecast_capacity(from, to, total_employees, &leaves);
    let summary = summarize(&days);

    Ok(HttpResponse::Ok().json(Forecast { days, summary }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        // March 2024: the 1st is a Friday
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn leave(user_id: u64, start: u32, end: u32) -> ApprovedLeave {
        ApprovedLeave {
            user_id,
            start_date: d(start),
            end_date: d(end),
        }
    }

    #[test]
    fn counts_distinct_people_per_day() {
        let leaves = vec![leave(1, 2, 4), leave(1, 3, 3), leave(2, 4, 6)];
        let days = forecast_capacity(d(2), d(6), 3, &leaves);

        assert_eq!(days.len(), 5);
        assert_eq!(days.iter().map(|x| x.on_leave).collect::<Vec<_>>(), vec![1, 1, 2, 1, 1]);
        assert_eq!(days[2].available, 1);
        assert_eq!(days[2].capacity_percent, 33.3);
        assert_eq!(days[0].capacity_percent, 66.7);
    }

    #[test]
    fn friday_is_not_a_working_day() {
        let days = forecast_capacity(d(1), d(2), 4, &[]);
        assert!(!days[0].is_working_day);
        assert!(days[1].is_working_day);
        assert_eq!(days[1].capacity_percent, 100.0);
    }

    #[test]
    fn no_employees_means_zero_capacity() {
        let days = forecast_capacity(d(4), d(4), 0, &[leave(9, 4, 4)]);
        assert_eq!(days[0].on_leave, 0);
        assert_eq!(days[0].capacity_percent, 0.0);
    }

    #[test]
    fn summary_ignores_weekends() {
        // the 1st (Friday) has everyone off but is not a working day
        let leaves = vec![leave(1, 1, 1), leave(2, 1, 1), leave(1, 3, 3)];
        let days = forecast_capacity(d(1), d(4), 2, &leaves);
        let summary = summarize(&days);

        assert_eq!(summary.working_days, 3);
        assert_eq!(summary.average_capacity, 83.3);
        assert_eq!(summary.lowest_capacity_day.map(|x| x.date), Some(d(3)));
    }

    #[test]
    fn range_limits() {
        assert!(validate_range(d(5), d(4)).is_err());
        assert!(validate_range(d(1), d(1) + chrono::Duration::days(91)).is_ok());
        assert!(validate_range(d(1), d(1) + chrono::Duration::days(92)).is_err());
    }
}
