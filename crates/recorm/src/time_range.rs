//! Symbolic date filters (`today`, `last week`, `m`, ...) resolved to epoch seconds.

use crate::error::{OrmError, OrmResult};
use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde_json::{Value, json};

/// The comparison value of a time filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeExpr {
    /// One point in time: compared with the given operator.
    At(String),
    /// `[start, end]`, usually with `between`.
    Range(String, String),
}

impl From<&str> for TimeExpr {
    fn from(expr: &str) -> Self {
        TimeExpr::At(expr.to_string())
    }
}

impl From<i64> for TimeExpr {
    fn from(epoch: i64) -> Self {
        TimeExpr::At(epoch.to_string())
    }
}

impl From<(&str, &str)> for TimeExpr {
    fn from((start, end): (&str, &str)) -> Self {
        TimeExpr::Range(start.to_string(), end.to_string())
    }
}

/// A resolved filter: operator plus the epoch value (or `[start, end]` list).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeFilter {
    pub op: String,
    pub value: Value,
}

fn expand_shortcut(name: &str) -> &str {
    match name {
        "d" => "today",
        "w" => "week",
        "m" => "month",
        "y" => "year",
        other => other,
    }
}

fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> OrmResult<i64> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|ts| ts.timestamp())
        .ok_or_else(|| OrmError::invalid_query(format!("no local midnight on {date}")))
}

fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// `[start, end)` of a named range relative to `now`, or `None` when `name`
/// is not a known range.
pub fn shortcut_range_at<Tz: TimeZone>(name: &str, now: &DateTime<Tz>) -> OrmResult<Option<(i64, i64)>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let week_start = shift_days(today, -i64::from(today.weekday().num_days_from_monday()));
    let month_start = today.with_day(1);
    let year_start = NaiveDate::from_ymd_opt(today.year(), 1, 1);

    let bounds = match expand_shortcut(name.trim().to_ascii_lowercase().as_str()) {
        "today" => Some(today).zip(shift_days(today, 1)),
        "yesterday" => shift_days(today, -1).zip(Some(today)),
        "week" => week_start.zip(week_start.and_then(|d| shift_days(d, 7))),
        "last week" => week_start.and_then(|d| shift_days(d, -7)).zip(week_start),
        "month" => month_start.zip(month_start.and_then(|d| d.checked_add_months(Months::new(1)))),
        "last month" => month_start
            .and_then(|d| d.checked_sub_months(Months::new(1)))
            .zip(month_start),
        "year" => year_start.zip(year_start.and_then(|d| d.checked_add_months(Months::new(12)))),
        "last year" => year_start
            .and_then(|d| d.checked_sub_months(Months::new(12)))
            .zip(year_start),
        _ => return Ok(None),
    };

    let (start, end) = bounds.ok_or_else(|| OrmError::invalid_query(format!("time range '{name}' out of bounds")))?;
    Ok(Some((midnight(&tz, start)?, midnight(&tz, end)?)))
}

/// Resolve one point expression (epoch seconds, a date, a datetime or one of
/// `now`/`today`/`tomorrow`/`yesterday`) to epoch seconds.
pub fn point_at<Tz: TimeZone>(expr: &str, now: &DateTime<Tz>) -> OrmResult<i64> {
    let expr = expr.trim();
    if let Ok(epoch) = expr.parse::<i64>() {
        return Ok(epoch);
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let relative = match expr.to_ascii_lowercase().as_str() {
        "now" => return Ok(now.timestamp()),
        "today" => Some(today),
        "tomorrow" => shift_days(today, 1),
        "yesterday" => shift_days(today, -1),
        _ => None,
    };
    if let Some(date) = relative {
        return midnight(&tz, date);
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(expr, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.timestamp())
                .ok_or_else(|| OrmError::invalid_query(format!("'{expr}' does not exist locally")));
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(expr, format) {
            return midnight(&tz, date);
        }
    }

    Err(OrmError::invalid_query(format!(
        "unrecognized time expression '{expr}'"
    )))
}

/// Resolve a time filter relative to `now`.
///
/// Without `range`, `op` names the range: a known shortcut becomes a
/// `within` filter over `[start, end)`, anything else is a point compared
/// with `>=`. With `range`, `op` is the comparison operator; `between` a
/// named range is also half-open.
pub fn resolve_at<Tz: TimeZone>(op: &str, range: Option<&TimeExpr>, now: &DateTime<Tz>) -> OrmResult<TimeFilter> {
    match range {
        None => match shortcut_range_at(op, now)? {
            Some((start, end)) => Ok(TimeFilter {
                op: "within".to_string(),
                value: json!([start, end]),
            }),
            None => Ok(TimeFilter {
                op: ">=".to_string(),
                value: json!(point_at(op, now)?),
            }),
        },
        Some(TimeExpr::At(expr)) => {
            let op = op.trim().to_ascii_lowercase();
            match shortcut_range_at(expr, now)? {
                // A named range is a half-open interval.
                Some((start, end)) if op == "between" => Ok(TimeFilter {
                    op: "within".to_string(),
                    value: json!([start, end]),
                }),
                Some((start, end)) => Ok(TimeFilter {
                    op,
                    value: json!([start, end]),
                }),
                None => Ok(TimeFilter {
                    op,
                    value: json!(point_at(expr, now)?),
                }),
            }
        }
        Some(TimeExpr::Range(start, end)) => Ok(TimeFilter {
            op: op.trim().to_ascii_lowercase(),
            value: json!([point_at(start, now)?, point_at(end, now)?]),
        }),
    }
}

/// [`resolve_at`] against the local clock.
pub fn resolve(op: &str, range: Option<&TimeExpr>) -> OrmResult<TimeFilter> {
    resolve_at(op, range, &Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    // Wednesday 2024-03-13 15:30:00 UTC
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 15, 30, 0).unwrap()
    }

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn today_spans_midnight_to_midnight() {
        let filter = resolve_at("today", None, &now()).unwrap();
        assert_eq!(filter.op, "within");
        assert_eq!(filter.value, json!([ts(2024, 3, 13), ts(2024, 3, 14)]));

        let short = resolve_at("d", None, &now()).unwrap();
        assert_eq!(short, filter);
    }

    #[test]
    fn yesterday_ends_at_today() {
        let range = shortcut_range_at("yesterday", &now()).unwrap().unwrap();
        assert_eq!(range, (ts(2024, 3, 12), ts(2024, 3, 13)));
    }

    #[test]
    fn weeks_start_on_monday() {
        assert_eq!(
            shortcut_range_at("week", &now()).unwrap(),
            Some((ts(2024, 3, 11), ts(2024, 3, 18)))
        );
        assert_eq!(
            shortcut_range_at("last week", &now()).unwrap(),
            Some((ts(2024, 3, 4), ts(2024, 3, 11)))
        );
    }

    #[test]
    fn months_and_years_cross_boundaries() {
        assert_eq!(
            shortcut_range_at("m", &now()).unwrap(),
            Some((ts(2024, 3, 1), ts(2024, 4, 1)))
        );
        assert_eq!(
            shortcut_range_at("last month", &now()).unwrap(),
            Some((ts(2024, 2, 1), ts(2024, 3, 1)))
        );
        assert_eq!(
            shortcut_range_at("Y", &now()).unwrap(),
            Some((ts(2024, 1, 1), ts(2025, 1, 1)))
        );
        assert_eq!(
            shortcut_range_at("last year", &now()).unwrap(),
            Some((ts(2023, 1, 1), ts(2024, 1, 1)))
        );
    }

    #[test]
    fn plain_dates_compare_with_gte() {
        let filter = resolve_at("2024-01-05", None, &now()).unwrap();
        assert_eq!(filter.op, ">=");
        assert_eq!(filter.value, json!(ts(2024, 1, 5)));
    }

    #[test]
    fn explicit_operator_and_range() {
        let filter = resolve_at("<", Some(&TimeExpr::from("2024/02/01")), &now()).unwrap();
        assert_eq!(filter, TimeFilter { op: "<".into(), value: json!(ts(2024, 2, 1)) });

        let filter = resolve_at(
            "BETWEEN",
            Some(&TimeExpr::from(("2024-01-01", "2024-01-02 12:00:00"))),
            &now(),
        )
        .unwrap();
        assert_eq!(filter.op, "between");
        assert_eq!(filter.value, json!([ts(2024, 1, 1), ts(2024, 1, 2) + 12 * 3600]));
    }

    #[test]
    fn epoch_seconds_pass_through() {
        assert_eq!(point_at("1700000000", &now()).unwrap(), 1_700_000_000);
        assert_eq!(point_at("tomorrow", &now()).unwrap(), ts(2024, 3, 14));
    }

    #[test]
    fn between_a_named_range_stays_half_open() {
        let filter = resolve_at("between", Some(&TimeExpr::from("yesterday")), &now()).unwrap();
        assert_eq!(filter.op, "within");
        assert_eq!(filter.value, json!([ts(2024, 3, 12), ts(2024, 3, 13)]));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(resolve_at("fortnight", None, &now()).is_err());
    }
}
