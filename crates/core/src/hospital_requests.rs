//! Hospital blood request prioritisation.
//!
//! Only pending requests are prioritised:
//!
//! | condition                       | level | urgent |
//! |---------------------------------|-------|--------|
//! | ASAP                            | 5     | yes    |
//! | no deadline                     | 1     | no     |
//! | deadline within 3 days (or past)| 3     | yes    |
//! | later deadline                  | 2     | no     |
//!
//! Urgent requests are critical when overdue or less than six hours remain.

use crate::records::HospitalRequestRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub const NO_DEADLINE: &str = "No deadline specified";

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRemaining {
    /// Signed hours until the deadline; negative when overdue.
    pub hours: f64,
    pub is_overdue: bool,
    pub display: String,
}

/// Human-readable time left until `deadline`.
pub fn time_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> TimeRemaining {
    let hours = (deadline - now).num_seconds() as f64 / 3600.0;
    let is_overdue = now > deadline;

    let display = if is_overdue {
        let overdue = hours.abs();
        if overdue < 1.0 {
            format!("Overdue: {} minutes", (overdue * 60.0).round())
        } else if overdue < 24.0 {
            format!("Overdue: {} hours", overdue.round())
        } else {
            format!("Overdue: {} days", (overdue / 24.0).round())
        }
    } else if hours < 1.0 {
        format!("{} minutes remaining", (hours * 60.0).round())
    } else if hours < 24.0 {
        format!("{} hours remaining", hours.round())
    } else {
        let whole = hours.trunc() as i64;
        let days = whole / 24;
        match whole % 24 {
            0 => format!("{days} days remaining"),
            h => format!("{days} days, {h} hours remaining"),
        }
    };

    TimeRemaining {
        hours,
        is_overdue,
        display,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestPriority {
    /// 0 for non-pending requests, otherwise 1..=5.
    pub level: u8,
    pub is_urgent: bool,
    pub is_critical: bool,
    /// Between zero and one day left, not overdue.
    pub is_one_day_before: bool,
    pub time_remaining: String,
    pub hours_remaining: Option<f64>,
}

impl RequestPriority {
    fn none() -> Self {
        Self {
            level: 0,
            is_urgent: false,
            is_critical: false,
            is_one_day_before: false,
            time_remaining: String::new(),
            hours_remaining: None,
        }
    }
}

/// Requests with no status are treated as pending.
pub fn request_priority(request: &HospitalRequestRecord, now: DateTime<Utc>) -> RequestPriority {
    let pending = request
        .status
        .as_deref()
        .is_none_or(|s| s.trim().eq_ignore_ascii_case("pending"));
    if !pending {
        return RequestPriority::none();
    }

    let remaining = request.when_needed.map(|d| time_remaining(d, now));
    let hours = remaining.as_ref().map(|r| r.hours);
    let overdue = remaining.as_ref().is_some_and(|r| r.is_overdue);
    let display = remaining
        .as_ref()
        .map(|r| r.display.clone())
        .unwrap_or_else(|| NO_DEADLINE.to_string());
    let critical = overdue || hours.is_some_and(|h| h < 6.0);
    let one_day_before = !overdue && hours.is_some_and(|h| h > 0.0 && h <= 24.0);

    if request.is_asap == Some(true) {
        return RequestPriority {
            level: 5,
            is_urgent: true,
            is_critical: critical,
            is_one_day_before: one_day_before,
            time_remaining: display,
            hours_remaining: hours,
        };
    }

    match hours {
        None => RequestPriority {
            level: 1,
            time_remaining: NO_DEADLINE.to_string(),
            ..RequestPriority::none()
        },
        Some(h) if h <= 72.0 => RequestPriority {
            level: 3,
            is_urgent: true,
            is_critical: critical,
            is_one_day_before: one_day_before,
            time_remaining: display,
            hours_remaining: hours,
        },
        Some(_) => RequestPriority {
            level: 2,
            time_remaining: display,
            hours_remaining: hours,
            ..RequestPriority::none()
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrioritisedRequest {
    pub request: HospitalRequestRecord,
    pub priority: RequestPriority,
}

/// Optionally filters by status, then orders by priority level (highest first) and deadline
/// (soonest first, undated last).
pub fn prioritise_requests(
    requests: Vec<HospitalRequestRecord>,
    status: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<PrioritisedRequest> {
    let status = status.map(str::trim).filter(|s| !s.is_empty());
    let mut rows: Vec<PrioritisedRequest> = requests
        .into_iter()
        .filter(|r| {
            status.is_none_or(|wanted| {
                r.status
                    .as_deref()
                    .is_some_and(|s| s.trim().eq_ignore_ascii_case(wanted))
            })
        })
        .map(|request| PrioritisedRequest {
            priority: request_priority(&request, now),
            request,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.priority
            .level
            .cmp(&a.priority.level)
            .then_with(|| match (a.request.when_needed, b.request.when_needed) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 10, 12, 0, 0).unwrap()
    }

    fn request(id: &str, asap: bool, in_hours: Option<i64>, status: &str) -> HospitalRequestRecord {
        HospitalRequestRecord {
            request_id: id.into(),
            is_asap: Some(asap),
            when_needed: in_hours.map(|h| now() + Duration::hours(h)),
            status: Some(status.into()),
            ..Default::default()
        }
    }

    #[test]
    fn asap_is_top_priority() {
        let p = request_priority(&request("1", true, Some(200), "Pending"), now());
        assert_eq!(p.level, 5);
        assert!(p.is_urgent);
        assert!(!p.is_critical);
    }

    #[test]
    fn deadline_bands() {
        assert_eq!(request_priority(&request("1", false, None, "pending"), now()).level, 1);
        assert_eq!(request_priority(&request("1", false, Some(72), "pending"), now()).level, 3);
        assert_eq!(request_priority(&request("1", false, Some(73), "pending"), now()).level, 2);

        let soon = request_priority(&request("1", false, Some(5), "pending"), now());
        assert!(soon.is_critical);
        assert!(soon.is_one_day_before);

        let overdue = request_priority(&request("1", false, Some(-30), "pending"), now());
        assert_eq!(overdue.level, 3);
        assert!(overdue.is_critical);
        assert!(!overdue.is_one_day_before);
        assert_eq!(overdue.time_remaining, "Overdue: 30 hours");
    }

    #[test]
    fn non_pending_requests_have_no_priority() {
        let p = request_priority(&request("1", true, Some(1), "Approved"), now());
        assert_eq!(p.level, 0);
        assert!(!p.is_urgent);
    }

    #[test]
    fn display_strings() {
        let t = |mins: i64| time_remaining(now() + Duration::minutes(mins), now()).display;
        assert_eq!(t(45), "45 minutes remaining");
        assert_eq!(t(5 * 60), "5 hours remaining");
        assert_eq!(t(50 * 60), "2 days, 2 hours remaining");
        assert_eq!(t(48 * 60), "2 days remaining");
        assert_eq!(t(-20), "Overdue: 20 minutes");
        assert_eq!(t(-3 * 24 * 60), "Overdue: 3 days");
    }

    #[test]
    fn listing_orders_by_level_then_deadline() {
        let rows = prioritise_requests(
            vec![
                request("later", false, Some(100), "Pending"),
                request("none", false, None, "Pending"),
                request("asap", true, None, "Pending"),
                request("soon", false, Some(10), "Pending"),
                request("sooner", false, Some(2), "Pending"),
                request("done", false, Some(1), "Completed"),
            ],
            None,
            now(),
        );
        let ids: Vec<&str> = rows.iter().map(|r| r.request.request_id.as_str()).collect();
        assert_eq!(ids, ["asap", "sooner", "soon", "later", "none", "done"]);

        let completed = prioritise_requests(
            vec![request("a", false, None, "Pending"), request("b", false, None, "completed")],
            Some("Completed"),
            now(),
        );
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].request.request_id, "b");
    }
}
