//! Duplicate donor detection and eligibility assessment.
//!
//! A registration is a duplicate when an existing donor has the same surname, first name and
//! birthdate, a matching middle name, and at least one eligibility record. The latest
//! eligibility record of the first such donor drives the assessment shown to staff.

use crate::constants::DONATION_INTERVAL_DAYS;
use crate::records::{DonorRecord, EligibilityRecord};
use crate::validation::{parse_iso_date, FieldErrors};
use crate::BloodBankResult;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateQuery {
    pub surname: String,
    pub first_name: String,
    /// Empty when the registrant has no middle name.
    pub middle_name: String,
    pub birthdate: NaiveDate,
}

impl DuplicateQuery {
    /// Validates raw form input. Surname, first name and a `YYYY-MM-DD` birthdate are required.
    pub fn from_form(
        surname: Option<&str>,
        first_name: Option<&str>,
        middle_name: Option<&str>,
        birthdate: Option<&str>,
    ) -> BloodBankResult<Self> {
        let mut errors = FieldErrors::new();
        let surname = errors.require("surname", surname);
        let first_name = errors.require("first_name", first_name);
        let birthdate = errors
            .require("birthdate", birthdate)
            .and_then(|raw| match parse_iso_date("birthdate", raw) {
                Ok(date) => Some(date),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                }
            });
        errors.finish()?;

        match (surname, first_name, birthdate) {
            (Some(surname), Some(first_name), Some(birthdate)) => Ok(Self {
                surname: surname.to_string(),
                first_name: first_name.to_string(),
                middle_name: middle_name.unwrap_or_default().trim().to_string(),
                birthdate,
            }),
            _ => Err(crate::BloodBankError::InvalidInput(
                "incomplete duplicate check".into(),
            )),
        }
    }

    /// Exact surname, first name and birthdate. Middle names match when both are empty or
    /// equal ignoring case.
    pub fn matches(&self, donor: &DonorRecord) -> bool {
        let exact = |a: &str, b: Option<&str>| b.map(str::trim) == Some(a);
        if !exact(&self.surname, donor.surname.as_deref())
            || !exact(&self.first_name, donor.first_name.as_deref())
            || donor.birthdate != Some(self.birthdate)
        {
            return false;
        }
        let theirs = donor.middle_name.as_deref().unwrap_or_default().trim();
        match (self.middle_name.is_empty(), theirs.is_empty()) {
            (true, true) => true,
            (false, false) => self.middle_name.to_lowercase() == theirs.to_lowercase(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Success,
    Warning,
    Danger,
    Info,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Success => "success",
            AlertType::Warning => "warning",
            AlertType::Danger => "danger",
            AlertType::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityAssessment {
    pub status_message: String,
    pub alert_type: AlertType,
    pub reason: String,
    pub suggestion: String,
    pub can_donate_today: bool,
}

impl EligibilityAssessment {
    fn new(status_message: &str, alert_type: AlertType, suggestion: String) -> Self {
        Self {
            status_message: status_message.to_string(),
            alert_type,
            reason: String::new(),
            suggestion,
            can_donate_today: false,
        }
    }

    fn with_reason(mut self, recorded: Option<&str>, fallback: &str) -> Self {
        self.reason = recorded
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(fallback)
            .to_string();
        self
    }

    fn donatable(mut self) -> Self {
        self.can_donate_today = true;
        self
    }
}

fn whole_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(86_400)
}

fn wait_text(days_since_donation: i64) -> (i64, i64) {
    let days_remaining = DONATION_INTERVAL_DAYS - days_since_donation;
    let weeks_remaining = (days_remaining + 6).div_euclid(7);
    (days_remaining, weeks_remaining)
}

/// Assessment for the latest eligibility record. `now` is injected for testability.
pub fn assess_eligibility(latest: &EligibilityRecord, now: DateTime<Utc>) -> EligibilityAssessment {
    let days_since_donation = latest
        .created_at
        .map(|at| whole_days(at, now))
        .unwrap_or(0);
    let reason = latest.disapproval_reason.as_deref();

    let Some(status) = latest.status.as_deref().map(|s| s.trim().to_ascii_lowercase()) else {
        return EligibilityAssessment::new(
            "Active donor",
            AlertType::Warning,
            "Please verify donor information before proceeding.".into(),
        );
    };

    match status.as_str() {
        "eligible" => EligibilityAssessment::new(
            "Ready to donate",
            AlertType::Success,
            "This donor is cleared and ready to donate today.".into(),
        )
        .donatable(),
        "ineligible" => {
            let base = EligibilityAssessment::new("Recently donated", AlertType::Warning, String::new())
                .with_reason(reason, "Recent donation within waiting period");
            if days_since_donation >= DONATION_INTERVAL_DAYS {
                EligibilityAssessment {
                    suggestion: "Waiting period completed. Donor may be eligible now.".into(),
                    ..base
                }
                .donatable()
            } else {
                let (days, weeks) = wait_text(days_since_donation);
                EligibilityAssessment {
                    suggestion: format!(
                        "Must wait {days} more day(s) ({weeks} week(s)) before next donation."
                    ),
                    ..base
                }
            }
        }
        "approved" => {
            if days_since_donation >= DONATION_INTERVAL_DAYS {
                EligibilityAssessment::new(
                    "Approved & ready",
                    AlertType::Success,
                    "Donor passed medical screening and is ready to donate.".into(),
                )
                .donatable()
            } else {
                let (days, weeks) = wait_text(days_since_donation);
                EligibilityAssessment::new(
                    "Approved but waiting",
                    AlertType::Warning,
                    format!("Wait {days} more day(s) ({weeks} week(s)) before next donation."),
                )
                .with_reason(None, "Passed medical exam but recently donated")
            }
        }
        "deferred" => {
            let suggestion = match latest.end_date {
                Some(end) if end <= now => {
                    "Deferral period ended. Contact medical staff for re-evaluation.".to_string()
                }
                Some(end) => {
                    let secs = (end - now).num_seconds();
                    let days = (secs + 86_399).div_euclid(86_400);
                    format!("Deferral ends in {days} day(s). Medical re-evaluation required.")
                }
                None => "Contact medical staff for deferral review.".to_string(),
            };
            EligibilityAssessment::new("Temporarily deferred", AlertType::Warning, suggestion)
                .with_reason(reason, "Medical deferral")
        }
        "refused" => EligibilityAssessment::new(
            "Donation refused",
            AlertType::Danger,
            "Contact medical director before proceeding.".into(),
        )
        .with_reason(reason, "Medical refusal"),
        _ => EligibilityAssessment::new(
            "Registered donor",
            AlertType::Info,
            "Review complete donor history before proceeding.".into(),
        )
        .with_reason(None, "Unknown status - requires review"),
    }
}

/// "3 days ago", "1 hour ago", "less than an hour ago"; "Previously registered" when the
/// registration time is unknown.
pub fn time_since(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "Previously registered".to_string();
    };
    let secs = (now - at).num_seconds();
    let days = secs.div_euclid(86_400);
    let hours = secs.div_euclid(3_600);
    let plural = |n: i64| if n > 1 { "s" } else { "" };
    if days > 0 {
        format!("{days} day{} ago", plural(days))
    } else if hours > 0 {
        format!("{hours} hour{} ago", plural(hours))
    } else {
        "less than an hour ago".to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub donor: DonorRecord,
    pub latest_eligibility: EligibilityRecord,
    pub time_description: String,
    pub assessment: EligibilityAssessment,
    /// Matching donors that have an eligibility record.
    pub total_matches: usize,
}

/// Latest eligibility record per donor; later rows win ties.
pub fn latest_eligibility_by_donor(
    records: &[EligibilityRecord],
) -> HashMap<&str, &EligibilityRecord> {
    let mut latest: HashMap<&str, &EligibilityRecord> = HashMap::new();
    for record in records {
        match latest.get(record.donor_id.as_str()) {
            Some(existing) if existing.created_at > record.created_at => {}
            _ => {
                latest.insert(record.donor_id.as_str(), record);
            }
        }
    }
    latest
}

/// First donor in `donors` order that matches `query` and has eligibility history.
pub fn find_duplicate(
    query: &DuplicateQuery,
    donors: &[DonorRecord],
    eligibility: &[EligibilityRecord],
    now: DateTime<Utc>,
) -> Option<DuplicateMatch> {
    let latest = latest_eligibility_by_donor(eligibility);
    let with_history: Vec<(&DonorRecord, &EligibilityRecord)> = donors
        .iter()
        .filter(|d| query.matches(d))
        .filter_map(|d| latest.get(d.donor_id.as_str()).map(|e| (d, *e)))
        .collect();

    let total_matches = with_history.len();
    let (donor, record) = with_history.into_iter().next()?;
    Some(DuplicateMatch {
        donor: donor.clone(),
        latest_eligibility: record.clone(),
        time_description: time_since(donor.submitted_at, now),
        assessment: assess_eligibility(record, now),
        total_matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BloodBankError;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn query(middle: &str) -> DuplicateQuery {
        DuplicateQuery::from_form(Some("Santos"), Some("Maria"), Some(middle), Some("1990-04-12"))
            .unwrap()
    }

    fn donor(id: &str, middle: Option<&str>) -> DonorRecord {
        DonorRecord {
            donor_id: id.into(),
            surname: Some("Santos".into()),
            first_name: Some("Maria".into()),
            middle_name: middle.map(String::from),
            birthdate: NaiveDate::from_ymd_opt(1990, 4, 12),
            submitted_at: Some(now() - Duration::days(3)),
            ..Default::default()
        }
    }

    fn eligibility(donor_id: &str, status: &str, days_ago: i64) -> EligibilityRecord {
        EligibilityRecord {
            donor_id: donor_id.into(),
            status: Some(status.into()),
            created_at: Some(now() - Duration::days(days_ago)),
            ..Default::default()
        }
    }

    #[test]
    fn form_requires_names_and_iso_birthdate() {
        let err = DuplicateQuery::from_form(None, Some(" "), None, Some("12/04/1990")).unwrap_err();
        match err {
            BloodBankError::Validation(messages) => {
                assert_eq!(messages.len(), 3);
                assert!(messages[2].contains("YYYY-MM-DD"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn middle_names_must_both_be_empty_or_equal() {
        assert!(query("").matches(&donor("1", None)));
        assert!(query("").matches(&donor("1", Some("  "))));
        assert!(query("cruz").matches(&donor("1", Some("Cruz"))));
        assert!(!query("Cruz").matches(&donor("1", None)));
        assert!(!query("").matches(&donor("1", Some("Cruz"))));
    }

    #[test]
    fn donors_without_eligibility_are_not_duplicates() {
        let donors = vec![donor("1", None), donor("2", None)];
        assert!(find_duplicate(&query(""), &donors, &[], now()).is_none());

        let found = find_duplicate(&query(""), &donors, &[eligibility("2", "eligible", 1)], now())
            .unwrap();
        assert_eq!(found.donor.donor_id, "2");
        assert_eq!(found.total_matches, 1);
        assert_eq!(found.time_description, "3 days ago");
        assert!(found.assessment.can_donate_today);
    }

    #[test]
    fn latest_eligibility_record_wins() {
        let records = vec![
            eligibility("1", "eligible", 100),
            eligibility("1", "refused", 2),
            eligibility("1", "approved", 50),
        ];
        let found = find_duplicate(&query(""), &[donor("1", None)], &records, now()).unwrap();
        assert_eq!(found.assessment.status_message, "Donation refused");
        assert_eq!(found.assessment.alert_type, AlertType::Danger);
        assert_eq!(found.assessment.reason, "Medical refusal");
    }

    #[test]
    fn recent_donation_reports_remaining_wait() {
        let a = assess_eligibility(&eligibility("1", "ineligible", 20), now());
        assert_eq!(a.status_message, "Recently donated");
        assert!(!a.can_donate_today);
        assert_eq!(a.suggestion, "Must wait 36 more day(s) (6 week(s)) before next donation.");

        let done = assess_eligibility(&eligibility("1", "Ineligible", 56), now());
        assert!(done.can_donate_today);
    }

    #[test]
    fn approved_waits_for_the_donation_interval() {
        let waiting = assess_eligibility(&eligibility("1", "approved", 55), now());
        assert_eq!(waiting.status_message, "Approved but waiting");
        assert_eq!(waiting.suggestion, "Wait 1 more day(s) (1 week(s)) before next donation.");

        let ready = assess_eligibility(&eligibility("1", "approved", 60), now());
        assert_eq!(ready.status_message, "Approved & ready");
        assert!(ready.can_donate_today);
    }

    #[test]
    fn deferral_suggestion_depends_on_end_date() {
        let mut record = eligibility("1", "deferred", 10);
        record.end_date = Some(now() + Duration::hours(30));
        let a = assess_eligibility(&record, now());
        assert_eq!(a.suggestion, "Deferral ends in 2 day(s). Medical re-evaluation required.");
        assert!(!a.can_donate_today);

        record.end_date = Some(now() - Duration::days(1));
        let ended = assess_eligibility(&record, now());
        assert!(ended.suggestion.starts_with("Deferral period ended"));
        assert!(!ended.can_donate_today);
    }

    #[test]
    fn unknown_status_is_informational() {
        let a = assess_eligibility(&eligibility("1", "pending", 1), now());
        assert_eq!(a.status_message, "Registered donor");
        assert_eq!(a.alert_type, AlertType::Info);
    }

    #[test]
    fn time_since_picks_the_largest_unit() {
        assert_eq!(time_since(Some(now() - Duration::days(1)), now()), "1 day ago");
        assert_eq!(time_since(Some(now() - Duration::hours(5)), now()), "5 hours ago");
        assert_eq!(time_since(Some(now() - Duration::minutes(20)), now()), "less than an hour ago");
        assert_eq!(time_since(None, now()), "Previously registered");
    }
}
