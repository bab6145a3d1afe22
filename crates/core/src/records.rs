//! Row types for the remote store's tables.
//!
//! Rows written by several generations of forms disagree on types: ids arrive as numbers or
//! strings, booleans as `true`, `"true"` or `1`, and timestamps with or without an offset.
//! Every field is therefore decoded leniently. An absent, null or unparseable optional
//! field becomes `None` instead of failing the row; only the primary id is required.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Required id: a non-empty string or a number.
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(_) | Value::Number(_) => value_text(value)
            .ok_or_else(|| serde::de::Error::custom("id cannot be empty")),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

pub(crate) fn de_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(value_text))
}

pub(crate) fn de_opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|i| i != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Some(true),
            "false" | "f" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub(crate) fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn de_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64(deserializer)?
        .filter(|f| f.is_finite() && *f >= 0.0 && *f <= f64::from(u32::MAX))
        .map(|f| f as u32))
}

/// Parses the timestamp shapes found in the store.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` (taken as UTC) and bare dates
/// (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // PostgREST renders timestamptz as "+00:00" but some rows carry "+00".
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn de_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(value_text)
        .and_then(|s| parse_timestamp(&s)))
}

pub(crate) fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(value_text)
        .and_then(|s| parse_timestamp(&s))
        .map(|dt| dt.date_naive()))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DonorRecord {
    #[serde(deserialize_with = "de_id")]
    pub donor_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub surname: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub middle_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub birthdate: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub sex: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub prc_donor_number: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DonorRecord {
    /// "Surname, First Middle", skipping missing parts.
    pub fn full_name(&self) -> String {
        let given: Vec<&str> = [self.first_name.as_deref(), self.middle_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        match (self.surname.as_deref(), given.is_empty()) {
            (Some(surname), false) => format!("{}, {}", surname, given.join(" ")),
            (Some(surname), true) => surname.to_string(),
            (None, false) => given.join(" "),
            (None, true) => crate::constants::NOT_AVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScreeningRecord {
    #[serde(deserialize_with = "de_id")]
    pub screening_id: String,
    #[serde(default, alias = "donor_form_id", deserialize_with = "de_opt_text")]
    pub donor_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub blood_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub donation_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub body_weight: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub needs_review: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub disapproval_reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reviewer decision on a medical history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MedicalApproval {
    /// No decision recorded yet.
    Undecided,
    Approved,
    Declined,
    /// Any other recorded decision text.
    Other(String),
}

impl MedicalApproval {
    pub fn from_text(text: Option<&str>) -> Self {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return MedicalApproval::Undecided;
        };
        match text.to_ascii_lowercase().as_str() {
            "approved" => MedicalApproval::Approved,
            "declined" | "not approved" | "disapproved" => MedicalApproval::Declined,
            _ => MedicalApproval::Other(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MedicalHistoryRecord {
    #[serde(default, deserialize_with = "de_opt_text")]
    pub medical_history_id: Option<String>,
    #[serde(deserialize_with = "de_id")]
    pub donor_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub medical_approval: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub needs_review: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MedicalHistoryRecord {
    pub fn approval(&self) -> MedicalApproval {
        MedicalApproval::from_text(self.medical_approval.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PhysicalExaminationRecord {
    #[serde(deserialize_with = "de_id")]
    pub physical_exam_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub donor_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub screening_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub remarks: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub disapproval_reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub temporarily_deferred: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub permanently_deferred: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub refuse: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub temp_deferral_reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub perm_deferral_reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub refuse_reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub needs_review: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BloodCollectionRecord {
    #[serde(deserialize_with = "de_id")]
    pub blood_collection_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub screening_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub physical_exam_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub is_successful: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub donor_reaction: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub needs_review: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub unit_serial_number: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EligibilityRecord {
    #[serde(default, deserialize_with = "de_opt_text")]
    pub eligibility_id: Option<String>,
    #[serde(deserialize_with = "de_id")]
    pub donor_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub disapproval_reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub blood_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub donation_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BloodUnitRecord {
    #[serde(deserialize_with = "de_id")]
    pub unit_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub unit_serial_number: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub donor_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub blood_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub bag_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub hospital_request_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub handed_over_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HospitalRequestRecord {
    #[serde(deserialize_with = "de_id")]
    pub request_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub request_reference: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub hospital_admitted: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub patient_blood_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub rh_factor: Option<String>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub units_requested: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub is_asap: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub when_needed: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub requested_on: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub password_hash: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub surname: Option<String>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub role_id: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub user_image: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserRoleRecord {
    #[serde(deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub user_staff_roles: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn donor_accepts_numeric_ids_and_missing_fields() {
        let donor: DonorRecord = serde_json::from_value(json!({
            "donor_id": 17,
            "surname": "Reyes",
            "middle_name": "",
            "birthdate": "1990-04-12",
            "age": "34",
            "submitted_at": "2024-05-01T08:15:00+00:00"
        }))
        .unwrap();

        assert_eq!(donor.donor_id, "17");
        assert_eq!(donor.first_name, None);
        assert_eq!(donor.middle_name, None);
        assert_eq!(donor.birthdate, NaiveDate::from_ymd_opt(1990, 4, 12));
        assert_eq!(donor.age, Some(34));
        assert_eq!(
            donor.submitted_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 15, 0).unwrap())
        );
    }

    #[test]
    fn donor_without_id_is_rejected() {
        assert!(serde_json::from_value::<DonorRecord>(json!({"surname": "X"})).is_err());
        assert!(serde_json::from_value::<DonorRecord>(json!({"donor_id": " "})).is_err());
    }

    #[test]
    fn screening_reads_donor_form_id_alias() {
        let s: ScreeningRecord = serde_json::from_value(json!({
            "screening_id": "s-1",
            "donor_form_id": 9,
            "body_weight": "55.5",
            "needs_review": "true"
        }))
        .unwrap();
        assert_eq!(s.donor_id.as_deref(), Some("9"));
        assert_eq!(s.body_weight, Some(55.5));
        assert_eq!(s.needs_review, Some(true));
    }

    #[test]
    fn unparseable_optionals_become_none() {
        let c: BloodCollectionRecord = serde_json::from_value(json!({
            "blood_collection_id": 1,
            "is_successful": "maybe",
            "created_at": "yesterday"
        }))
        .unwrap();
        assert_eq!(c.is_successful, None);
        assert_eq!(c.created_at, None);
    }

    #[test]
    fn parse_timestamp_accepts_store_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T03:04:05.000+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T03:04:05.123456"), Some(expected + chrono::Duration::microseconds(123456)));
        assert_eq!(
            parse_timestamp("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("02/01/2024"), None);
    }

    #[test]
    fn medical_approval_classification() {
        assert_eq!(MedicalApproval::from_text(None), MedicalApproval::Undecided);
        assert_eq!(MedicalApproval::from_text(Some("  ")), MedicalApproval::Undecided);
        assert_eq!(MedicalApproval::from_text(Some("Approved")), MedicalApproval::Approved);
        assert_eq!(MedicalApproval::from_text(Some("declined")), MedicalApproval::Declined);
        assert_eq!(
            MedicalApproval::from_text(Some("For follow-up")),
            MedicalApproval::Other("For follow-up".into())
        );
    }

    #[test]
    fn full_name_formats_surname_first() {
        let donor = DonorRecord {
            donor_id: "1".into(),
            surname: Some("Santos".into()),
            first_name: Some("Maria".into()),
            middle_name: Some("Luna".into()),
            ..Default::default()
        };
        assert_eq!(donor.full_name(), "Santos, Maria Luna");

        let nameless = DonorRecord {
            donor_id: "2".into(),
            ..Default::default()
        };
        assert_eq!(nameless.full_name(), "N/A");
    }
}
