//! Donor pipeline stage reconciliation.
//!
//! A donor moves through four recorded steps: screening (interviewer), medical history
//! (reviewer), physical examination (physician) and blood collection (phlebotomist). Each step
//! lives in its own table and none of them stores "where the donor is now", so every listing
//! derives it by joining the five collections in memory.
//!
//! ## Stage precedence
//!
//! The furthest recorded step wins, whatever the earlier steps hold:
//!
//! ```text
//! blood collection    -> Phlebotomist
//! physical exam       -> Physician
//! medical history     -> Reviewer
//! screening           -> Interviewer
//! (nothing)           -> Staff
//! ```
//!
//! Blood collections reference donors only through `screening_id` (falling back to
//! `physical_exam_id`). Child records that cannot be traced to a donor are ignored. When a
//! donor has several records in one collection the most recently updated one is used.
//!
//! ## Status
//!
//! 1. collection succeeded -> `Completed`
//! 2. collection failed -> `Deferred` (donor reaction, else "Blood Collection Failed")
//! 3. physical exam remarks mention "Deferred"/"Refused", or a deferral flag is set -> `Deferred`
//! 4. medical history declined -> `Deferred` ("Medical History Declined")
//! 5. otherwise `Pending`
//!
//! A collection whose outcome is not recorded yet (neither `is_successful` nor a recognisable
//! `status`) falls through to the later rules.

use crate::records::{
    BloodCollectionRecord, DonorRecord, MedicalApproval, MedicalHistoryRecord,
    PhysicalExaminationRecord, ScreeningRecord,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Reason given when a collection failed without a recorded donor reaction.
pub const COLLECTION_FAILED_REASON: &str = "Blood Collection Failed";

/// Reason given when the reviewer declined the medical history.
pub const MEDICAL_DECLINED_REASON: &str = "Medical History Declined";

/// How far a donor has progressed, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Staff,
    Interviewer,
    Reviewer,
    Physician,
    Phlebotomist,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Staff,
        Stage::Interviewer,
        Stage::Reviewer,
        Stage::Physician,
        Stage::Phlebotomist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Staff => "Staff",
            Stage::Interviewer => "Interviewer",
            Stage::Reviewer => "Reviewer",
            Stage::Physician => "Physician",
            Stage::Phlebotomist => "Phlebotomist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageStatus {
    Pending,
    Completed,
    Deferred,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "Pending",
            StageStatus::Completed => "Completed",
            StageStatus::Deferred => "Deferred",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived per-donor row. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DonorStageView {
    pub donor_id: String,
    pub surname: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub age: Option<u32>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub blood_type: Option<String>,
    pub donation_type: Option<String>,
    pub current_stage: Stage,
    pub status: StageStatus,
    pub deferral_reason: Option<String>,
    /// Number of donor records sharing this donor's identity key.
    pub donation_count: usize,
    /// Queue ordering key: when the donor's current-stage record was last touched.
    pub sort_timestamp: Option<DateTime<Utc>>,
}

impl DonorStageView {
    pub fn full_name(&self) -> String {
        DonorRecord {
            donor_id: self.donor_id.clone(),
            surname: self.surname.clone(),
            first_name: self.first_name.clone(),
            middle_name: self.middle_name.clone(),
            ..Default::default()
        }
        .full_name()
    }
}

/// The five collections a reconciliation runs over.
#[derive(Debug, Clone, Default)]
pub struct RecordCollections {
    pub donors: Vec<DonorRecord>,
    pub screenings: Vec<ScreeningRecord>,
    pub medical_histories: Vec<MedicalHistoryRecord>,
    pub physical_exams: Vec<PhysicalExaminationRecord>,
    pub blood_collections: Vec<BloodCollectionRecord>,
}

fn touched_at(
    updated: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    updated.or(created)
}

/// Inserts `record` under `key` unless an entry touched strictly later is already there.
/// Later entries win ties, so the last row of equal age is kept.
fn keep_latest<'a, T>(
    map: &mut HashMap<&'a str, &'a T>,
    key: &'a str,
    record: &'a T,
    at: impl Fn(&T) -> Option<DateTime<Utc>>,
) {
    match map.get(key) {
        Some(existing) if at(*existing) > at(record) => {}
        _ => {
            map.insert(key, record);
        }
    }
}

/// Lookup tables over one set of collections.
pub struct StageReconciler<'a> {
    screening_by_donor: HashMap<&'a str, &'a ScreeningRecord>,
    medical_by_donor: HashMap<&'a str, &'a MedicalHistoryRecord>,
    physical_by_donor: HashMap<&'a str, &'a PhysicalExaminationRecord>,
    collection_by_donor: HashMap<&'a str, &'a BloodCollectionRecord>,
}

impl<'a> StageReconciler<'a> {
    pub fn new(records: &'a RecordCollections) -> Self {
        let screening_at = |s: &ScreeningRecord| touched_at(s.updated_at, s.created_at);
        let mut screening_by_donor = HashMap::new();
        let mut screening_by_id: HashMap<&str, &ScreeningRecord> = HashMap::new();
        for s in &records.screenings {
            screening_by_id.insert(s.screening_id.as_str(), s);
            if let Some(donor_id) = s.donor_id.as_deref() {
                keep_latest(&mut screening_by_donor, donor_id, s, screening_at);
            }
        }

        let mut medical_by_donor = HashMap::new();
        for m in &records.medical_histories {
            keep_latest(&mut medical_by_donor, m.donor_id.as_str(), m, |m| {
                touched_at(m.updated_at, m.created_at)
            });
        }

        let donor_of_screening = |screening_id: Option<&str>| -> Option<&'a str> {
            screening_by_id
                .get(screening_id?)
                .copied()
                .and_then(|s| s.donor_id.as_deref())
        };

        let mut physical_by_donor = HashMap::new();
        let mut physical_by_id: HashMap<&str, &PhysicalExaminationRecord> = HashMap::new();
        for p in &records.physical_exams {
            physical_by_id.insert(p.physical_exam_id.as_str(), p);
            let donor_id = p
                .donor_id
                .as_deref()
                .or_else(|| donor_of_screening(p.screening_id.as_deref()));
            if let Some(donor_id) = donor_id {
                keep_latest(&mut physical_by_donor, donor_id, p, |p| {
                    touched_at(p.updated_at, p.created_at)
                });
            }
        }

        let mut collection_by_donor = HashMap::new();
        for c in &records.blood_collections {
            let donor_id = donor_of_screening(c.screening_id.as_deref()).or_else(|| {
                let p = physical_by_id.get(c.physical_exam_id.as_deref()?).copied()?;
                p.donor_id
                    .as_deref()
                    .or_else(|| donor_of_screening(p.screening_id.as_deref()))
            });
            match donor_id {
                Some(donor_id) => keep_latest(&mut collection_by_donor, donor_id, c, |c| {
                    touched_at(c.updated_at, c.created_at)
                }),
                None => tracing::debug!(
                    blood_collection_id = %c.blood_collection_id,
                    "blood collection cannot be traced to a donor"
                ),
            }
        }

        Self {
            screening_by_donor,
            medical_by_donor,
            physical_by_donor,
            collection_by_donor,
        }
    }

    pub fn screening_for(&self, donor_id: &str) -> Option<&'a ScreeningRecord> {
        self.screening_by_donor.get(donor_id).copied()
    }

    pub fn medical_history_for(&self, donor_id: &str) -> Option<&'a MedicalHistoryRecord> {
        self.medical_by_donor.get(donor_id).copied()
    }

    pub fn physical_exam_for(&self, donor_id: &str) -> Option<&'a PhysicalExaminationRecord> {
        self.physical_by_donor.get(donor_id).copied()
    }

    pub fn blood_collection_for(&self, donor_id: &str) -> Option<&'a BloodCollectionRecord> {
        self.collection_by_donor.get(donor_id).copied()
    }

    /// Builds the stage view for one donor record (`donation_count` is 1).
    pub fn view(&self, donor: &DonorRecord) -> DonorStageView {
        let id = donor.donor_id.as_str();
        let screening = self.screening_for(id);
        let medical = self.medical_history_for(id);
        let physical = self.physical_exam_for(id);
        let collection = self.blood_collection_for(id);

        let current_stage = if collection.is_some() {
            Stage::Phlebotomist
        } else if physical.is_some() {
            Stage::Physician
        } else if medical.is_some() {
            Stage::Reviewer
        } else if screening.is_some() {
            Stage::Interviewer
        } else {
            Stage::Staff
        };

        let (status, deferral_reason) = derive_status(collection, physical, medical);

        DonorStageView {
            donor_id: donor.donor_id.clone(),
            surname: donor.surname.clone(),
            first_name: donor.first_name.clone(),
            middle_name: donor.middle_name.clone(),
            birthdate: donor.birthdate,
            age: donor.age,
            submitted_at: donor.submitted_at,
            blood_type: screening.and_then(|s| s.blood_type.clone()),
            donation_type: screening.and_then(|s| s.donation_type.clone()),
            current_stage,
            status,
            deferral_reason,
            donation_count: 1,
            sort_timestamp: donor
                .updated_at
                .or(donor.created_at)
                .or(donor.submitted_at),
        }
    }

    /// One view per donor record, in input order.
    pub fn stage_views(&self, donors: &[DonorRecord]) -> Vec<DonorStageView> {
        donors.iter().map(|d| self.view(d)).collect()
    }
}

/// One view per distinct donor identity, duplicates folded by [`dedupe_by_identity`].
pub fn reconcile(records: &RecordCollections) -> Vec<DonorStageView> {
    let reconciler = StageReconciler::new(records);
    dedupe_by_identity(reconciler.stage_views(&records.donors))
}

/// Outcome recorded on a blood collection, if any.
///
/// `is_successful` is authoritative; older rows only carry a `status` string.
pub fn collection_outcome(collection: &BloodCollectionRecord) -> Option<bool> {
    if let Some(ok) = collection.is_successful {
        return Some(ok);
    }
    let status = collection.status.as_deref()?.trim().to_ascii_lowercase();
    match status.as_str() {
        "successful" | "success" | "completed" | "collected" => Some(true),
        "failed" | "unsuccessful" | "incomplete" | "not successful" => Some(false),
        _ => None,
    }
}

/// Deferral reason recorded by the physician, if the exam defers or refuses the donor.
pub fn physical_exam_deferral(exam: &PhysicalExaminationRecord) -> Option<String> {
    if let Some(remarks) = exam.remarks.as_deref() {
        let lower = remarks.to_ascii_lowercase();
        if lower.contains("deferred") || lower.contains("refused") {
            return Some(remarks.trim().to_string());
        }
    }

    let flagged = [
        (exam.permanently_deferred, &exam.perm_deferral_reason, "Permanently Deferred"),
        (exam.temporarily_deferred, &exam.temp_deferral_reason, "Temporarily Deferred"),
        (exam.refuse, &exam.refuse_reason, "Refused"),
    ];
    flagged
        .into_iter()
        .find(|(flag, _, _)| *flag == Some(true))
        .map(|(_, reason, label)| {
            reason
                .clone()
                .or_else(|| exam.disapproval_reason.clone())
                .unwrap_or_else(|| label.to_string())
        })
}

fn derive_status(
    collection: Option<&BloodCollectionRecord>,
    physical: Option<&PhysicalExaminationRecord>,
    medical: Option<&MedicalHistoryRecord>,
) -> (StageStatus, Option<String>) {
    if let Some(c) = collection {
        match collection_outcome(c) {
            Some(true) => return (StageStatus::Completed, None),
            Some(false) => {
                let reason = c
                    .donor_reaction
                    .clone()
                    .unwrap_or_else(|| COLLECTION_FAILED_REASON.to_string());
                return (StageStatus::Deferred, Some(reason));
            }
            None => {}
        }
    }

    if let Some(reason) = physical.and_then(physical_exam_deferral) {
        return (StageStatus::Deferred, Some(reason));
    }

    if medical.is_some_and(|m| m.approval() == MedicalApproval::Declined) {
        return (
            StageStatus::Deferred,
            Some(MEDICAL_DECLINED_REASON.to_string()),
        );
    }

    (StageStatus::Pending, None)
}

fn normalise_name(part: Option<&str>) -> String {
    part.unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity key `surname|first_name|middle_name|birthdate`, compared case-insensitively with
/// whitespace collapsed. Donors with neither surname nor first name are keyed by id so
/// that nameless rows are never merged with each other.
pub fn identity_key(view: &DonorStageView) -> String {
    let surname = normalise_name(view.surname.as_deref());
    let first = normalise_name(view.first_name.as_deref());
    if surname.is_empty() && first.is_empty() {
        return format!("id:{}", view.donor_id);
    }
    let birthdate = view
        .birthdate
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    format!(
        "{}|{}|{}|{}",
        surname,
        first,
        normalise_name(view.middle_name.as_deref()),
        birthdate
    )
}

/// Folds views sharing an identity key into one.
///
/// Each group keeps the view with the latest submission time (first seen wins ties) and
/// counts its members in `donation_count`. Groups come out in order of first appearance.
pub fn dedupe_by_identity(views: Vec<DonorStageView>) -> Vec<DonorStageView> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, DonorStageView> = HashMap::new();

    for view in views {
        let key = identity_key(&view);
        match groups.get_mut(&key) {
            Some(kept) => {
                let count = kept.donation_count + view.donation_count;
                if view.submitted_at > kept.submitted_at {
                    *kept = view;
                }
                kept.donation_count = count;
            }
            None => {
                order.push(key.clone());
                groups.insert(key, view);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap())
    }

    fn donor(id: &str) -> DonorRecord {
        DonorRecord {
            donor_id: id.into(),
            surname: Some(format!("Surname{id}")),
            first_name: Some("Ana".into()),
            birthdate: NaiveDate::from_ymd_opt(1995, 1, 1),
            submitted_at: ts(1),
            ..Default::default()
        }
    }

    fn screening(id: &str, donor_id: &str) -> ScreeningRecord {
        ScreeningRecord {
            screening_id: id.into(),
            donor_id: Some(donor_id.into()),
            blood_type: Some("O+".into()),
            created_at: ts(2),
            ..Default::default()
        }
    }

    fn medical(donor_id: &str, approval: Option<&str>) -> MedicalHistoryRecord {
        MedicalHistoryRecord {
            donor_id: donor_id.into(),
            medical_approval: approval.map(String::from),
            created_at: ts(3),
            ..Default::default()
        }
    }

    fn physical(id: &str, donor_id: &str, remarks: &str) -> PhysicalExaminationRecord {
        PhysicalExaminationRecord {
            physical_exam_id: id.into(),
            donor_id: Some(donor_id.into()),
            remarks: Some(remarks.into()),
            created_at: ts(4),
            ..Default::default()
        }
    }

    fn collection(id: &str, screening_id: &str, ok: Option<bool>) -> BloodCollectionRecord {
        BloodCollectionRecord {
            blood_collection_id: id.into(),
            screening_id: Some(screening_id.into()),
            is_successful: ok,
            created_at: ts(5),
            ..Default::default()
        }
    }

    fn single_view(records: RecordCollections) -> DonorStageView {
        let views = reconcile(&records);
        assert_eq!(views.len(), 1);
        views.into_iter().next().unwrap()
    }

    #[test]
    fn donor_with_no_records_is_at_staff_pending() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Staff);
        assert_eq!(view.status, StageStatus::Pending);
        assert_eq!(view.sort_timestamp, ts(1));
    }

    #[test]
    fn screening_and_undecided_medical_history_is_reviewer_pending() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            screenings: vec![screening("s1", "1")],
            medical_histories: vec![medical("1", None)],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Reviewer);
        assert_eq!(view.status, StageStatus::Pending);
        assert_eq!(view.deferral_reason, None);
        assert_eq!(view.blood_type.as_deref(), Some("O+"));
    }

    #[test]
    fn all_records_with_successful_collection_is_phlebotomist_completed() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            screenings: vec![screening("s1", "1")],
            medical_histories: vec![medical("1", Some("Approved"))],
            physical_exams: vec![physical("p1", "1", "Accepted")],
            blood_collections: vec![collection("c1", "s1", Some(true))],
        });
        assert_eq!(view.current_stage, Stage::Phlebotomist);
        assert_eq!(view.status, StageStatus::Completed);
        assert_eq!(view.sort_timestamp, ts(1));
    }

    #[test]
    fn only_permanently_deferred_exam_is_physician_deferred() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            physical_exams: vec![physical("p1", "1", "Permanently Deferred")],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Physician);
        assert_eq!(view.status, StageStatus::Deferred);
        assert_eq!(view.deferral_reason.as_deref(), Some("Permanently Deferred"));
    }

    #[test]
    fn declined_medical_history_without_later_records_is_deferred() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            screenings: vec![screening("s1", "1")],
            medical_histories: vec![medical("1", Some("Declined"))],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Reviewer);
        assert_eq!(view.status, StageStatus::Deferred);
        assert_eq!(view.deferral_reason.as_deref(), Some(MEDICAL_DECLINED_REASON));
    }

    #[test]
    fn failed_collection_uses_donor_reaction_or_default_reason() {
        let mut failed = collection("c1", "s1", Some(false));
        let records = RecordCollections {
            donors: vec![donor("1")],
            screenings: vec![screening("s1", "1")],
            blood_collections: vec![failed.clone()],
            ..Default::default()
        };
        let view = single_view(records.clone());
        assert_eq!(view.status, StageStatus::Deferred);
        assert_eq!(view.deferral_reason.as_deref(), Some(COLLECTION_FAILED_REASON));

        failed.donor_reaction = Some("Fainted".into());
        let view = single_view(RecordCollections {
            blood_collections: vec![failed],
            ..records
        });
        assert_eq!(view.deferral_reason.as_deref(), Some("Fainted"));
    }

    #[test]
    fn collection_without_outcome_falls_through_to_earlier_rules() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            screenings: vec![screening("s1", "1")],
            medical_histories: vec![medical("1", Some("Declined"))],
            blood_collections: vec![collection("c1", "s1", None)],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Phlebotomist);
        assert_eq!(view.status, StageStatus::Deferred);
        assert_eq!(view.deferral_reason.as_deref(), Some(MEDICAL_DECLINED_REASON));
    }

    #[test]
    fn collection_status_string_is_used_when_flag_is_missing() {
        let mut c = collection("c1", "s1", None);
        c.status = Some("Successful".into());
        assert_eq!(collection_outcome(&c), Some(true));
        c.status = Some("Failed".into());
        assert_eq!(collection_outcome(&c), Some(false));
        c.status = Some("In progress".into());
        assert_eq!(collection_outcome(&c), None);
        c.is_successful = Some(true);
        assert_eq!(collection_outcome(&c), Some(true));
    }

    fn take_if<T: Clone>(keep: bool, rows: &[T]) -> Vec<T> {
        if keep {
            rows.to_vec()
        } else {
            Vec::new()
        }
    }

    #[test]
    fn adding_a_later_record_only_moves_the_stage_forward() {
        let mut records = RecordCollections {
            donors: vec![donor("1")],
            ..Default::default()
        };
        let mut previous = single_view(records.clone()).current_stage;

        records.screenings.push(screening("s1", "1"));
        records.medical_histories.push(medical("1", None));
        records.physical_exams.push(physical("p1", "1", "Accepted"));
        records.blood_collections.push(collection("c1", "s1", None));

        let expected = [
            Stage::Interviewer,
            Stage::Reviewer,
            Stage::Physician,
            Stage::Phlebotomist,
        ];
        for (step, stage) in expected.into_iter().enumerate() {
            let partial = RecordCollections {
                donors: records.donors.clone(),
                screenings: records.screenings.clone(),
                medical_histories: take_if(step >= 1, &records.medical_histories),
                physical_exams: take_if(step >= 2, &records.physical_exams),
                blood_collections: take_if(step >= 3, &records.blood_collections),
            };
            let current = single_view(partial).current_stage;
            assert_eq!(current, stage);
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn later_stage_record_wins_regardless_of_earlier_ones() {
        // Collection linked through the physical exam, no screening for the donor at all.
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            physical_exams: vec![physical("p1", "1", "Accepted")],
            blood_collections: vec![BloodCollectionRecord {
                blood_collection_id: "c1".into(),
                physical_exam_id: Some("p1".into()),
                is_successful: Some(true),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Phlebotomist);
        assert_eq!(view.status, StageStatus::Completed);
    }

    #[test]
    fn orphan_child_records_are_ignored() {
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            screenings: vec![screening("s9", "999")],
            medical_histories: vec![medical("999", Some("Declined"))],
            blood_collections: vec![collection("c1", "missing", Some(true))],
            ..Default::default()
        });
        assert_eq!(view.current_stage, Stage::Staff);
        assert_eq!(view.status, StageStatus::Pending);
    }

    #[test]
    fn latest_child_record_per_donor_is_used() {
        let mut old = physical("p1", "1", "Temporarily Deferred");
        old.created_at = ts(2);
        let newer = physical("p2", "1", "Accepted");
        let view = single_view(RecordCollections {
            donors: vec![donor("1")],
            physical_exams: vec![newer, old],
            ..Default::default()
        });
        assert_eq!(view.status, StageStatus::Pending);
    }

    #[test]
    fn exam_flags_defer_with_specific_reason() {
        let mut exam = physical("p1", "1", "Pending");
        exam.temporarily_deferred = Some(true);
        exam.temp_deferral_reason = Some("Low hemoglobin".into());
        assert_eq!(physical_exam_deferral(&exam).as_deref(), Some("Low hemoglobin"));

        exam.temp_deferral_reason = None;
        exam.disapproval_reason = Some("See notes".into());
        assert_eq!(physical_exam_deferral(&exam).as_deref(), Some("See notes"));

        exam.disapproval_reason = None;
        assert_eq!(physical_exam_deferral(&exam).as_deref(), Some("Temporarily Deferred"));

        let refused = physical("p2", "1", "refused - donor left");
        assert_eq!(
            physical_exam_deferral(&refused).as_deref(),
            Some("refused - donor left")
        );
    }

    #[test]
    fn duplicates_keep_latest_submission_and_count_group() {
        let mut first = donor("1");
        first.surname = Some("Cruz".into());
        let mut again = donor("2");
        again.surname = Some("  CRUZ ".into());
        again.submitted_at = ts(20);
        let mut other = donor("3");
        other.surname = Some("Lim".into());

        let views = reconcile(&RecordCollections {
            donors: vec![first, other, again],
            screenings: vec![screening("s2", "2")],
            ..Default::default()
        });

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].donor_id, "2");
        assert_eq!(views[0].donation_count, 2);
        assert_eq!(views[0].current_stage, Stage::Interviewer);
        assert_eq!(views[1].donor_id, "3");
        assert_eq!(views[1].donation_count, 1);
    }

    #[test]
    fn different_birthdates_are_not_merged() {
        let a = donor("1");
        let mut b = donor("2");
        b.surname = a.surname.clone();
        b.birthdate = NaiveDate::from_ymd_opt(1996, 1, 1);
        let views = reconcile(&RecordCollections {
            donors: vec![a, b],
            ..Default::default()
        });
        assert_eq!(views.len(), 2);
    }

    #[test]
    fn nameless_donors_are_never_merged() {
        let views = reconcile(&RecordCollections {
            donors: vec![
                DonorRecord {
                    donor_id: "1".into(),
                    ..Default::default()
                },
                DonorRecord {
                    donor_id: "2".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        assert_eq!(views.len(), 2);
    }

    #[test]
    fn queue_order_follows_donor_timestamps_not_stage_records() {
        let mut early = donor("A");
        early.updated_at = ts(1);
        let mut late = donor("B");
        late.updated_at = ts(5);
        let mut screened_later = screening("sA", "A");
        screened_later.created_at = ts(10);

        let mut views = reconcile(&RecordCollections {
            donors: vec![late, early],
            screenings: vec![screened_later],
            ..Default::default()
        });
        crate::pagination::sort_fifo_by(&mut views, |v| v.sort_timestamp);

        let ids: Vec<&str> = views.iter().map(|v| v.donor_id.as_str()).collect();
        assert_eq!(ids, ["A", "B"]);
        assert_eq!(views[0].current_stage, Stage::Interviewer);
    }

    #[test]
    fn sort_timestamp_falls_back_to_created_then_submitted() {
        let only = |d: DonorRecord| {
            single_view(RecordCollections {
                donors: vec![d],
                ..Default::default()
            })
        };
        let mut d = donor("1");
        d.created_at = ts(3);
        assert_eq!(only(d.clone()).sort_timestamp, ts(3));
        d.created_at = None;
        assert_eq!(only(d).sort_timestamp, ts(1));
    }

    #[test]
    fn stage_parses_case_insensitively() {
        assert_eq!("physician".parse::<Stage>().unwrap(), Stage::Physician);
        assert!("nurse".parse::<Stage>().is_err());
    }
}
