//! Pending-donation labels.
//!
//! The pending listing does not use the reconciled stage. It walks the `needs_review` flags
//! step by step and reports the first step still waiting on staff.

use crate::pagination::sort_fifo_by;
use crate::reconcile::{RecordCollections, StageReconciler};
use crate::records::{DonorRecord, EligibilityRecord};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineLabel {
    /// Medical history flagged for review; treated as a fresh entry.
    New,
    Screening,
    PhysicalExamination,
    Collection,
    Completed,
}

impl PipelineLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineLabel::New => "Pending (New)",
            PipelineLabel::Screening => "Pending (Screening)",
            PipelineLabel::PhysicalExamination => "Pending (Physical Examination)",
            PipelineLabel::Collection => "Pending (Collection)",
            PipelineLabel::Completed => "Completed",
        }
    }
}

impl fmt::Display for PipelineLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonorType {
    New,
    Returning,
}

impl DonorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonorType::New => "New",
            DonorType::Returning => "Returning",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingDonation {
    pub donor_id: String,
    pub surname: Option<String>,
    pub first_name: Option<String>,
    pub donor_type: DonorType,
    /// PRC donor number, falling back to the donor id.
    pub donor_number: String,
    pub birthdate: Option<NaiveDate>,
    pub sex: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub label: PipelineLabel,
}

/// Label for one donor.
///
/// A screening without a `needs_review` flag counts as done. Physical exams and collections
/// must be explicitly cleared (`needs_review = false`).
pub fn pipeline_label(reconciler: &StageReconciler<'_>, donor_id: &str) -> PipelineLabel {
    if reconciler
        .medical_history_for(donor_id)
        .is_some_and(|m| m.needs_review == Some(true))
    {
        return PipelineLabel::New;
    }

    match reconciler.screening_for(donor_id) {
        None => return PipelineLabel::Screening,
        Some(s) if s.needs_review == Some(true) => return PipelineLabel::Screening,
        Some(_) => {}
    }

    match reconciler.physical_exam_for(donor_id) {
        Some(p) if p.needs_review == Some(false) => {}
        _ => return PipelineLabel::PhysicalExamination,
    }

    match reconciler.blood_collection_for(donor_id) {
        Some(c) if c.needs_review == Some(false) => PipelineLabel::Completed,
        _ => PipelineLabel::Collection,
    }
}

/// Labels every donor and sorts oldest submission first (then `created_at`; undated last).
pub fn pending_donations(
    records: &RecordCollections,
    eligibility: &[EligibilityRecord],
) -> Vec<PendingDonation> {
    let reconciler = StageReconciler::new(records);
    let returning: HashSet<&str> = eligibility.iter().map(|e| e.donor_id.as_str()).collect();

    let mut rows: Vec<(Option<DateTime<Utc>>, PendingDonation)> = records
        .donors
        .iter()
        .map(|donor| (queue_time(donor), pending_row(&reconciler, &returning, donor)))
        .collect();
    sort_fifo_by(&mut rows, |(at, _)| *at);
    rows.into_iter().map(|(_, row)| row).collect()
}

fn queue_time(donor: &DonorRecord) -> Option<DateTime<Utc>> {
    donor.submitted_at.or(donor.created_at)
}

fn pending_row(
    reconciler: &StageReconciler<'_>,
    returning: &HashSet<&str>,
    donor: &DonorRecord,
) -> PendingDonation {
    let donor_type = if returning.contains(donor.donor_id.as_str()) {
        DonorType::Returning
    } else {
        DonorType::New
    };
    PendingDonation {
        donor_id: donor.donor_id.clone(),
        surname: donor.surname.clone(),
        first_name: donor.first_name.clone(),
        donor_type,
        donor_number: donor
            .prc_donor_number
            .clone()
            .unwrap_or_else(|| donor.donor_id.clone()),
        birthdate: donor.birthdate,
        sex: donor.sex.clone(),
        submitted_at: queue_time(donor),
        label: pipeline_label(reconciler, &donor.donor_id),
    }
}
