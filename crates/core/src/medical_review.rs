//! Reviewer dashboard: medical history decisions per donor.

use crate::pagination::sort_fifo_by;
use crate::reconcile::{RecordCollections, StageReconciler};
use crate::records::MedicalApproval;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewCategory {
    /// No decision recorded, or no medical history at all.
    Incoming,
    Approved,
    /// Any recorded decision other than approval.
    Declined,
}

impl ReviewCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewCategory::Incoming => "incoming",
            ReviewCategory::Approved => "approved",
            ReviewCategory::Declined => "declined",
        }
    }

    /// Parses a `?status=` value; anything unrecognised means no filter.
    pub fn parse_filter(value: Option<&str>) -> Option<Self> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("incoming") => Some(ReviewCategory::Incoming),
            Some("approved") => Some(ReviewCategory::Approved),
            Some("declined") => Some(ReviewCategory::Declined),
            _ => None,
        }
    }
}

impl From<&MedicalApproval> for ReviewCategory {
    fn from(approval: &MedicalApproval) -> Self {
        match approval {
            MedicalApproval::Undecided => ReviewCategory::Incoming,
            MedicalApproval::Approved => ReviewCategory::Approved,
            MedicalApproval::Declined | MedicalApproval::Other(_) => ReviewCategory::Declined,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedicalReviewRow {
    pub donor_id: String,
    pub full_name: String,
    pub medical_approval: Option<String>,
    pub category: ReviewCategory,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicalReviewCounts {
    pub incoming: usize,
    pub approved: usize,
    pub declined: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedicalReviewSummary {
    pub counts: MedicalReviewCounts,
    /// Rows matching the requested filter, oldest submission first.
    pub rows: Vec<MedicalReviewRow>,
}

/// Counts every distinct donor id once, then filters the rows.
pub fn medical_review_summary(
    records: &RecordCollections,
    filter: Option<ReviewCategory>,
) -> MedicalReviewSummary {
    let reconciler = StageReconciler::new(records);
    let mut seen = HashSet::new();
    let mut counts = MedicalReviewCounts::default();
    let mut rows = Vec::new();

    for donor in &records.donors {
        if !seen.insert(donor.donor_id.as_str()) {
            continue;
        }
        let medical = reconciler.medical_history_for(&donor.donor_id);
        let category = medical
            .map(|m| ReviewCategory::from(&m.approval()))
            .unwrap_or(ReviewCategory::Incoming);
        match category {
            ReviewCategory::Incoming => counts.incoming += 1,
            ReviewCategory::Approved => counts.approved += 1,
            ReviewCategory::Declined => counts.declined += 1,
        }
        if filter.is_none_or(|f| f == category) {
            rows.push(MedicalReviewRow {
                donor_id: donor.donor_id.clone(),
                full_name: donor.full_name(),
                medical_approval: medical.and_then(|m| m.medical_approval.clone()),
                category,
                submitted_at: donor.submitted_at.or(donor.created_at),
            });
        }
    }

    sort_fifo_by(&mut rows, |r| r.submitted_at);
    MedicalReviewSummary { counts, rows }
}
