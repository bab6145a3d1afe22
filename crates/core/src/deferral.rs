//! Deferral check for a single donor, driven by the latest physical examination.

use crate::records::PhysicalExaminationRecord;
use chrono::{DateTime, Utc};

/// Reason reported when only the remarks mark the donor as deferred or refused.
pub const REMARKS_REASON: &str = "Based on physician remarks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferralType {
    Permanent,
    Temporary,
}

impl DeferralType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeferralType::Permanent => "permanently_deferred",
            DeferralType::Temporary => "temporarily_deferred",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeferralStatus {
    pub is_deferred: bool,
    pub is_refused: bool,
    pub deferral_type: Option<DeferralType>,
    pub reason: Option<String>,
    pub exam_date: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    /// False when the donor has no physical examination on record.
    pub has_exam: bool,
}

/// Most recently created exam; later rows win ties.
pub fn latest_exam(exams: &[PhysicalExaminationRecord]) -> Option<&PhysicalExaminationRecord> {
    exams.iter().fold(None, |best, exam| match best {
        Some(b) if b.created_at > exam.created_at => Some(b),
        _ => Some(exam),
    })
}

/// Flags are checked permanent, temporary, refused; remarks are consulted only when no flag
/// is set.
pub fn deferral_status(exams: &[PhysicalExaminationRecord]) -> DeferralStatus {
    let Some(exam) = latest_exam(exams) else {
        return DeferralStatus::default();
    };

    let mut status = DeferralStatus {
        exam_date: exam.created_at,
        remarks: exam.remarks.clone(),
        has_exam: true,
        ..Default::default()
    };

    if exam.permanently_deferred == Some(true) {
        status.is_deferred = true;
        status.deferral_type = Some(DeferralType::Permanent);
        status.reason = exam.perm_deferral_reason.clone();
    } else if exam.temporarily_deferred == Some(true) {
        status.is_deferred = true;
        status.deferral_type = Some(DeferralType::Temporary);
        status.reason = exam.temp_deferral_reason.clone();
    } else if exam.refuse == Some(true) {
        status.is_refused = true;
        status.reason = exam.refuse_reason.clone();
    } else {
        match exam.remarks.as_deref().map(str::trim) {
            Some("Permanently Deferred") => {
                status.is_deferred = true;
                status.deferral_type = Some(DeferralType::Permanent);
            }
            Some("Temporarily Deferred") => {
                status.is_deferred = true;
                status.deferral_type = Some(DeferralType::Temporary);
            }
            Some("Refused") => status.is_refused = true,
            _ => return status,
        }
        status.reason = Some(REMARKS_REASON.to_string());
    }

    status
}
