//! JSON request and response bodies shared by the REST server and the CLI.
//!
//! Every response carries `success`; failures use [`ApiMessage`]. Missing text fields are
//! rendered as `"N/A"` so clients never have to special-case nulls for display columns.

use bloodbank_core::constants::NOT_AVAILABLE;
use bloodbank_core::deferral::DeferralStatus;
use bloodbank_core::eligibility::DuplicateMatch;
use bloodbank_core::hospital_requests::PrioritisedRequest;
use bloodbank_core::inventory::{InventorySnapshot, InventoryUnit};
use bloodbank_core::medical_review::{MedicalReviewCounts, MedicalReviewRow};
use bloodbank_core::pipeline::PendingDonation;
use bloodbank_core::users::NewUserForm;
use bloodbank_core::{AuthenticatedUser, DonorStageView, Page};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn or_na(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

fn timestamp_or_na(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |t| t.to_rfc3339())
}

fn date_or_na(value: Option<NaiveDate>) -> String {
    value.map_or_else(
        || NOT_AVAILABLE.to_string(),
        |d| d.format("%Y-%m-%d").to_string(),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Plain outcome body, used for errors and for writes with nothing else to report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
    /// Every field problem in a rejected form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ApiMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn invalid_form(errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: "Please correct the highlighted fields".into(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub page: usize,
    pub per_page: usize,
    pub total_records: usize,
    pub total_pages: usize,
}

impl<T> From<&Page<T>> for PageMeta {
    fn from(page: &Page<T>) -> Self {
        Self {
            page: page.page,
            per_page: page.per_page,
            total_records: page.total_records,
            total_pages: page.total_pages,
        }
    }
}

// Sessions

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub staff_role: Option<String>,
}

impl From<&AuthenticatedUser> for SessionUser {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role.as_str().to_string(),
            staff_role: user.staff_role.map(|r| r.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRes {
    pub success: bool,
    /// Bearer token for the `Authorization` header.
    pub token: String,
    pub expires_at: String,
    pub user: SessionUser,
}

// Donor work queue

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonorStageDto {
    pub donor_id: String,
    pub full_name: String,
    pub birthdate: String,
    pub age: Option<u32>,
    pub submitted_at: String,
    pub blood_type: String,
    pub donation_type: String,
    pub current_stage: String,
    pub status: String,
    pub deferral_reason: Option<String>,
    pub donation_count: usize,
}

impl From<&DonorStageView> for DonorStageDto {
    fn from(view: &DonorStageView) -> Self {
        Self {
            donor_id: view.donor_id.clone(),
            full_name: view.full_name(),
            birthdate: date_or_na(view.birthdate),
            age: view.age,
            submitted_at: timestamp_or_na(view.submitted_at),
            blood_type: or_na(view.blood_type.as_deref()),
            donation_type: or_na(view.donation_type.as_deref()),
            current_stage: view.current_stage.as_str().to_string(),
            status: view.status.as_str().to_string(),
            deferral_reason: view.deferral_reason.clone(),
            donation_count: view.donation_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonorStagePageRes {
    pub success: bool,
    pub donors: Vec<DonorStageDto>,
    pub pagination: PageMeta,
}

impl From<&Page<DonorStageView>> for DonorStagePageRes {
    fn from(page: &Page<DonorStageView>) -> Self {
        Self {
            success: true,
            donors: page.items.iter().map(DonorStageDto::from).collect(),
            pagination: PageMeta::from(page),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonorStageRes {
    pub success: bool,
    pub donor: DonorStageDto,
}

// Pending donations

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingDonationDto {
    pub donor_id: String,
    pub surname: String,
    pub first_name: String,
    pub donor_type: String,
    pub donor_number: String,
    pub birthdate: String,
    pub sex: String,
    pub submitted_at: String,
    pub status: String,
}

impl From<&PendingDonation> for PendingDonationDto {
    fn from(row: &PendingDonation) -> Self {
        Self {
            donor_id: row.donor_id.clone(),
            surname: or_na(row.surname.as_deref()),
            first_name: or_na(row.first_name.as_deref()),
            donor_type: row.donor_type.as_str().to_string(),
            donor_number: row.donor_number.clone(),
            birthdate: date_or_na(row.birthdate),
            sex: or_na(row.sex.as_deref()),
            submitted_at: timestamp_or_na(row.submitted_at),
            status: row.label.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingDonationsRes {
    pub success: bool,
    pub donations: Vec<PendingDonationDto>,
    pub pagination: PageMeta,
}

impl From<&Page<PendingDonation>> for PendingDonationsRes {
    fn from(page: &Page<PendingDonation>) -> Self {
        Self {
            success: true,
            donations: page.items.iter().map(PendingDonationDto::from).collect(),
            pagination: PageMeta::from(page),
        }
    }
}

// Medical history review

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MedicalReviewCountsDto {
    pub incoming: usize,
    pub approved: usize,
    pub declined: usize,
}

impl From<&MedicalReviewCounts> for MedicalReviewCountsDto {
    fn from(counts: &MedicalReviewCounts) -> Self {
        Self {
            incoming: counts.incoming,
            approved: counts.approved,
            declined: counts.declined,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MedicalReviewRowDto {
    pub donor_id: String,
    pub full_name: String,
    pub medical_approval: String,
    pub category: String,
    pub submitted_at: String,
}

impl From<&MedicalReviewRow> for MedicalReviewRowDto {
    fn from(row: &MedicalReviewRow) -> Self {
        Self {
            donor_id: row.donor_id.clone(),
            full_name: row.full_name.clone(),
            medical_approval: or_na(row.medical_approval.as_deref()),
            category: row.category.as_str().to_string(),
            submitted_at: timestamp_or_na(row.submitted_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MedicalReviewSummaryRes {
    pub success: bool,
    pub counts: MedicalReviewCountsDto,
    pub rows: Vec<MedicalReviewRowDto>,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MedicalApprovalReq {
    /// `Approved` or `Declined`.
    pub medical_approval: String,
}

// Deferral

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeferralRes {
    pub success: bool,
    pub is_deferred: bool,
    pub is_refused: bool,
    pub deferral_type: Option<String>,
    pub reason: Option<String>,
    pub exam_date: Option<String>,
    pub remarks: Option<String>,
    pub has_exam: bool,
}

impl From<&DeferralStatus> for DeferralRes {
    fn from(status: &DeferralStatus) -> Self {
        Self {
            success: true,
            is_deferred: status.is_deferred,
            is_refused: status.is_refused,
            deferral_type: status.deferral_type.map(|t| t.as_str().to_string()),
            reason: status.reason.clone(),
            exam_date: status.exam_date.map(|t| t.to_rfc3339()),
            remarks: status.remarks.clone(),
            has_exam: status.has_exam,
        }
    }
}

// Duplicate donor check

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DuplicateCheckReq {
    pub surname: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    /// `YYYY-MM-DD`.
    pub birthdate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DuplicateDonorDto {
    pub donor_id: String,
    pub full_name: String,
    pub birthdate: String,
    pub donor_number: String,
    pub eligibility_status: String,
    pub blood_type: String,
    pub donation_type: String,
    pub last_donation: String,
    pub time_description: String,
    pub status_message: String,
    pub alert_type: String,
    pub reason: String,
    pub suggestion: String,
    pub can_donate_today: bool,
    pub total_matches: usize,
}

impl From<&DuplicateMatch> for DuplicateDonorDto {
    fn from(found: &DuplicateMatch) -> Self {
        let latest = &found.latest_eligibility;
        Self {
            donor_id: found.donor.donor_id.clone(),
            full_name: found.donor.full_name(),
            birthdate: date_or_na(found.donor.birthdate),
            donor_number: found
                .donor
                .prc_donor_number
                .clone()
                .unwrap_or_else(|| found.donor.donor_id.clone()),
            eligibility_status: or_na(latest.status.as_deref()),
            blood_type: or_na(latest.blood_type.as_deref()),
            donation_type: or_na(latest.donation_type.as_deref()),
            last_donation: timestamp_or_na(latest.start_date.or(latest.created_at)),
            time_description: found.time_description.clone(),
            status_message: found.assessment.status_message.clone(),
            alert_type: found.assessment.alert_type.as_str().to_string(),
            reason: found.assessment.reason.clone(),
            suggestion: found.assessment.suggestion.clone(),
            can_donate_today: found.assessment.can_donate_today,
            total_matches: found.total_matches,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DuplicateCheckRes {
    pub success: bool,
    pub duplicate_found: bool,
    pub donor: Option<DuplicateDonorDto>,
}

impl From<Option<&DuplicateMatch>> for DuplicateCheckRes {
    fn from(found: Option<&DuplicateMatch>) -> Self {
        Self {
            success: true,
            duplicate_found: found.is_some(),
            donor: found.map(DuplicateDonorDto::from),
        }
    }
}

// Inventory

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryUnitDto {
    pub unit_id: String,
    pub unit_serial_number: String,
    pub blood_type: String,
    pub bag_type: String,
    pub status: String,
    pub donor_name: String,
    pub collected_at: String,
    pub expires_at: String,
}

impl From<&InventoryUnit> for InventoryUnitDto {
    fn from(item: &InventoryUnit) -> Self {
        Self {
            unit_id: item.unit.unit_id.clone(),
            unit_serial_number: or_na(item.unit.unit_serial_number.as_deref()),
            blood_type: item
                .blood_type
                .map_or_else(|| NOT_AVAILABLE.to_string(), |t| t.to_string()),
            bag_type: or_na(item.unit.bag_type.as_deref()),
            status: item.status.as_str().to_string(),
            donor_name: item.donor_name.clone(),
            collected_at: timestamp_or_na(item.unit.collected_at),
            expires_at: timestamp_or_na(item.unit.expires_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BloodTypeCount {
    pub blood_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryRes {
    pub success: bool,
    pub in_stock: usize,
    pub donors_received: usize,
    pub by_blood_type: Vec<BloodTypeCount>,
    pub active: Vec<InventoryUnitDto>,
    pub buffer: Vec<InventoryUnitDto>,
}

impl From<&InventorySnapshot> for InventoryRes {
    fn from(snapshot: &InventorySnapshot) -> Self {
        Self {
            success: true,
            in_stock: snapshot.in_stock,
            donors_received: snapshot.donors_received,
            by_blood_type: snapshot
                .by_blood_type
                .iter()
                .map(|(blood_type, count)| BloodTypeCount {
                    blood_type: blood_type.to_string(),
                    count: *count,
                })
                .collect(),
            active: snapshot.active.iter().map(InventoryUnitDto::from).collect(),
            buffer: snapshot.buffer.iter().map(InventoryUnitDto::from).collect(),
        }
    }
}

// Hospital requests

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HospitalRequestDto {
    pub request_id: String,
    pub request_reference: String,
    pub hospital: String,
    pub patient_name: String,
    pub blood_type: String,
    pub units_requested: Option<u32>,
    pub status: String,
    pub is_asap: bool,
    pub when_needed: String,
    pub requested_on: String,
    pub priority_level: u8,
    pub is_urgent: bool,
    pub is_critical: bool,
    pub is_one_day_before: bool,
    pub time_remaining: String,
}

impl From<&PrioritisedRequest> for HospitalRequestDto {
    fn from(item: &PrioritisedRequest) -> Self {
        let request = &item.request;
        let blood_type = match (
            request.patient_blood_type.as_deref(),
            request.rh_factor.as_deref(),
        ) {
            (Some(abo), Some(rh)) if !rh.trim().is_empty() => {
                format!("{}{}", abo.trim(), rh.trim())
            }
            (abo, _) => or_na(abo),
        };
        Self {
            request_id: request.request_id.clone(),
            request_reference: or_na(request.request_reference.as_deref()),
            hospital: or_na(request.hospital_admitted.as_deref()),
            patient_name: or_na(request.patient_name.as_deref()),
            blood_type,
            units_requested: request.units_requested,
            status: or_na(request.status.as_deref()),
            is_asap: request.is_asap.unwrap_or(false),
            when_needed: timestamp_or_na(request.when_needed),
            requested_on: timestamp_or_na(request.requested_on),
            priority_level: item.priority.level,
            is_urgent: item.priority.is_urgent,
            is_critical: item.priority.is_critical,
            is_one_day_before: item.priority.is_one_day_before,
            time_remaining: item.priority.time_remaining.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HospitalRequestsRes {
    pub success: bool,
    pub requests: Vec<HospitalRequestDto>,
}

// User management

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateUserReq {
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub middle_name: Option<String>,
    pub suffix: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// 1 admin, 2 hospital, 3 staff.
    pub role_id: Option<u32>,
    /// Required for staff: interviewer, reviewer, physician or phlebotomist.
    pub subrole: Option<String>,
}

impl From<CreateUserReq> for NewUserForm {
    fn from(req: CreateUserReq) -> Self {
        Self {
            first_name: req.first_name,
            surname: req.surname,
            middle_name: req.middle_name,
            suffix: req.suffix,
            email: req.email,
            password: req.password,
            role_id: req.role_id,
            subrole: req.subrole,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRes {
    pub success: bool,
    pub message: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserStatusReq {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhotoUploadReq {
    /// Standard base64 of a JPEG, PNG or WEBP image.
    pub image_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhotoUploadRes {
    pub success: bool,
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}
