//! Constants used throughout the blood bank core crate.
//!
//! Table names mirror the remote store's schema so that every query names its table
//! through one place.

/// Donor intake form submissions.
pub const DONOR_TABLE: &str = "donor_form";

/// Interviewer screening records. Linked to donors through `donor_form_id`.
pub const SCREENING_TABLE: &str = "screening_form";

/// Reviewer medical history records.
pub const MEDICAL_HISTORY_TABLE: &str = "medical_history";

/// Physician examination records.
pub const PHYSICAL_EXAM_TABLE: &str = "physical_examination";

/// Phlebotomist collection records. Linked to donors only through `screening_id`.
pub const BLOOD_COLLECTION_TABLE: &str = "blood_collection";

/// Donation eligibility outcomes, one per completed or stopped donation.
pub const ELIGIBILITY_TABLE: &str = "eligibility";

/// Collected blood units.
pub const BLOOD_UNIT_TABLE: &str = "blood_bank_units";

/// Hospital blood requests.
pub const HOSPITAL_REQUEST_TABLE: &str = "blood_requests";

/// System user accounts.
pub const USER_TABLE: &str = "users";

/// Staff sub-role assignments.
pub const USER_ROLE_TABLE: &str = "user_roles";

/// Default number of rows per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Minimum days between whole-blood donations.
pub const DONATION_INTERVAL_DAYS: i64 = 56;

/// Rows requested per call when paging through blood units.
pub const INVENTORY_BATCH_SIZE: usize = 1000;

/// Rows requested per call when reading the donor table; matches PostgREST's default `max_rows`.
pub const DONOR_BATCH_SIZE: usize = 1000;

/// Upper bound on donor page requests for one listing.
pub const DONOR_MAX_BATCHES: usize = 50;

/// Upper bound on blood-unit page requests for one snapshot.
pub const INVENTORY_MAX_BATCHES: usize = 10;

/// Default PBKDF2 iteration count for new password hashes.
pub const PASSWORD_HASH_ITERATIONS: u32 = 100_000;

/// Default lifetime of a login session.
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 480;

/// Default remote store request timeout.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Default upload directory, relative to the working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Text shown for absent optional fields.
pub const NOT_AVAILABLE: &str = "N/A";
