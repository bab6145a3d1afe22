//! # Blood Bank Core
//!
//! Core business logic for the blood bank donor workflow.
//!
//! This crate contains the pure derivations and the store-backed services built on them:
//! - Donor stage reconciliation across the screening, medical history, physical examination
//!   and blood collection records ([`reconcile`])
//! - Work queue filtering, FIFO ordering and pagination ([`pagination`])
//! - Pending-donation labels, reviewer summaries, deferral and duplicate checks
//! - Inventory counts and hospital request prioritisation
//! - User accounts and password hashing
//!
//! **No API concerns**: sessions, HTTP servers and request/response shapes belong in
//! `api-shared` and `api-rest`.

pub mod config;
pub mod constants;
pub mod deferral;
pub mod eligibility;
mod error;
pub mod hospital_requests;
pub mod inventory;
pub mod medical_review;
pub mod pagination;
pub mod pipeline;
pub mod reconcile;
pub mod records;
pub mod repositories;
pub mod users;
pub mod validation;

pub use config::CoreConfig;
pub use error::{BloodBankError, BloodBankResult};
pub use pagination::{Page, PageRequest, WorkQueueFilter};
pub use reconcile::{DonorStageView, RecordCollections, Stage, StageStatus};
pub use repositories::donors::{DonorService, MedicalReviewPage, StageQueueParams};
pub use repositories::hospital_requests::HospitalRequestService;
pub use repositories::inventory::InventoryService;
pub use repositories::users::{AuthenticatedUser, UserService};

pub use bloodbank_store::{InMemoryStore, RecordStore, RetryPolicy, StoreError, SupabaseStore};
pub use bloodbank_types::{BloodType, EmailAddress, NonEmptyText, UserId};
