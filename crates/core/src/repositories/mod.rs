//! Store-backed services.
//!
//! Each service holds an `Arc<dyn RecordStore>` and, where it needs paging or upload
//! settings, the shared `Arc<CoreConfig>`. Pure derivation lives in the sibling modules;
//! these services only fetch, delegate and write back.

pub mod donors;
mod helpers;
pub mod hospital_requests;
pub mod inventory;
pub mod users;
