//! Shared loading helpers for the store-backed services.
//!
//! Child records are fetched with one batched `in.()` query per collection, never one query
//! per donor, so the number of store calls stays constant as the donor list grows (up to
//! the chunk size).

use crate::config::CoreConfig;
use crate::constants::{
    BLOOD_COLLECTION_TABLE, MAX_PAGE_SIZE, MEDICAL_HISTORY_TABLE, PHYSICAL_EXAM_TABLE,
    SCREENING_TABLE,
};
use crate::pagination::PageRequest;
use crate::reconcile::RecordCollections;
use crate::records::{
    BloodCollectionRecord, DonorRecord, MedicalHistoryRecord, PhysicalExaminationRecord,
    ScreeningRecord,
};
use bloodbank_store::{fetch_in_chunks, Query, RecordStore};
use std::num::NonZeroUsize;

/// Fetches every child record belonging to `donors` and bundles them for reconciliation.
///
/// Screenings, medical histories and physical exams are fetched concurrently. Blood
/// collections need the screening ids, so they follow. Failed child reads degrade to
/// empty collections.
pub(crate) async fn load_stage_collections(
    store: &dyn RecordStore,
    donors: Vec<DonorRecord>,
) -> RecordCollections {
    let donor_ids: Vec<String> = donors.iter().map(|d| d.donor_id.clone()).collect();

    let screening_q = Query::table(SCREENING_TABLE);
    let medical_q = Query::table(MEDICAL_HISTORY_TABLE);
    let physical_q = Query::table(PHYSICAL_EXAM_TABLE);
    let (screenings, medical_histories, physical_exams) = tokio::join!(
        fetch_in_chunks::<ScreeningRecord>(store, &screening_q, "donor_form_id", &donor_ids),
        fetch_in_chunks::<MedicalHistoryRecord>(store, &medical_q, "donor_id", &donor_ids),
        fetch_in_chunks::<PhysicalExaminationRecord>(store, &physical_q, "donor_id", &donor_ids),
    );

    let screening_ids: Vec<String> = screenings.iter().map(|s| s.screening_id.clone()).collect();
    let blood_collections = fetch_in_chunks::<BloodCollectionRecord>(
        store,
        &Query::table(BLOOD_COLLECTION_TABLE),
        "screening_id",
        &screening_ids,
    )
    .await;

    tracing::debug!(
        donors = donors.len(),
        screenings = screenings.len(),
        medical_histories = medical_histories.len(),
        physical_exams = physical_exams.len(),
        blood_collections = blood_collections.len(),
        "loaded stage collections"
    );

    RecordCollections {
        donors,
        screenings,
        medical_histories,
        physical_exams,
        blood_collections,
    }
}

/// Page request using the configured page size unless the caller asks for another
/// (capped at [`MAX_PAGE_SIZE`]).
pub(crate) fn page_request(
    cfg: &CoreConfig,
    page: Option<usize>,
    per_page: Option<usize>,
) -> PageRequest {
    let per_page = per_page
        .map(|n| n.min(MAX_PAGE_SIZE))
        .and_then(NonZeroUsize::new)
        .unwrap_or_else(|| cfg.page_size());
    PageRequest::new(page, per_page)
}
