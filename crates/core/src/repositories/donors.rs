//! Donor workflow queries.
//!
//! Every listing pages through the donor table, batches the child-record reads, and derives
//! stages in memory. Nothing here writes stage information back to the store.
//!
//! Failed listing reads degrade: no donors gives an empty page, and a missing child table
//! reads as "no records yet", which at worst shows a donor at an earlier stage.

use super::helpers::{load_stage_collections, page_request};
use crate::config::CoreConfig;
use crate::constants::{
    DONOR_BATCH_SIZE, DONOR_MAX_BATCHES, DONOR_TABLE, ELIGIBILITY_TABLE, MEDICAL_HISTORY_TABLE,
    PHYSICAL_EXAM_TABLE,
};
use crate::deferral::{deferral_status, DeferralStatus};
use crate::eligibility::{find_duplicate, DuplicateMatch, DuplicateQuery};
use crate::error::{BloodBankError, BloodBankResult};
use crate::medical_review::{
    medical_review_summary, MedicalReviewCounts, MedicalReviewRow, ReviewCategory,
};
use crate::pagination::{paginate, work_queue, Page, WorkQueueFilter};
use crate::pipeline::{pending_donations, PendingDonation};
use crate::reconcile::{reconcile, DonorStageView, StageReconciler};
use crate::records::{DonorRecord, EligibilityRecord, MedicalApproval, PhysicalExaminationRecord};
use crate::validation::validate_record_id;
use bloodbank_store::{fetch_batched, fetch_in_chunks, fetch_rows, Query, RecordStore};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

/// Query options for the donor work queue.
#[derive(Debug, Clone, Default)]
pub struct StageQueueParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Medical review counts plus one page of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicalReviewPage {
    pub counts: MedicalReviewCounts,
    pub rows: Page<MedicalReviewRow>,
}

/// Service for donor workflow listings and checks.
#[derive(Clone)]
pub struct DonorService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn RecordStore>,
}

impl DonorService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self { cfg, store }
    }

    /// Every donor row, read in [`DONOR_BATCH_SIZE`] windows.
    ///
    /// Listings degrade to an empty page when the donor table cannot be read.
    async fn all_donors(&self) -> Vec<DonorRecord> {
        let query = Query::table(DONOR_TABLE)
            .order_asc("submitted_at")
            .order_asc("donor_id");
        match fetch_batched(
            self.store.as_ref(),
            &query,
            DONOR_BATCH_SIZE,
            DONOR_MAX_BATCHES,
        )
        .await
        {
            Ok(donors) => donors,
            Err(e) => {
                tracing::warn!("donor read failed, listing no donors: {}", e);
                Vec::new()
            }
        }
    }

    async fn donor(&self, donor_id: &str) -> BloodBankResult<DonorRecord> {
        let query = Query::table(DONOR_TABLE).eq("donor_id", donor_id).limit(1);
        fetch_rows::<DonorRecord>(self.store.as_ref(), &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BloodBankError::NotFound(format!("donor {donor_id}")))
    }

    /// Reconciled, de-duplicated donor work queue.
    ///
    /// # Arguments
    ///
    /// * `params` - status filter, search term and paging
    /// * `now` - reference time for the `today` filter
    ///
    /// Store read failures are logged and leave the page empty rather than failing.
    pub async fn stage_queue(
        &self,
        params: StageQueueParams,
        now: DateTime<Utc>,
    ) -> BloodBankResult<Page<DonorStageView>> {
        let donors = self.all_donors().await;
        let records = load_stage_collections(self.store.as_ref(), donors).await;
        let views = reconcile(&records);

        let filter = WorkQueueFilter::parse(params.status.as_deref());
        let request = page_request(&self.cfg, params.page, params.per_page);
        Ok(work_queue(
            views,
            filter,
            params.search.as_deref(),
            now.date_naive(),
            request,
        ))
    }

    /// Current stage of a single donor record (no duplicate folding).
    ///
    /// # Errors
    ///
    /// - [`BloodBankError::InvalidInput`] for a malformed id
    /// - [`BloodBankError::NotFound`] when no donor has this id
    pub async fn stage_for(&self, donor_id: &str) -> BloodBankResult<DonorStageView> {
        let donor_id = validate_record_id("donor_id", donor_id)?;
        let donor = self.donor(&donor_id).await?;
        let records = load_stage_collections(self.store.as_ref(), vec![donor]).await;
        let reconciler = StageReconciler::new(&records);
        records
            .donors
            .first()
            .map(|d| reconciler.view(d))
            .ok_or_else(|| BloodBankError::NotFound(format!("donor {donor_id}")))
    }

    /// Pending-donation listing with pipeline labels, oldest first.
    pub async fn pending_donations(
        &self,
        page: Option<usize>,
        per_page: Option<usize>,
    ) -> BloodBankResult<Page<PendingDonation>> {
        let donors = self.all_donors().await;
        let donor_ids: Vec<String> = donors.iter().map(|d| d.donor_id.clone()).collect();
        let eligibility_q = Query::table(ELIGIBILITY_TABLE);
        let (records, eligibility) = tokio::join!(
            load_stage_collections(self.store.as_ref(), donors),
            fetch_in_chunks::<EligibilityRecord>(
                self.store.as_ref(),
                &eligibility_q,
                "donor_id",
                &donor_ids,
            ),
        );
        let rows = pending_donations(&records, &eligibility);
        Ok(paginate(rows, page_request(&self.cfg, page, per_page)))
    }

    /// Reviewer counts and one page of rows for the `incoming | approved | declined` filter.
    pub async fn medical_review_summary(
        &self,
        status: Option<&str>,
        page: Option<usize>,
        per_page: Option<usize>,
    ) -> BloodBankResult<MedicalReviewPage> {
        let donors = self.all_donors().await;
        let donor_ids: Vec<String> = donors.iter().map(|d| d.donor_id.clone()).collect();
        let medical_histories = fetch_in_chunks(
            self.store.as_ref(),
            &Query::table(MEDICAL_HISTORY_TABLE),
            "donor_id",
            &donor_ids,
        )
        .await;
        let records = crate::reconcile::RecordCollections {
            donors,
            medical_histories,
            ..Default::default()
        };

        let summary = medical_review_summary(&records, ReviewCategory::parse_filter(status));
        Ok(MedicalReviewPage {
            counts: summary.counts,
            rows: paginate(summary.rows, page_request(&self.cfg, page, per_page)),
        })
    }

    /// Deferral state from the donor's latest physical examination.
    pub async fn check_deferral(&self, donor_id: &str) -> BloodBankResult<DeferralStatus> {
        let donor_id = validate_record_id("donor_id", donor_id)?;
        let query = Query::table(PHYSICAL_EXAM_TABLE)
            .eq("donor_id", &donor_id)
            .order_desc("created_at")
            .limit(1);
        let exams: Vec<PhysicalExaminationRecord> = fetch_rows(self.store.as_ref(), &query).await?;
        Ok(deferral_status(&exams))
    }

    /// Looks for an earlier registration of the same person with donation history.
    ///
    /// Candidates are read newest registration first, so the most recent match is reported.
    pub async fn check_duplicate(
        &self,
        query: &DuplicateQuery,
        now: DateTime<Utc>,
    ) -> BloodBankResult<Option<DuplicateMatch>> {
        let donor_query = Query::table(DONOR_TABLE)
            .eq("surname", &query.surname)
            .eq("first_name", &query.first_name)
            .eq("birthdate", query.birthdate.format("%Y-%m-%d"))
            .order_desc("submitted_at");
        let candidates: Vec<DonorRecord> = fetch_rows(self.store.as_ref(), &donor_query).await?;
        let candidates: Vec<DonorRecord> =
            candidates.into_iter().filter(|d| query.matches(d)).collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let ids: Vec<String> = candidates.iter().map(|d| d.donor_id.clone()).collect();
        let eligibility: Vec<EligibilityRecord> = fetch_in_chunks(
            self.store.as_ref(),
            &Query::table(ELIGIBILITY_TABLE),
            "donor_id",
            &ids,
        )
        .await;
        Ok(find_duplicate(query, &candidates, &eligibility, now))
    }

    /// Records the reviewer's decision on a donor's medical history.
    ///
    /// Only `Approved` and `Declined` (any case) are accepted; the stored text is canonical.
    ///
    /// # Errors
    ///
    /// - [`BloodBankError::InvalidInput`] for a malformed id or unknown decision
    /// - [`BloodBankError::NotFound`] when the donor has no medical history
    pub async fn update_medical_approval(
        &self,
        donor_id: &str,
        decision: &str,
        now: DateTime<Utc>,
    ) -> BloodBankResult<()> {
        let donor_id = validate_record_id("donor_id", donor_id)?;
        let approval = match MedicalApproval::from_text(Some(decision)) {
            MedicalApproval::Approved => "Approved",
            MedicalApproval::Declined => "Declined",
            _ => {
                return Err(BloodBankError::InvalidInput(format!(
                    "medical approval must be Approved or Declined, got {decision:?}"
                )))
            }
        };

        let query = Query::table(MEDICAL_HISTORY_TABLE).eq("donor_id", &donor_id);
        let patch = json!({
            "medical_approval": approval,
            "updated_at": now.to_rfc3339(),
        });
        let updated = self.store.update(&query, patch).await?;
        if updated.is_empty() {
            return Err(BloodBankError::NotFound(format!(
                "medical history for donor {donor_id}"
            )));
        }
        tracing::info!(donor_id = %donor_id, approval, "medical approval updated");
        Ok(())
    }
}
