//! Hospital request reads.

use crate::constants::HOSPITAL_REQUEST_TABLE;
use crate::error::BloodBankResult;
use crate::hospital_requests::{prioritise_requests, PrioritisedRequest};
use crate::records::HospitalRequestRecord;
use bloodbank_store::{fetch_rows, Query, RecordStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct HospitalRequestService {
    store: Arc<dyn RecordStore>,
}

impl HospitalRequestService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Requests with priorities, most urgent first. `status` filters case-insensitively.
    pub async fn list(
        &self,
        status: Option<&str>,
        now: DateTime<Utc>,
    ) -> BloodBankResult<Vec<PrioritisedRequest>> {
        let query = Query::table(HOSPITAL_REQUEST_TABLE).order_desc("requested_on");
        let requests: Vec<HospitalRequestRecord> = fetch_rows(self.store.as_ref(), &query).await?;
        Ok(prioritise_requests(requests, status, now))
    }
}
