//! Blood unit inventory reads.

use crate::constants::{BLOOD_UNIT_TABLE, DONOR_TABLE, INVENTORY_BATCH_SIZE, INVENTORY_MAX_BATCHES};
use crate::error::BloodBankResult;
use crate::inventory::{inventory_snapshot, InventorySnapshot};
use crate::records::{BloodUnitRecord, DonorRecord};
use bloodbank_store::{fetch_batched, fetch_in_chunks, Query, RecordStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn RecordStore>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Pages through serial-numbered units, newest first, in batches of
    /// [`INVENTORY_BATCH_SIZE`], stopping after [`INVENTORY_MAX_BATCHES`].
    pub async fn blood_units(&self) -> BloodBankResult<Vec<BloodUnitRecord>> {
        let query = Query::table(BLOOD_UNIT_TABLE)
            .not_null("unit_serial_number")
            .order_desc("created_at")
            .order_asc("unit_id");
        Ok(fetch_batched(
            self.store.as_ref(),
            &query,
            INVENTORY_BATCH_SIZE,
            INVENTORY_MAX_BATCHES,
        )
        .await?)
    }

    /// Inventory counts with donor names joined through one batched lookup.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> BloodBankResult<InventorySnapshot> {
        let units = self.blood_units().await?;
        let donor_ids: Vec<String> = units.iter().filter_map(|u| u.donor_id.clone()).collect();
        let donors: Vec<DonorRecord> = fetch_in_chunks(
            self.store.as_ref(),
            &Query::table(DONOR_TABLE),
            "donor_id",
            &donor_ids,
        )
        .await;
        Ok(inventory_snapshot(units, &donors, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodbank_store::InMemoryStore;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn service(store: Arc<InMemoryStore>) -> InventoryService {
        InventoryService::new(store)
    }

    #[tokio::test]
    async fn pages_until_a_short_batch() {
        let store = Arc::new(InMemoryStore::new());
        let mut rows: Vec<Value> = (0..2500)
            .map(|i| json!({"unit_id": i, "unit_serial_number": format!("SN{i}"), "donor_id": i % 3, "blood_type": "A+"}))
            .collect();
        rows.push(json!({"unit_id": 9999, "unit_serial_number": null}));
        store.seed(BLOOD_UNIT_TABLE, rows).await;

        let units = service(store.clone()).blood_units().await.unwrap();
        assert_eq!(units.len(), 2500);
        assert_eq!(store.select_calls(), 3);
    }

    #[tokio::test]
    async fn snapshot_joins_donor_names() {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed(
                BLOOD_UNIT_TABLE,
                vec![
                    json!({"unit_id": 1, "unit_serial_number": "A", "donor_id": 5, "blood_type": "O+", "expires_at": "2030-01-01T00:00:00Z"}),
                    json!({"unit_id": 2, "unit_serial_number": "B", "donor_id": 5, "blood_type": "O+", "status": "Buffer"}),
                ],
            )
            .await;
        store
            .seed(DONOR_TABLE, vec![json!({"donor_id": 5, "surname": "Go", "first_name": "Ben"})])
            .await;

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = service(store).snapshot(now).await.unwrap();
        assert_eq!(snapshot.in_stock, 1);
        assert_eq!(snapshot.buffer.len(), 1);
        assert_eq!(snapshot.donors_received, 1);
        assert_eq!(snapshot.active[0].donor_name, "Go, Ben");
    }
}
