use crate::{Query, RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Record store held entirely in memory.
///
/// Answers queries with the same filter/order/window semantics as the remote store and
/// counts calls, which lets tests assert that a listing issues a fixed number of reads no
/// matter how many rows it covers. Tables can be marked as failing to exercise the
/// degrade-to-empty paths.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    select_calls: AtomicU64,
    write_calls: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows to `table`.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of the rows currently stored in `table`.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every subsequent call touching `table` fail.
    pub async fn fail_table(&self, table: &str) {
        self.failing.lock().await.insert(table.to_string());
    }

    pub fn select_calls(&self) -> u64 {
        self.select_calls.load(Ordering::Relaxed)
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    async fn check_available(&self, table: &str) -> StoreResult<()> {
        if self.failing.lock().await.contains(table) {
            return Err(StoreError::Unavailable(table.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>> {
        self.select_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available(query.table_name()).await?;

        let matching: Vec<Value> = self
            .tables
            .lock()
            .await
            .get(query.table_name())
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        Ok(query.shape(matching))
    }

    async fn insert(&self, table: &str, row: Value) -> StoreResult<Vec<Value>> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available(table).await?;

        let rows = match row {
            Value::Array(items) => items,
            other => vec![other],
        };
        if rows.iter().any(|r| !r.is_object()) {
            return Err(StoreError::Status {
                table: table.to_string(),
                status: 400,
                body: "insert payload must be an object or an array of objects".into(),
            });
        }

        self.seed(table, rows.clone()).await;
        Ok(rows)
    }

    async fn update(&self, query: &Query, patch: Value) -> StoreResult<Vec<Value>> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available(query.table_name()).await?;

        let Value::Object(patch) = patch else {
            return Err(StoreError::Status {
                table: query.table_name().to_string(),
                status: 400,
                body: "update payload must be an object".into(),
            });
        };

        let mut tables = self.tables.lock().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(query.table_name()) {
            for row in rows.iter_mut().filter(|r| query.matches(r)) {
                if let Value::Object(fields) = row {
                    for (k, v) in &patch {
                        fields.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn select_filters_orders_and_counts_calls() {
        let store = InMemoryStore::new();
        store
            .seed(
                "eligibility",
                vec![
                    json!({"donor_id": 1, "status": "eligible", "created_at": "2024-01-01"}),
                    json!({"donor_id": 1, "status": "ineligible", "created_at": "2024-03-01"}),
                    json!({"donor_id": 2, "status": "refused", "created_at": "2024-02-01"}),
                ],
            )
            .await;

        let latest = store
            .select(
                &Query::table("eligibility")
                    .eq("donor_id", 1)
                    .order_desc("created_at")
                    .limit(1),
            )
            .await
            .unwrap();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0]["status"], "ineligible");
        assert_eq!(store.select_calls(), 1);
    }

    #[tokio::test]
    async fn update_patches_only_matching_rows() {
        let store = InMemoryStore::new();
        store
            .seed(
                "users",
                vec![
                    json!({"user_id": "a", "is_active": true}),
                    json!({"user_id": "b", "is_active": true}),
                ],
            )
            .await;

        let updated = store
            .update(
                &Query::table("users").eq("user_id", "b"),
                json!({"is_active": false}),
            )
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        let rows = store.rows("users").await;
        assert_eq!(rows[0]["is_active"], true);
        assert_eq!(rows[1]["is_active"], false);
        assert_eq!(store.write_calls(), 1);
    }

    #[tokio::test]
    async fn insert_rejects_scalar_payloads() {
        let store = InMemoryStore::new();
        assert!(store.insert("users", json!([1, 2])).await.is_err());
        assert!(store.rows("users").await.is_empty());
    }

    #[tokio::test]
    async fn failing_table_reports_unavailable() {
        let store = InMemoryStore::new();
        store.fail_table("users").await;
        let err = store.select(&Query::table("users")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(t) if t == "users"));
    }
}
