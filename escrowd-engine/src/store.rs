//! In-memory escrow storage
//!
//! A single read/write lock guards the whole map, so at most one
//! read-modify-write runs at a time system-wide. Coarse, but it makes the
//! check-append-transition sequence race-free without per-record locking;
//! a production deployment would swap this type for a database or
//! per-record versioning behind the same surface.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::EscrowRecord;
use crate::EscrowResult;

/// Process-lifetime keyed storage for escrow records
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, EscrowRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new record under its identifier.
    ///
    /// Identifiers are generated at creation and never reused; an
    /// already-present id is rejected rather than overwritten.
    pub async fn insert(&self, record: EscrowRecord) -> EscrowResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(EscrowError::internal(format!(
                "escrow {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record);
        Ok(())
    }

    /// Fetch a snapshot of a record.
    pub async fn get(&self, id: Uuid) -> EscrowResult<EscrowRecord> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EscrowError::NotFound(id))
    }

    /// Apply a mutation under the write lock.
    ///
    /// The closure runs against a working copy; the copy replaces the
    /// stored record only when it returns `Ok`, so a guard violation
    /// leaves the record exactly as it was.
    pub async fn update<T, F>(&self, id: Uuid, apply: F) -> EscrowResult<T>
    where
        F: FnOnce(&mut EscrowRecord) -> EscrowResult<T>,
    {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(EscrowError::NotFound(id))?;

        let mut draft = record.clone();
        let outcome = apply(&mut draft)?;
        *record = draft;

        Ok(outcome)
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bip70::PaymentRequest;
    use chrono::Utc;

    fn record() -> EscrowRecord {
        EscrowRecord::new(
            "buyer-key".to_string(),
            "seller-key".to_string(),
            "escrow-key".to_string(),
            "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
            100_000,
            Some("store test".to_string()),
            PaymentRequest {
                payment_details_version: 1,
                pki_type: "none".to_string(),
                pki_data: Vec::new(),
                serialized_details: Vec::new(),
                signature: Vec::new(),
                address: "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
                amount: 100_000,
                expires_time: Utc::now(),
                merchant_id: None,
                request_id: "req-test".to_string(),
                callback_url: None,
            },
            Utc::now() + chrono::Duration::hours(24),
        )
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let store = MemoryStore::new();
        let record = record();
        let id = record.id;

        store.insert(record).await.unwrap();
        let fetched = store.get(id).await.unwrap();

        assert_eq!(fetched.id, id);
        assert_eq!(fetched.amount_sats, 100_000);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let record = record();

        store.insert(record.clone()).await.unwrap();
        let err = store.insert(record).await.unwrap_err();
        assert!(matches!(err, EscrowError::Internal(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn failed_update_leaves_record_unchanged() {
        let store = MemoryStore::new();
        let record = record();
        let id = record.id;
        store.insert(record).await.unwrap();

        // Mutate the draft, then fail: nothing may stick.
        let err = store
            .update::<(), _>(id, |record| {
                record.amount_sats = 1;
                record.payment_txid = Some("tx-partial".to_string());
                Err(EscrowError::validation("boom"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Validation(_)));

        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.amount_sats, 100_000);
        assert!(fetched.payment_txid.is_none());
    }

    #[tokio::test]
    async fn successful_update_commits() {
        let store = MemoryStore::new();
        let record = record();
        let id = record.id;
        store.insert(record).await.unwrap();

        let txid = store
            .update(id, |record| {
                record.record_payment(
                    "26dd4663518b3e24872fd5635fd889a8a0e1c232b8d488868ac378a0a2d28fb1",
                )?;
                Ok(record.payment_txid.clone())
            })
            .await
            .unwrap();

        assert!(txid.is_some());
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.payment_txid, txid);
    }
}
