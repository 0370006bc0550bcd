//! Escrow service - coordinates the escrow lifecycle
//!
//! Validates inbound requests, drives the status state machine through the
//! store's atomic updates, and consumes the settlement broker for
//! everything chain-shaped. One logical call per inbound request; no
//! retries, no background work.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::bip70;
use crate::broker::SettlementBroker;
use crate::error::EscrowError;
use crate::models::{
    EscrowRecord, EscrowStatus, Party, PartySignature, SettlementKind, SIGNATURE_THRESHOLD,
};
use crate::store::MemoryStore;
use crate::EscrowResult;

/// Configuration for the escrow service
#[derive(Debug, Clone)]
pub struct EscrowServiceConfig {
    /// Expiry applied when a request does not provide one, in hours
    pub default_expiry_hours: i64,
    /// Flat fee subtracted from settlement transactions, in satoshis
    pub settlement_fee_sats: i64,
    /// Base URL advertised in BIP70 payment and callback URLs
    pub public_base_url: String,
}

impl Default for EscrowServiceConfig {
    fn default() -> Self {
        Self {
            default_expiry_hours: 24,
            settlement_fee_sats: 1_000,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Request to open a new escrow
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEscrowRequest {
    pub buyer_pubkey: String,
    pub seller_pubkey: String,
    pub escrow_pubkey: String,
    pub amount_sats: i64,
    pub description: Option<String>,
    pub expiry_hours: Option<i64>,
}

/// Request to verify the funding payment for an escrow
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub escrow_id: Uuid,
    pub txid: String,
}

/// One party's signature toward releasing or refunding an escrow
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureRequest {
    pub escrow_id: Uuid,
    pub party: Party,
    pub signature: String,
    pub public_key: String,
    /// Consumed by the mocked settlement synthesis, never verified
    pub private_key: String,
}

/// Result of a signature submission
#[derive(Debug, Clone, Serialize)]
pub struct SignatureReceipt {
    pub escrow_id: Uuid,
    pub status: EscrowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    pub signatures_count: usize,
    pub signatures_needed: usize,
    pub signatures: Vec<PartySignature>,
}

/// Main coordinator for escrow operations
pub struct EscrowService {
    config: EscrowServiceConfig,
    store: MemoryStore,
    broker: Arc<dyn SettlementBroker>,
}

impl EscrowService {
    pub fn new(config: EscrowServiceConfig, broker: Arc<dyn SettlementBroker>) -> Self {
        Self {
            config,
            store: MemoryStore::new(),
            broker,
        }
    }

    /// Open a new escrow between three parties.
    pub async fn create_escrow(
        &self,
        request: CreateEscrowRequest,
    ) -> EscrowResult<EscrowRecord> {
        if request.buyer_pubkey.trim().is_empty()
            || request.seller_pubkey.trim().is_empty()
            || request.escrow_pubkey.trim().is_empty()
        {
            return Err(EscrowError::validation(
                "Buyer, seller, and escrow public keys are required",
            ));
        }
        if request.amount_sats <= 0 {
            return Err(EscrowError::validation("Amount must be positive"));
        }

        let multisig_address = self.broker.derive_multisig_address(
            &request.buyer_pubkey,
            &request.seller_pubkey,
            &request.escrow_pubkey,
        )?;

        let payment_request = bip70::build_payment_request(
            &multisig_address,
            request.amount_sats,
            &self.config.public_base_url,
        )?;

        let expiry_hours = request
            .expiry_hours
            .filter(|hours| *hours > 0)
            .unwrap_or(self.config.default_expiry_hours);
        let expires_at = Utc::now() + Duration::hours(expiry_hours);

        let record = EscrowRecord::new(
            request.buyer_pubkey,
            request.seller_pubkey,
            request.escrow_pubkey,
            multisig_address,
            request.amount_sats,
            request.description,
            payment_request,
            expires_at,
        );

        self.store.insert(record.clone()).await?;
        info!("Created escrow {} at {}", record.id, record.multisig_address);

        Ok(record)
    }

    /// Verify the funding payment for an escrow against the chain.
    ///
    /// Idempotent-safe: a second call on a funded record yields
    /// `AlreadyFunded` and does not change the stored payment txid.
    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> EscrowResult<EscrowRecord> {
        if request.txid.trim().is_empty() {
            return Err(EscrowError::validation("Transaction ID is required"));
        }

        // Fail fast on unknown escrows and settled records before asking
        // the chain; the status guard runs again under the lock.
        let current = self.store.get(request.escrow_id).await?;
        if current.status == EscrowStatus::Funded {
            return Err(EscrowError::AlreadyFunded {
                txid: current.payment_txid.unwrap_or_default(),
            });
        }

        let settled = self.broker.verify_payment(&request.txid).await?;
        if !settled {
            return Err(EscrowError::validation(
                "Transaction could not be verified - it may be invalid or have insufficient confirmations",
            ));
        }

        let record = self
            .store
            .update(request.escrow_id, |record| {
                record.record_payment(&request.txid)?;
                Ok(record.clone())
            })
            .await?;

        info!(
            "Payment verified for escrow {} with txid {}",
            record.id, request.txid
        );

        Ok(record)
    }

    /// Submit a signature toward releasing funds to the seller.
    pub async fn submit_release_signature(
        &self,
        request: SignatureRequest,
    ) -> EscrowResult<SignatureReceipt> {
        self.submit_signature(SettlementKind::Release, request).await
    }

    /// Submit a signature toward refunding funds to the buyer.
    pub async fn submit_refund_signature(
        &self,
        request: SignatureRequest,
    ) -> EscrowResult<SignatureReceipt> {
        self.submit_signature(SettlementKind::Refund, request).await
    }

    async fn submit_signature(
        &self,
        kind: SettlementKind,
        request: SignatureRequest,
    ) -> EscrowResult<SignatureReceipt> {
        if request.signature.trim().is_empty()
            || request.public_key.trim().is_empty()
            || request.private_key.trim().is_empty()
        {
            return Err(EscrowError::validation(
                "Signature, public key, and private key are required",
            ));
        }

        // No cryptographic verification happens here; the party field is
        // the uniqueness key for the sequence.
        let signature = PartySignature {
            party: request.party,
            signature: request.signature,
            public_key: request.public_key,
            timestamp: Utc::now(),
        };
        let party = signature.party;

        let fee = self.config.settlement_fee_sats;
        let broker = Arc::clone(&self.broker);
        let private_key = request.private_key;

        // Append, check the threshold, and settle in one atomic update so
        // two submissions racing on the same record cannot both observe
        // the pending status.
        let record = self
            .store
            .update(request.escrow_id, move |record| {
                let progress = record.add_signature(kind, signature)?;
                if progress.threshold_reached {
                    let transaction = broker.synthesize_settlement(
                        &record.multisig_address,
                        record.settlement_recipient(kind),
                        record.amount_sats - fee,
                        &private_key,
                    )?;
                    record.finalize_settlement(kind, transaction.txid);
                }
                Ok(record.clone())
            })
            .await?;

        match record.settlement_txid(kind) {
            Some(txid) => info!(
                "Settled escrow {} via {} with txid {}",
                record.id, kind, txid
            ),
            None => info!(
                "Added {} signature for escrow {} from {}",
                kind, record.id, party
            ),
        }

        let signatures = record.signatures(kind).to_vec();
        Ok(SignatureReceipt {
            escrow_id: record.id,
            status: record.status,
            txid: record.settlement_txid(kind).map(|txid| txid.to_string()),
            signatures_count: signatures.len(),
            signatures_needed: SIGNATURE_THRESHOLD,
            signatures,
        })
    }

    /// Fetch an escrow by id.
    pub async fn get_escrow(&self, id: Uuid) -> EscrowResult<EscrowRecord> {
        self.store.get(id).await
    }

    /// Number of escrows currently tracked.
    pub async fn escrow_count(&self) -> usize {
        self.store.len().await
    }
}
