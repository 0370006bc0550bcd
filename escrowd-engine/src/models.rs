//! Core data model for escrow records
//!
//! This module contains the escrow record, the party and status enums, and
//! the pure status state machine deciding every transition. Nothing here
//! performs I/O or locking; the store runs these methods under its write
//! lock so each decision commits atomically or not at all.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bip70::PaymentRequest;
use crate::error::EscrowError;
use crate::EscrowResult;

/// Signatures required to release or refund an escrow (2-of-3)
pub const SIGNATURE_THRESHOLD: usize = 2;

/// Escrow participant role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Buyer,
    Seller,
    Escrow,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Escrow => "escrow",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Party {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "escrow" => Ok(Self::Escrow),
            other => Err(EscrowError::validation(format!(
                "Party must be one of: buyer, seller, or escrow (got '{}')",
                other
            ))),
        }
    }
}

/// Escrow lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    /// Record created, multisig address derived, awaiting payment
    Created,
    /// Funding payment verified and held at the multisig address
    Funded,
    /// Collecting release signatures, below threshold
    Releasing,
    /// Collecting refund signatures, below threshold
    Refunding,
    /// Threshold reached, funds released to the seller
    Released,
    /// Threshold reached, funds returned to the buyer
    Refunded,
}

impl EscrowStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Funded => "funded",
            Self::Releasing => "releasing",
            Self::Refunding => "refunding",
            Self::Released => "released",
            Self::Refunded => "refunded",
        }
    }

    /// Check if this is a terminal status (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which settlement path a signature submission targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementKind {
    Release,
    Refund,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Refund => "refund",
        }
    }

    /// Status while signatures are being collected for this path
    pub fn pending_status(&self) -> EscrowStatus {
        match self {
            Self::Release => EscrowStatus::Releasing,
            Self::Refund => EscrowStatus::Refunding,
        }
    }

    /// Terminal status once the threshold is reached
    pub fn settled_status(&self) -> EscrowStatus {
        match self {
            Self::Release => EscrowStatus::Released,
            Self::Refund => EscrowStatus::Refunded,
        }
    }

    /// Statuses a submission is accepted in, for error messages
    pub fn required_statuses(&self) -> &'static str {
        match self {
            Self::Release => "'funded' or 'releasing'",
            Self::Refund => "'funded' or 'refunding'",
        }
    }
}

impl fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One party's contribution toward the 2-of-3 threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartySignature {
    pub party: Party,
    pub signature: String,
    pub public_key: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of appending one signature
#[derive(Debug, Clone, Copy)]
pub struct SignatureProgress {
    /// Sequence length after the append
    pub signatures: usize,
    /// True when this append brought the sequence to the threshold
    pub threshold_reached: bool,
}

/// One escrow agreement between a buyer, a seller, and an escrow agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: Uuid,
    pub buyer_pubkey: String,
    pub seller_pubkey: String,
    pub escrow_pubkey: String,
    pub multisig_address: String,
    pub amount_sats: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: EscrowStatus,
    pub payment_request: PaymentRequest,
    pub created_at: DateTime<Utc>,
    /// Advisory only; nothing reaps expired records
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release_signatures: Vec<PartySignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refund_signatures: Vec<PartySignature>,
}

impl EscrowRecord {
    /// Create a new escrow record in `created` status
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buyer_pubkey: String,
        seller_pubkey: String,
        escrow_pubkey: String,
        multisig_address: String,
        amount_sats: i64,
        description: Option<String>,
        payment_request: PaymentRequest,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            buyer_pubkey,
            seller_pubkey,
            escrow_pubkey,
            multisig_address,
            amount_sats,
            description,
            status: EscrowStatus::Created,
            payment_request,
            created_at: Utc::now(),
            expires_at,
            payment_txid: None,
            release_txid: None,
            refund_txid: None,
            release_signatures: Vec::new(),
            refund_signatures: Vec::new(),
        }
    }

    /// Signature sequence for a settlement path
    pub fn signatures(&self, kind: SettlementKind) -> &[PartySignature] {
        match kind {
            SettlementKind::Release => &self.release_signatures,
            SettlementKind::Refund => &self.refund_signatures,
        }
    }

    fn signatures_mut(&mut self, kind: SettlementKind) -> &mut Vec<PartySignature> {
        match kind {
            SettlementKind::Release => &mut self.release_signatures,
            SettlementKind::Refund => &mut self.refund_signatures,
        }
    }

    /// Settlement txid for a path, if the threshold was reached
    pub fn settlement_txid(&self, kind: SettlementKind) -> Option<&str> {
        match kind {
            SettlementKind::Release => self.release_txid.as_deref(),
            SettlementKind::Refund => self.refund_txid.as_deref(),
        }
    }

    /// Payout target for a settlement path: release pays the seller,
    /// refund returns to the buyer
    pub fn settlement_recipient(&self, kind: SettlementKind) -> &str {
        match kind {
            SettlementKind::Release => &self.seller_pubkey,
            SettlementKind::Refund => &self.buyer_pubkey,
        }
    }

    /// Record a verified funding payment, moving `created` to `funded`.
    ///
    /// A second verification is rejected with `AlreadyFunded` and leaves
    /// the stored txid untouched.
    pub fn record_payment(&mut self, txid: &str) -> EscrowResult<()> {
        match self.status {
            EscrowStatus::Funded => Err(EscrowError::AlreadyFunded {
                txid: self.payment_txid.clone().unwrap_or_default(),
            }),
            EscrowStatus::Created => {
                self.status = EscrowStatus::Funded;
                self.payment_txid = Some(txid.to_string());
                Ok(())
            }
            other => Err(EscrowError::invalid_status(other, "'created'")),
        }
    }

    /// Append one signature toward the 2-of-3 threshold.
    ///
    /// Accepted while the record is funded or already collecting for the
    /// same path. The party field is the uniqueness key for the sequence.
    /// Below the threshold the record moves to the path's pending status;
    /// at the threshold the status is left for [`Self::finalize_settlement`]
    /// so the settlement txid lands in the same commit.
    pub fn add_signature(
        &mut self,
        kind: SettlementKind,
        signature: PartySignature,
    ) -> EscrowResult<SignatureProgress> {
        if self.status != EscrowStatus::Funded && self.status != kind.pending_status() {
            return Err(EscrowError::invalid_status(
                self.status,
                kind.required_statuses(),
            ));
        }

        if self
            .signatures(kind)
            .iter()
            .any(|s| s.party == signature.party)
        {
            return Err(EscrowError::DuplicateSignature(signature.party));
        }

        let sequence = self.signatures_mut(kind);
        sequence.push(signature);
        let count = sequence.len();

        if count >= SIGNATURE_THRESHOLD {
            Ok(SignatureProgress {
                signatures: count,
                threshold_reached: true,
            })
        } else {
            self.status = kind.pending_status();
            Ok(SignatureProgress {
                signatures: count,
                threshold_reached: false,
            })
        }
    }

    /// Complete a settlement whose threshold was just reached
    pub fn finalize_settlement(&mut self, kind: SettlementKind, txid: String) {
        self.status = kind.settled_status();
        match kind {
            SettlementKind::Release => self.release_txid = Some(txid),
            SettlementKind::Refund => self.refund_txid = Some(txid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_request() -> PaymentRequest {
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
        }
    }

    fn record() -> EscrowRecord {
        EscrowRecord::new(
            "buyer-key".to_string(),
            "seller-key".to_string(),
            "escrow-key".to_string(),
            "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
            100_000,
            None,
            payment_request(),
            Utc::now() + chrono::Duration::hours(24),
        )
    }

    fn signature(party: Party) -> PartySignature {
        PartySignature {
            party,
            signature: format!("sig-{}", party),
            public_key: format!("{}-key", party),
            timestamp: Utc::now(),
        }
    }

    const TXID: &str = "26dd4663518b3e24872fd5635fd889a8a0e1c232b8d488868ac378a0a2d28fb1";

    #[test]
    fn payment_moves_created_to_funded() {
        let mut record = record();
        record.record_payment(TXID).unwrap();

        assert_eq!(record.status, EscrowStatus::Funded);
        assert_eq!(record.payment_txid.as_deref(), Some(TXID));
    }

    #[test]
    fn second_payment_verification_rejected() {
        let mut record = record();
        record.record_payment(TXID).unwrap();

        let err = record.record_payment("ffff").unwrap_err();
        assert!(matches!(err, EscrowError::AlreadyFunded { .. }));
        assert_eq!(record.payment_txid.as_deref(), Some(TXID));
    }

    #[test]
    fn payment_rejected_while_releasing() {
        let mut record = record();
        record.record_payment(TXID).unwrap();
        record
            .add_signature(SettlementKind::Release, signature(Party::Seller))
            .unwrap();

        let err = record.record_payment(TXID).unwrap_err();
        match err {
            EscrowError::InvalidStatus { current, required } => {
                assert_eq!(current, "releasing");
                assert!(required.contains("created"));
            }
            other => panic!("expected InvalidStatus, got {:?}", other),
        }
    }

    #[test]
    fn signature_rejected_before_funding() {
        let mut record = record();
        let err = record
            .add_signature(SettlementKind::Release, signature(Party::Buyer))
            .unwrap_err();

        match err {
            EscrowError::InvalidStatus { required, .. } => {
                assert!(required.contains("funded"));
                assert!(required.contains("releasing"));
            }
            other => panic!("expected InvalidStatus, got {:?}", other),
        }
        assert!(record.release_signatures.is_empty());
    }

    #[test]
    fn first_signature_moves_to_releasing() {
        let mut record = record();
        record.record_payment(TXID).unwrap();

        let progress = record
            .add_signature(SettlementKind::Release, signature(Party::Seller))
            .unwrap();

        assert_eq!(record.status, EscrowStatus::Releasing);
        assert_eq!(progress.signatures, 1);
        assert!(!progress.threshold_reached);
        assert!(record.release_txid.is_none());
    }

    #[test]
    fn duplicate_party_rejected_and_sequence_unchanged() {
        let mut record = record();
        record.record_payment(TXID).unwrap();
        record
            .add_signature(SettlementKind::Release, signature(Party::Seller))
            .unwrap();

        let err = record
            .add_signature(SettlementKind::Release, signature(Party::Seller))
            .unwrap_err();

        assert!(matches!(
            err,
            EscrowError::DuplicateSignature(Party::Seller)
        ));
        assert_eq!(record.release_signatures.len(), 1);
        assert_eq!(record.status, EscrowStatus::Releasing);
    }

    #[test]
    fn second_distinct_signature_reaches_threshold() {
        let mut record = record();
        record.record_payment(TXID).unwrap();
        record
            .add_signature(SettlementKind::Release, signature(Party::Seller))
            .unwrap();

        let progress = record
            .add_signature(SettlementKind::Release, signature(Party::Buyer))
            .unwrap();

        assert_eq!(progress.signatures, 2);
        assert!(progress.threshold_reached);

        record.finalize_settlement(SettlementKind::Release, "tx-final".to_string());
        assert_eq!(record.status, EscrowStatus::Released);
        assert_eq!(record.release_txid.as_deref(), Some("tx-final"));
        assert!(record.status.is_terminal());
    }

    #[test]
    fn refund_path_is_symmetric() {
        let mut record = record();
        record.record_payment(TXID).unwrap();

        record
            .add_signature(SettlementKind::Refund, signature(Party::Buyer))
            .unwrap();
        assert_eq!(record.status, EscrowStatus::Refunding);

        let progress = record
            .add_signature(SettlementKind::Refund, signature(Party::Escrow))
            .unwrap();
        assert!(progress.threshold_reached);

        record.finalize_settlement(SettlementKind::Refund, "tx-refund".to_string());
        assert_eq!(record.status, EscrowStatus::Refunded);
        assert_eq!(record.refund_txid.as_deref(), Some("tx-refund"));
    }

    #[test]
    fn starting_one_path_blocks_the_other() {
        let mut record = record();
        record.record_payment(TXID).unwrap();
        record
            .add_signature(SettlementKind::Release, signature(Party::Seller))
            .unwrap();

        let err = record
            .add_signature(SettlementKind::Refund, signature(Party::Buyer))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidStatus { .. }));
        assert!(record.refund_signatures.is_empty());
    }

    #[test]
    fn party_roundtrips_through_strings() {
        for party in [Party::Buyer, Party::Seller, Party::Escrow] {
            assert_eq!(party.as_str().parse::<Party>().unwrap(), party);
        }
        assert!("arbiter".parse::<Party>().is_err());
    }
}
