//! Settlement broker - the chain-facing collaborators
//!
//! Address derivation, payment verification, and settlement synthesis sit
//! behind one trait so the engine can be exercised against deterministic
//! fakes. [`TestnetBroker`] performs real 2-of-3 P2SH derivation but mocks
//! everything that would touch a node: payments verify against a seeded
//! known-transaction set, and settlement transactions are fabricated rather
//! than constructed, signed, or broadcast.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2, OP_PUSHNUM_3};
use bitcoin::script::Builder;
use bitcoin::{Address, Network, PublicKey, Txid};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::EscrowResult;

/// A synthesized settlement transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub txid: String,
    pub raw_tx: String,
    pub fee_sats: i64,
    pub confirmations: i64,
}

/// Chain-facing capabilities the escrow engine consumes.
///
/// Each method is a candidate for replacement by a real wallet or node
/// integration; failures surface as [`EscrowError::Collaborator`] or one of
/// the payment-specific kinds.
#[async_trait]
pub trait SettlementBroker: Send + Sync {
    /// Derive the 2-of-3 multisig address guarding an escrow.
    fn derive_multisig_address(
        &self,
        buyer_pubkey: &str,
        seller_pubkey: &str,
        escrow_pubkey: &str,
    ) -> EscrowResult<String>;

    /// Check whether a funding transaction is settled on chain.
    async fn verify_payment(&self, txid: &str) -> EscrowResult<bool>;

    /// Synthesize the transaction that moves funds out of the multisig
    /// address. Synchronous so the service can run it inside the store's
    /// atomic update.
    fn synthesize_settlement(
        &self,
        from_address: &str,
        to_pubkey: &str,
        amount_sats: i64,
        private_key: &str,
    ) -> EscrowResult<ChainTransaction>;
}

/// Fee attached to every fabricated settlement transaction (fixed, not
/// estimated)
const SETTLEMENT_FEE_SATS: i64 = 1_000;

/// Txids the simulated chain accepts out of the box
const SEEDED_TXIDS: [&str; 2] = [
    "26dd4663518b3e24872fd5635fd889a8a0e1c232b8d488868ac378a0a2d28fb1",
    "3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b",
];

/// Broker over a simulated testnet chain.
///
/// Address derivation is real script math; payment verification checks a
/// known-settled txid set instead of querying a node, and settlement
/// transactions carry fabricated ids and raw bytes.
pub struct TestnetBroker {
    network: Network,
    settled: RwLock<HashSet<String>>,
}

impl TestnetBroker {
    pub fn new() -> Self {
        let settled = SEEDED_TXIDS.iter().map(|txid| txid.to_string()).collect();
        Self {
            network: Network::Testnet,
            settled: RwLock::new(settled),
        }
    }

    /// Mark a txid as settled on the simulated chain.
    pub async fn register_settled(&self, txid: &str) {
        self.settled.write().await.insert(txid.to_string());
    }
}

impl Default for TestnetBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementBroker for TestnetBroker {
    fn derive_multisig_address(
        &self,
        buyer_pubkey: &str,
        seller_pubkey: &str,
        escrow_pubkey: &str,
    ) -> EscrowResult<String> {
        let buyer = parse_pubkey(buyer_pubkey, "buyer")?;
        let seller = parse_pubkey(seller_pubkey, "seller")?;
        let escrow = parse_pubkey(escrow_pubkey, "escrow")?;

        // 2 <buyer> <seller> <escrow> 3 OP_CHECKMULTISIG
        let redeem_script = Builder::new()
            .push_opcode(OP_PUSHNUM_2)
            .push_key(&buyer)
            .push_key(&seller)
            .push_key(&escrow)
            .push_opcode(OP_PUSHNUM_3)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();

        let address = Address::p2sh(&redeem_script, self.network).map_err(|e| {
            EscrowError::collaborator(format!("failed to create multisig address: {}", e))
        })?;

        Ok(address.to_string())
    }

    async fn verify_payment(&self, txid: &str) -> EscrowResult<bool> {
        // 64 hex chars or it is not a txid at all
        Txid::from_str(txid).map_err(|_| {
            EscrowError::validation(format!(
                "invalid transaction ID format: must be 64 hexadecimal characters, got '{}'",
                txid
            ))
        })?;

        if !self.settled.read().await.contains(txid) {
            return Err(EscrowError::TransactionNotRecognized(txid.to_string()));
        }

        Ok(true)
    }

    fn synthesize_settlement(
        &self,
        _from_address: &str,
        _to_pubkey: &str,
        _amount_sats: i64,
        _private_key: &str,
    ) -> EscrowResult<ChainTransaction> {
        // A real implementation would select UTXOs from the multisig
        // address, build and sign the spend against the redeem script,
        // and broadcast it.
        Ok(ChainTransaction {
            txid: format!("tx-{}", Uuid::new_v4().simple()),
            raw_tx: "01000000...".to_string(),
            fee_sats: SETTLEMENT_FEE_SATS,
            confirmations: 0,
        })
    }
}

fn parse_pubkey(hex: &str, role: &str) -> EscrowResult<PublicKey> {
    PublicKey::from_str(hex)
        .map_err(|e| EscrowError::validation(format!("invalid {} public key: {}", role, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known secp256k1 points (generator multiples), valid compressed keys
    const BUYER_KEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const SELLER_KEY: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
    const ESCROW_KEY: &str = "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

    #[test]
    fn derives_deterministic_testnet_p2sh_address() {
        let broker = TestnetBroker::new();

        let first = broker
            .derive_multisig_address(BUYER_KEY, SELLER_KEY, ESCROW_KEY)
            .unwrap();
        let second = broker
            .derive_multisig_address(BUYER_KEY, SELLER_KEY, ESCROW_KEY)
            .unwrap();

        assert_eq!(first, second);
        // Testnet P2SH addresses are base58 and start with '2'
        assert!(first.starts_with('2'), "unexpected address: {}", first);
    }

    #[test]
    fn key_order_changes_the_address() {
        let broker = TestnetBroker::new();

        let forward = broker
            .derive_multisig_address(BUYER_KEY, SELLER_KEY, ESCROW_KEY)
            .unwrap();
        let reversed = broker
            .derive_multisig_address(ESCROW_KEY, SELLER_KEY, BUYER_KEY)
            .unwrap();

        assert_ne!(forward, reversed);
    }

    #[test]
    fn rejects_malformed_public_key() {
        let broker = TestnetBroker::new();
        let err = broker
            .derive_multisig_address("not-a-key", SELLER_KEY, ESCROW_KEY)
            .unwrap_err();
        assert!(matches!(err, EscrowError::Validation(_)));
    }

    #[tokio::test]
    async fn seeded_txid_verifies() {
        let broker = TestnetBroker::new();
        assert!(broker.verify_payment(SEEDED_TXIDS[0]).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_txid_not_recognized() {
        let broker = TestnetBroker::new();
        let unknown = "1111111111111111111111111111111111111111111111111111111111111111";

        let err = broker.verify_payment(unknown).await.unwrap_err();
        assert!(matches!(err, EscrowError::TransactionNotRecognized(_)));

        broker.register_settled(unknown).await;
        assert!(broker.verify_payment(unknown).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_txid_fails_validation() {
        let broker = TestnetBroker::new();
        let err = broker.verify_payment("tx-123").await.unwrap_err();
        assert!(matches!(err, EscrowError::Validation(_)));
    }

    #[test]
    fn synthesized_settlement_has_fresh_txid() {
        let broker = TestnetBroker::new();
        let tx = broker
            .synthesize_settlement("2N3oefVeg6st", SELLER_KEY, 99_000, "private-key")
            .unwrap();

        assert!(tx.txid.starts_with("tx-"));
        assert_eq!(tx.fee_sats, 1_000);
        assert_eq!(tx.confirmations, 0);
    }
}
