//! Simplified BIP70 payment protocol messages
//!
//! The shapes follow BIP70 with the serialization swapped from protobuf to
//! JSON, and the request additionally carries flattened address/amount
//! fields so demo clients can skip parsing the serialized details. These
//! are an external wire contract: handlers honor them, nothing here
//! redesigns them. Fixed to testnet, like the rest of the demo chain.

use std::str::FromStr;

use bitcoin::{Address, Network};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EscrowError;
use crate::EscrowResult;

/// BIP70 content type for payment request responses
pub const PAYMENT_REQUEST_CONTENT_TYPE: &str = "application/bitcoin-paymentrequest";
/// BIP70 content type for incoming payment messages
pub const PAYMENT_CONTENT_TYPE: &str = "application/bitcoin-payment";
/// BIP70 content type for payment acknowledgments
pub const PAYMENT_ACK_CONTENT_TYPE: &str = "application/bitcoin-paymentack";

/// How long a payment request stays payable
const PAYMENT_WINDOW_HOURS: i64 = 1;

/// Transaction output: where coins are sent to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub amount: i64,
    /// Script encoding the conditions to claim this output
    pub script: Vec<u8>,
}

/// Payment details as per BIP70
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// "main", "test", or "regtest"
    pub network: String,
    pub outputs: Vec<Output>,
    /// Unix timestamp when created
    pub time: i64,
    /// Unix timestamp when expired
    pub expires: i64,
    pub memo: String,
    /// URL to send the Payment message to
    pub payment_url: String,
    /// Arbitrary data echoed back by the wallet
    #[serde(default)]
    pub merchant_data: Vec<u8>,
}

/// BIP70 payment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub payment_details_version: i64,
    /// "none", "x509+sha256", ...
    pub pki_type: String,
    #[serde(default)]
    pub pki_data: Vec<u8>,
    pub serialized_details: Vec<u8>,
    #[serde(default)]
    pub signature: Vec<u8>,

    // Flattened fields for the simplified flow, not part of BIP70 itself
    pub address: String,
    pub amount: i64,
    pub expires_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// BIP70 payment message (customer to merchant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub merchant_data: Vec<u8>,
    /// Signed transactions satisfying the payment details
    pub transactions: Vec<Vec<u8>>,
    /// Where to send refunds
    #[serde(default)]
    pub refund_to: Vec<Output>,
    #[serde(default)]
    pub memo: String,
}

/// BIP70 payment acknowledgment (merchant to customer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAck {
    pub payment: Payment,
    pub memo: String,
}

/// Build a payment request for an escrow funding address.
pub fn build_payment_request(
    address: &str,
    amount_sats: i64,
    base_url: &str,
) -> EscrowResult<PaymentRequest> {
    if amount_sats <= 0 {
        return Err(EscrowError::validation("Amount must be positive"));
    }

    let parsed = Address::from_str(address)
        .map_err(|e| EscrowError::validation(format!("invalid address: {}", e)))?
        .require_network(Network::Testnet)
        .map_err(|e| EscrowError::validation(format!("invalid address: {}", e)))?;
    let script = parsed.script_pubkey().into_bytes();

    let request_id = format!("req-{}", Uuid::new_v4().simple());
    let now = Utc::now();
    let expires = now + Duration::hours(PAYMENT_WINDOW_HOURS);

    let details = PaymentDetails {
        network: "test".to_string(),
        outputs: vec![Output {
            amount: amount_sats,
            script,
        }],
        time: now.timestamp(),
        expires: expires.timestamp(),
        memo: "Escrow payment".to_string(),
        payment_url: format!("{}/api/pay/{}", base_url, request_id),
        merchant_data: format!("{{\"order_id\": \"{}\"}}", request_id).into_bytes(),
    };

    let serialized_details = serde_json::to_vec(&details)?;

    Ok(PaymentRequest {
        payment_details_version: 1,
        pki_type: "none".to_string(), // no PKI in the demo
        pki_data: Vec::new(),
        serialized_details,
        signature: Vec::new(),
        address: address.to_string(),
        amount: amount_sats,
        expires_time: expires,
        merchant_id: Some("escrowd".to_string()),
        request_id: request_id.clone(),
        callback_url: Some(format!("{}/api/callback/{}", base_url, request_id)),
    })
}
