//! Error types for the escrow engine
//!
//! Every guard violation in the status state machine maps to exactly one
//! variant here; callers receive it synchronously and the record is left
//! unmodified. Nothing in this crate retries or swallows an error.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{EscrowStatus, Party};

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Missing or malformed required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// No escrow exists under the requested identifier
    #[error("Escrow {0} not found")]
    NotFound(Uuid),

    /// Operation not permitted in the record's current status
    #[error("Escrow status is {current}, must be {required} to process this request")]
    InvalidStatus { current: String, required: String },

    /// Party already signed this signature sequence
    #[error("A signature from {0} has already been provided")]
    DuplicateSignature(Party),

    /// Payment already verified for this escrow
    #[error("Escrow already has a verified payment with txid {txid}")]
    AlreadyFunded { txid: String },

    /// Address derivation, payment verification, or settlement synthesis
    /// failed upstream
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Payment txid is well-formed but not in the known-settled set
    #[error("Transaction {0} not found in the blockchain")]
    TransactionNotRecognized(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parsing errors
    #[error("UUID parsing error: {0}")]
    Uuid(#[from] uuid::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid-status error naming the required status
    pub fn invalid_status(current: EscrowStatus, required: &str) -> Self {
        Self::InvalidStatus {
            current: current.to_string(),
            required: required.to_string(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator<S: Into<String>>(msg: S) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
