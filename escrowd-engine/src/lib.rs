//! Demonstration Bitcoin escrow engine
//!
//! This crate implements the core of a 2-of-3 multisig escrow workflow:
//! - escrow records with a fixed status lifecycle
//! - threshold signature collection (any 2 of buyer, seller, escrow agent)
//! - an in-memory store whose single lock keeps every read-modify-write atomic
//! - simplified BIP70 payment request structures
//!
//! Everything chain-shaped (address derivation, payment lookups, settlement
//! transactions) sits behind the [`broker::SettlementBroker`] trait and is
//! mocked; no real signing, broadcasting, or verification happens here.

pub mod bip70;
pub mod broker;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

use error::EscrowError;

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
