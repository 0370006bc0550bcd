//! REST API server for escrowd
//!
//! Exposes the escrow engine's operations over HTTP/JSON, plus the BIP70
//! payment request and payment endpoints, a health check, and CORS for
//! browser clients.

pub mod config;
pub mod error;
pub mod routes;
