//! Upstox broker integration.
//!
//! REST client for candles, positions, quotes and orders, plus the
//! instrument master used to resolve underlyings and pick option contracts.

pub mod adapter;
pub mod client;
pub mod error;
pub mod instruments;
mod types;

pub use client::{UpstoxClient, UpstoxClientConfig, UPSTOX_API_URL};
pub use error::{Result, UpstoxError};
pub use instruments::{index_name, InstrumentMaster};
