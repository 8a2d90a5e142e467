//! CoinPulse Library
//!
//! Polls CoinGecko market data, normalizes and scores it, and serves the
//! latest snapshot over HTTP

pub mod api;
pub mod cache;
pub mod config;
pub mod ingestion;
pub mod logging;
pub mod pipeline;
pub mod poller;
pub mod transform;
pub mod types;
