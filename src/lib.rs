//! Write-path coordination for order management.
//!
//! Tracks in-flight writes, invalidates the cached reads they make stale,
//! guards navigation until pending work settles and keeps an append-only
//! audit trail per order.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
