//! netaudit
//!
//! Audits the network configuration of managed OpenShift clusters by combining
//! OCM cluster metadata with optional on-cluster diagnostic snapshots.

pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod logging;
pub mod output;

pub use api::{ManagementApi, OcmClient};
pub use audit::driver::{AuditRun, DriverOptions};
