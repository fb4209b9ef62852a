//! Fingerprint store port.
//!
//! The fingerprint store is the only cross-run mutable state of the core. It
//! is owned by the consistency guardian and injected into it.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::FingerprintEntry;

/// Fingerprints of one contract, keyed by artifact path.
pub type FingerprintMap = BTreeMap<String, FingerprintEntry>;

#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Load all entries for a contract; empty when nothing is stored yet.
    async fn load(&self, contract_id: &str) -> DomainResult<FingerprintMap>;

    /// Replace all entries for a contract.
    async fn save(&self, contract_id: &str, entries: &FingerprintMap) -> DomainResult<()>;

    /// Forget every entry for a contract.
    async fn reset(&self, contract_id: &str) -> DomainResult<()>;
}
