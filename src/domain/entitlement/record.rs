//! Per-user entitlement record.

use serde::{Deserialize, Serialize};

use super::Tier;

/// Credits and subscription tier of one user.
///
/// `credits` is unsigned, so a negative balance cannot be represented.
/// `version` is owned by the store: every successful write bumps it by one,
/// and compare-and-swap callers must present the version they read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub credits: u32,
    pub tier: Tier,
    pub version: u64,
}

impl EntitlementRecord {
    /// The record of a user the ledger has never seen.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the metered operation may run for this record.
    pub fn can_consume(&self) -> bool {
        self.tier.is_unlimited() || self.credits >= 1
    }

    /// Returns a copy carrying `version`, used by stores after a write.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// True if credits and tier match, ignoring the version counter.
    pub fn same_balance(&self, other: &EntitlementRecord) -> bool {
        self.credits == other.credits && self.tier == other.tier
    }
}
