//! GetEntitlementHandler - Query handler for a user's balance and tier.

use std::sync::Arc;

use crate::domain::entitlement::{StoreError, Tier};
use crate::domain::foundation::UserId;
use crate::ports::EntitlementStore;

/// Query for one user's entitlement.
#[derive(Debug, Clone)]
pub struct GetEntitlementQuery {
    pub user_id: UserId,
}

/// Display view of an entitlement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetEntitlementResult {
    pub credits: u32,
    pub tier: Tier,
    /// True if the metered operation would currently be admitted.
    pub can_analyze: bool,
}

/// Handler for entitlement reads.
pub struct GetEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
}

impl GetEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: GetEntitlementQuery,
    ) -> Result<GetEntitlementResult, StoreError> {
        let record = self.store.read(&query.user_id).await?;
        Ok(GetEntitlementResult {
            credits: record.credits,
            tier: record.tier,
            can_analyze: record.can_consume(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::entitlement::EntitlementRecord;

    #[tokio::test]
    async fn unknown_user_reads_as_empty_free() {
        let handler = GetEntitlementHandler::new(Arc::new(InMemoryEntitlementStore::new()));
        let result = handler
            .handle(GetEntitlementQuery {
                user_id: UserId::new("nobody").unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(
            result,
            GetEntitlementResult {
                credits: 0,
                tier: Tier::Free,
                can_analyze: false,
            }
        );
    }

    #[tokio::test]
    async fn returns_seeded_record() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let user_id = UserId::new("u1").unwrap();
        store
            .seed(
                user_id.clone(),
                EntitlementRecord {
                    credits: 0,
                    tier: Tier::Pro,
                    version: 4,
                },
            )
            .await;

        let result = GetEntitlementHandler::new(store)
            .handle(GetEntitlementQuery { user_id })
            .await
            .unwrap();
        assert_eq!(result.tier, Tier::Pro);
        assert!(result.can_analyze);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store.set_unavailable(true);
        let result = GetEntitlementHandler::new(store)
            .handle(GetEntitlementQuery {
                user_id: UserId::new("u1").unwrap(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
