//! Anonymous usage ledger: per-caller, per-endpoint call counters.
//!
//! The ledger tracks how many times each anonymous caller has hit each
//! metered endpoint. Ceiling enforcement lives in the gateway; the ledger
//! only records and reports.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::endpoints::Endpoint;
use crate::storage::{UsageCounts, UsageStore};

pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
}

impl UsageLedger {
    #[must_use]
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Counters for a presented anonymous id; `None` means the id was never
    /// issued here, which the gateway treats as a forgery attempt.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn usage(&self, anon_id: &str) -> Result<Option<UsageCounts>> {
        self.store.get_usage(anon_id).await
    }

    /// Mint a new anonymous id seeded with one call to `first_endpoint`.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn register_new(&self, first_endpoint: Endpoint) -> Result<String> {
        let anon_id = Uuid::new_v4().to_string();
        self.store.create(&anon_id, first_endpoint.name()).await?;
        debug!(%anon_id, endpoint = %first_endpoint, "anonymous caller registered");
        Ok(anon_id)
    }

    /// Record one admitted call. Only called after the ceiling check passed,
    /// so rejected requests never consume quota.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn count_call(&self, anon_id: &str, endpoint: Endpoint) -> Result<()> {
        self.store.increment(anon_id, endpoint.name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::UsageLedger;
    use crate::auth::endpoints::Endpoint;
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn register_seeds_first_call() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
        let anon_id = ledger
            .register_new(Endpoint::WordsExplanation)
            .await
            .expect("register");

        let usage = ledger
            .usage(&anon_id)
            .await
            .expect("usage")
            .expect("known caller");
        assert_eq!(usage.count(Endpoint::WordsExplanation.name()), 1);
        assert_eq!(usage.count(Endpoint::Simplify.name()), 0);
    }

    #[tokio::test]
    async fn counters_are_independent_per_endpoint() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
        let anon_id = ledger
            .register_new(Endpoint::Simplify)
            .await
            .expect("register");

        for _ in 0..4 {
            ledger
                .count_call(&anon_id, Endpoint::Simplify)
                .await
                .expect("count");
        }
        ledger
            .count_call(&anon_id, Endpoint::Translate)
            .await
            .expect("count");

        let usage = ledger
            .usage(&anon_id)
            .await
            .expect("usage")
            .expect("known caller");
        assert_eq!(usage.count(Endpoint::Simplify.name()), 5);
        assert_eq!(usage.count(Endpoint::Translate.name()), 1);
    }

    #[tokio::test]
    async fn unknown_id_reports_absent() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
        assert!(ledger.usage("forged-id").await.expect("usage").is_none());
    }
}
