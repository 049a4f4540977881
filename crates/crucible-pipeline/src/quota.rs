//! Point ledger charged once per successful synthesis.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crucible_types::Result;

/// The caller a synthesis is charged to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    /// Privileged identities bypass the ledger.
    #[serde(default)]
    pub privileged: bool,
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            privileged: false,
        }
    }

    pub fn privileged(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            privileged: true,
        }
    }
}

/// External point store. `try_consume` must be atomic per identity:
/// check the balance and decrement it in one step.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    async fn get_balance(&self, identity: &Identity) -> Result<u64>;

    /// Deduct `amount` if the balance covers it. `Ok(false)` leaves the
    /// balance untouched.
    async fn try_consume(&self, identity: &Identity, amount: u64) -> Result<bool>;
}

/// In-process ledger with one lock per identity.
#[derive(Debug, Default)]
pub struct InMemoryQuotaLedger {
    accounts: Mutex<HashMap<String, Arc<Mutex<u64>>>>,
    default_balance: u64,
}

impl InMemoryQuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance given to identities seen for the first time.
    pub fn with_default_balance(mut self, balance: u64) -> Self {
        self.default_balance = balance;
        self
    }

    pub async fn set_balance(&self, id: &str, balance: u64) {
        let account = self.account(id).await;
        *account.lock().await = balance;
    }

    async fn account(&self, id: &str) -> Arc<Mutex<u64>> {
        let mut accounts = self.accounts.lock().await;
        accounts
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(self.default_balance)))
            .clone()
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn get_balance(&self, identity: &Identity) -> Result<u64> {
        let account = self.account(&identity.id).await;
        let balance = *account.lock().await;
        Ok(balance)
    }

    async fn try_consume(&self, identity: &Identity, amount: u64) -> Result<bool> {
        let account = self.account(&identity.id).await;
        let mut balance = account.lock().await;
        if *balance < amount {
            tracing::info!(identity = %identity.id, balance = *balance, amount, "Insufficient balance");
            return Ok(false);
        }
        *balance -= amount;
        tracing::debug!(identity = %identity.id, remaining = *balance, "Consumed quota");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consume_decrements_until_empty() {
        let ledger = InMemoryQuotaLedger::new();
        ledger.set_balance("alice", 2).await;
        let alice = Identity::user("alice");

        assert!(ledger.try_consume(&alice, 1).await.unwrap());
        assert!(ledger.try_consume(&alice, 1).await.unwrap());
        assert!(!ledger.try_consume(&alice, 1).await.unwrap());
        assert_eq!(ledger.get_balance(&alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insufficient_balance_is_untouched() {
        let ledger = InMemoryQuotaLedger::new().with_default_balance(3);
        let bob = Identity::user("bob");
        assert!(!ledger.try_consume(&bob, 5).await.unwrap());
        assert_eq!(ledger.get_balance(&bob).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let ledger = InMemoryQuotaLedger::new().with_default_balance(1);
        assert!(ledger.try_consume(&Identity::user("a"), 1).await.unwrap());
        assert!(ledger.try_consume(&Identity::user("b"), 1).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_cannot_overdraw() {
        let ledger = Arc::new(InMemoryQuotaLedger::new());
        ledger.set_balance("carol", 1).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.try_consume(&Identity::user("carol"), 1).await.unwrap()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(
            ledger.get_balance(&Identity::user("carol")).await.unwrap(),
            0
        );
    }
}
