//! Credit accounting seam called after a report is saved.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::error::StoreError;

#[async_trait]
pub trait Billing: Send + Sync {
    async fn has_active_subscription(&self, owner_id: &str) -> Result<bool, StoreError>;

    /// Atomically takes one credit; returns the remaining balance
    async fn decrement_credit(&self, owner_id: &str) -> Result<u32, StoreError>;
}

#[derive(Default)]
struct Ledger {
    credits: HashMap<String, u32>,
    subscribers: HashSet<String>,
}

/// Process-local ledger used by the CLI and tests
#[derive(Default)]
pub struct InMemoryBilling {
    ledger: Mutex<Ledger>,
}

impl InMemoryBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant_credits(&self, owner_id: &str, credits: u32) {
        let mut ledger = self.ledger.lock().await;
        *ledger.credits.entry(owner_id.to_string()).or_insert(0) += credits;
    }

    pub async fn subscribe(&self, owner_id: &str) {
        self.ledger.lock().await.subscribers.insert(owner_id.to_string());
    }

    pub async fn credits(&self, owner_id: &str) -> u32 {
        self.ledger.lock().await.credits.get(owner_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Billing for InMemoryBilling {
    async fn has_active_subscription(&self, owner_id: &str) -> Result<bool, StoreError> {
        Ok(self.ledger.lock().await.subscribers.contains(owner_id))
    }

    async fn decrement_credit(&self, owner_id: &str) -> Result<u32, StoreError> {
        let mut ledger = self.ledger.lock().await;
        let balance = ledger.credits.entry(owner_id.to_string()).or_insert(0);
        *balance = balance.saturating_sub(1);
        Ok(*balance)
    }
}
