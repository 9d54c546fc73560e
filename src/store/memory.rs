//! In-memory stores, mutex-coordinated. Useful for tests and for embedding the
//! engine where durability is provided elsewhere.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;

use super::model::LedgerEntry;
use super::traits::{Ledger, ProcessedSet};

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.entries.lock().await.clone())
    }
}

#[derive(Default)]
pub struct MemoryProcessedSet {
    uids: Mutex<HashSet<String>>,
}

impl MemoryProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedSet for MemoryProcessedSet {
    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.uids.lock().await.clone())
    }

    async fn insert(&self, uid: &str) -> Result<(), StoreError> {
        self.uids.lock().await.insert(uid.to_string());
        Ok(())
    }
}
