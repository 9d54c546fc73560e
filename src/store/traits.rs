//! Storage traits for the ledger and the processed-message set.
//!
//! Both stores are append-only. Implementations must make `append`/`insert`
//! durable before returning and must never rewrite or remove earlier records.
//!
//! Concurrency contract: the file-backed implementations serialise writers
//! inside one process but assume no other process appends to the same files.
//! Deployments that run several pollers against one mailbox must inject an
//! implementation that coordinates across them, and must still run at most one
//! poll cycle per mailbox at a time (see `Orchestrator`).

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;

use super::model::LedgerEntry;

/// Append-only audit log of send / match / reply / skip / error events.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Durably append one entry.
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// All entries in append order.
    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Durable set of mailbox message identifiers that have already been scanned.
#[async_trait]
pub trait ProcessedSet: Send + Sync {
    /// Snapshot of every recorded identifier.
    async fn load(&self) -> Result<HashSet<String>, StoreError>;

    /// Durably record one identifier. Recording an existing identifier again
    /// is harmless.
    async fn insert(&self, uid: &str) -> Result<(), StoreError>;
}
