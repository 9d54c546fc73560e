//! Persistence layer — append-only ledger and processed-message set.

pub mod csv;
pub mod file;
pub mod memory;
pub mod model;
pub mod traits;

pub use file::{CsvLedger, CsvProcessedSet};
pub use memory::{MemoryLedger, MemoryProcessedSet};
pub use model::{Direction, LedgerEntry};
pub use traits::{Ledger, ProcessedSet};
