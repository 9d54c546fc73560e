//! Correlation and auto-reply pipeline.
//!
//! Scanner → DecisionEngine → Dispatcher, with every step recorded in the
//! ledger. The `Orchestrator` wires them into one poll cycle.

pub mod decision;
pub mod dispatcher;
pub mod orchestrator;
pub mod scanner;
pub mod types;

pub use decision::DecisionEngine;
pub use dispatcher::Dispatcher;
pub use orchestrator::Orchestrator;
pub use scanner::{MatchStream, Scanner};
pub use types::{Action, InboundMatch, MatchOutcome, PollReport, SendResult};
