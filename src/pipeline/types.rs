//! Shared types for the poll → decide → dispatch pipeline.

use crate::token::ThreadToken;

// ── Inbound match ───────────────────────────────────────────────────

/// An unread message that carried a thread token.
///
/// Produced by the scanner and consumed immediately by the decision engine;
/// only the ledger entries derived from it are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMatch {
    /// Mailbox-assigned identifier (IMAP UID).
    pub uid: String,
    /// Bare sender address.
    pub sender: String,
    /// Decoded subject line.
    pub subject: String,
    /// Token extracted from the body.
    pub token: ThreadToken,
    /// Plain-text body.
    pub body: String,
}

// ── Decision ────────────────────────────────────────────────────────

/// What to do with a matched inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The sender opted out; log and send nothing.
    Skip,
    /// Send `body` (plain text) as the reply.
    Reply { body: String },
    /// No decision could be made (generation failed or was unusable).
    Failed { reason: String },
}

impl Action {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Reply { .. } => "reply",
            Self::Failed { .. } => "failed",
        }
    }
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Outcome of a successful outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    /// Ledger status value, e.g. `sg:202`.
    pub status: String,
    /// Token the message was stamped with.
    pub token: ThreadToken,
    /// Provider status code, verbatim.
    pub transport_status_code: u16,
}

// ── Orchestration ───────────────────────────────────────────────────

/// Result of handling one match. Every variant has already been written to the
/// ledger by the time it is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Replied(SendResult),
    Skipped,
    Failed { reason: String },
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Messages that carried a token.
    pub matched: usize,
    pub replied: usize,
    pub skipped: usize,
    /// Matches whose handling failed (each has an `error` ledger entry).
    pub failed: usize,
    /// Messages that could not be fetched or marked; not tied to a token.
    pub scan_errors: usize,
}
