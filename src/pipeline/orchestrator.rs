//! One poll cycle: scan → decide → dispatch → record.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::store::{Direction, Ledger, LedgerEntry};

use super::decision::{self, AUTO_VARIANT, DecisionEngine};
use super::dispatcher::Dispatcher;
use super::scanner::Scanner;
use super::types::{Action, InboundMatch, MatchOutcome, PollReport};

pub struct Orchestrator {
    scanner: Scanner,
    decision: DecisionEngine,
    dispatcher: Dispatcher,
    ledger: Arc<dyn Ledger>,
    /// Held for the duration of a cycle; at most one cycle runs per mailbox.
    cycle_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        scanner: Scanner,
        decision: DecisionEngine,
        dispatcher: Dispatcher,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            scanner,
            decision,
            dispatcher,
            ledger,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one poll cycle.
    ///
    /// Fails only when the mailbox cannot be opened or the processed set cannot
    /// be read. Per-message failures are recorded in the ledger and counted.
    pub async fn run_poll_cycle(&self) -> Result<PollReport> {
        let _guard = self.cycle_lock.lock().await;
        info!("Poll cycle started");

        let mut matches = self.scanner.poll_once().await?;
        let mut report = PollReport::default();

        while let Some(next) = matches.next().await {
            let inbound = match next {
                Ok(inbound) => inbound,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable message");
                    report.scan_errors += 1;
                    continue;
                }
            };

            report.matched += 1;
            match self.process_match(&inbound).await {
                MatchOutcome::Replied(_) => report.replied += 1,
                MatchOutcome::Skipped => report.skipped += 1,
                MatchOutcome::Failed { .. } => report.failed += 1,
            }
        }

        info!(
            matched = report.matched,
            replied = report.replied,
            skipped = report.skipped,
            failed = report.failed,
            scan_errors = report.scan_errors,
            "Poll cycle finished"
        );
        Ok(report)
    }

    /// Handle one match. Never fails: any error becomes an `error` entry.
    async fn process_match(&self, inbound: &InboundMatch) -> MatchOutcome {
        match self.try_process(inbound).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(
                    uid = %inbound.uid,
                    thread_id = %inbound.token,
                    to = %inbound.sender,
                    error = %reason,
                    "Auto-reply failed"
                );
                let entry = LedgerEntry::new(
                    Direction::Error,
                    inbound.token.as_str(),
                    inbound.sender.as_str(),
                    inbound.subject.as_str(),
                )
                .with_variant(AUTO_VARIANT)
                .with_status("error")
                .with_note(reason.as_str());
                if let Err(e) = self.ledger.append(&entry).await {
                    warn!(thread_id = %inbound.token, error = %e, "Failed to record auto-reply error");
                }
                MatchOutcome::Failed { reason }
            }
        }
    }

    async fn try_process(&self, inbound: &InboundMatch) -> std::result::Result<MatchOutcome, String> {
        self.append(
            LedgerEntry::new(
                Direction::InboundMatch,
                inbound.token.as_str(),
                inbound.sender.as_str(),
                inbound.subject.as_str(),
            )
            .with_status("matched")
            .with_note(format!("uid:{}", inbound.uid)),
        )
        .await?;

        match self.decision.decide(inbound).await {
            Action::Skip => {
                self.append(
                    LedgerEntry::new(
                        Direction::AutoSkip,
                        inbound.token.as_str(),
                        inbound.sender.as_str(),
                        inbound.subject.as_str(),
                    )
                    .with_status("skipped")
                    .with_note("unsubscribe"),
                )
                .await?;
                info!(to = %inbound.sender, thread_id = %inbound.token, "Opt-out, not replying");
                Ok(MatchOutcome::Skipped)
            }
            Action::Reply { body } => {
                let subject = decision::add_reply_prefix(&inbound.subject);
                let sent = self
                    .dispatcher
                    .send(
                        &inbound.sender,
                        &subject,
                        &decision::render_reply_html(&body),
                        Some(inbound.token.clone()),
                        AUTO_VARIANT,
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                self.append(
                    LedgerEntry::new(
                        Direction::AutoReply,
                        sent.token.as_str(),
                        inbound.sender.as_str(),
                        subject.as_str(),
                    )
                    .with_variant(AUTO_VARIANT)
                    .with_status("ok")
                    .with_note("auto_replied"),
                )
                .await?;
                info!(
                    to = %inbound.sender,
                    thread_id = %sent.token,
                    status = %sent.status,
                    "Auto-reply sent"
                );
                Ok(MatchOutcome::Replied(sent))
            }
            Action::Failed { reason } => Err(reason),
        }
    }

    async fn append(&self, entry: LedgerEntry) -> std::result::Result<(), String> {
        self.ledger.append(&entry).await.map_err(|e| e.to_string())
    }
}
