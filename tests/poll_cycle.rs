//! End-to-end poll cycle tests.
//!
//! Outreach goes out through a recording transport, the "reply" comes back
//! through a stub mailbox, and the ledger is a real CSV file in a temp dir.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use replyloop::commands::{OUTREACH_SUBJECT, OUTREACH_VARIANT, render_outreach};
use replyloop::config::{MailboxConfig, SenderIdentity};
use replyloop::error::{GenerationError, TransportError};
use replyloop::llm::{self, Generator};
use replyloop::mailbox::{MailboxConnector, MailboxSession};
use replyloop::pipeline::{DecisionEngine, Dispatcher, Orchestrator, Scanner};
use replyloop::store::{CsvLedger, CsvProcessedSet, Direction, Ledger, LedgerEntry};
use replyloop::token::{self, ThreadToken};
use replyloop::transport::{OutboundEmail, Transport, TransportReceipt};

// ── Stub collaborators ──────────────────────────────────────────────

/// Mailbox whose unread messages are set by the test.
#[derive(Clone, Default)]
struct StubMailbox {
    messages: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl StubMailbox {
    fn deliver(&self, uid: &str, raw: Vec<u8>) {
        self.messages.lock().unwrap().push((uid.to_string(), raw));
    }
}

struct StubSession(StubMailbox);

impl MailboxConnector for StubMailbox {
    fn open_session(&self) -> Box<dyn MailboxSession> {
        Box::new(StubSession(self.clone()))
    }
}

#[async_trait]
impl MailboxSession for StubSession {
    async fn authenticate(&mut self, _: &str, _: &str, _: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn select_mailbox(&mut self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn search_unseen(&mut self) -> Result<Vec<String>, TransportError> {
        let messages = self.0.messages.lock().unwrap();
        Ok(messages.iter().map(|(uid, _)| uid.clone()).collect())
    }

    async fn fetch_full(&mut self, id: &str) -> Result<Vec<u8>, TransportError> {
        let messages = self.0.messages.lock().unwrap();
        messages
            .iter()
            .find(|(uid, _)| uid == id)
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| TransportError::Mailbox {
                op: "FETCH".into(),
                reason: format!("no such message {id}"),
            })
    }

    async fn logout(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Transport that records everything and can be told to reject a recipient.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutboundEmail>>,
    reject: Mutex<Option<String>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    fn reject(&self, to: &str) {
        *self.reject.lock().unwrap() = Some(to.to_string());
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn provider(&self) -> &str {
        "sg"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError> {
        if self.reject.lock().unwrap().as_deref() == Some(email.to.as_str()) {
            return Err(TransportError::Rejected {
                provider: "sg".into(),
                status: 400,
                body: "bad recipient".into(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(TransportReceipt { status_code: 202 })
    }
}

/// Scripted reply that makes the generator stall past its deadline.
const STALL: &str = "<stall>";

/// Generator that answers from a per-subject script, under a short deadline.
struct ScriptedGenerator {
    replies: HashMap<&'static str, &'static str>,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, GenerationError> {
        let reply = self
            .replies
            .iter()
            .find(|(subject, _)| user.contains(*subject))
            .map(|(_, reply)| reply.to_string())
            .ok_or_else(|| GenerationError::RequestFailed {
                provider: "scripted".into(),
                reason: "no scripted reply".into(),
            })?;

        llm::with_timeout(Duration::from_millis(50), async move {
            if reply == STALL {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(reply)
        })
        .await
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    mailbox: StubMailbox,
    transport: Arc<RecordingTransport>,
    ledger: Arc<CsvLedger>,
    orchestrator: Orchestrator,
    dispatcher: Dispatcher,
}

fn sender() -> SenderIdentity {
    SenderIdentity::new("sdr@example.com", "SDR Bot")
}

async fn harness(replies: &[(&'static str, &'static str)]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(CsvLedger::open(dir.path().join("mails_log.csv")).await.unwrap());
    let processed = Arc::new(
        CsvProcessedSet::open(dir.path().join("inbound_seen.csv"))
            .await
            .unwrap(),
    );
    let transport = Arc::new(RecordingTransport::default());
    let mailbox = StubMailbox::default();

    let mailbox_config = MailboxConfig {
        host: "imap.example.com".into(),
        port: 993,
        username: "inbox@example.com".into(),
        password: SecretString::from("pw"),
        mailbox: "INBOX".into(),
    };
    let generator = Arc::new(ScriptedGenerator {
        replies: replies.iter().copied().collect(),
    });

    let reply_to = Some("inbox@example.com".to_string());
    let orchestrator = Orchestrator::new(
        Scanner::new(Arc::new(mailbox.clone()), mailbox_config, processed),
        DecisionEngine::new(generator, sender()),
        Dispatcher::new(transport.clone(), ledger.clone(), sender()).with_reply_to(reply_to.clone()),
        ledger.clone(),
    );
    let dispatcher =
        Dispatcher::new(transport.clone(), ledger.clone(), sender()).with_reply_to(reply_to);

    Harness {
        _dir: dir,
        mailbox,
        transport,
        ledger,
        orchestrator,
        dispatcher,
    }
}

impl Harness {
    async fn send_outreach(&self, to: &str) -> ThreadToken {
        self.dispatcher
            .send(
                to,
                OUTREACH_SUBJECT,
                &render_outreach("SDR Bot"),
                None,
                OUTREACH_VARIANT,
            )
            .await
            .unwrap()
            .token
    }

    async fn entries(&self) -> Vec<LedgerEntry> {
        self.ledger.entries().await.unwrap()
    }
}

fn reply_from(from: &str, subject: &str, body: &str, token: &ThreadToken) -> Vec<u8> {
    format!(
        "From: {from}\r\nTo: inbox@example.com\r\nSubject: {subject}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\r\n\
         {body}\r\n\r\n> Ref: [TID:{token}]\r\n"
    )
    .into_bytes()
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribe_reply_is_skipped() {
    let h = harness(&[(OUTREACH_SUBJECT, "Not replying per unsubscribe.")]).await;

    let token = h.send_outreach("alice@example.com").await;
    h.mailbox.deliver(
        "101",
        reply_from(
            "Alice <alice@example.com>",
            &format!("Re: {OUTREACH_SUBJECT}"),
            "please stop emailing me, unsubscribe",
            &token,
        ),
    );

    let report = h.orchestrator.run_poll_cycle().await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.replied, 0);

    // Only the original outreach went out.
    assert_eq!(h.transport.sent().len(), 1);

    let entries = h.entries().await;
    let skip = entries
        .iter()
        .find(|e| e.direction == Direction::AutoSkip)
        .unwrap();
    assert_eq!(skip.thread_id, token.as_str());
    assert_eq!(skip.to, "alice@example.com");
    assert_eq!(skip.status, "skipped");
    assert_eq!(skip.note, "unsubscribe");
    assert!(!entries.iter().any(|e| e.direction == Direction::AutoReply));
}

#[tokio::test]
async fn ordinary_reply_gets_answered_on_same_thread() {
    let h = harness(&[(OUTREACH_SUBJECT, "Sure, happy to help! Does Tuesday work?")]).await;

    let token = h.send_outreach("alice@example.com").await;
    h.mailbox.deliver(
        "102",
        reply_from(
            "Alice <alice@example.com>",
            OUTREACH_SUBJECT,
            "Interesting, tell me more.",
            &token,
        ),
    );

    let report = h.orchestrator.run_poll_cycle().await.unwrap();
    assert_eq!(report.replied, 1);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    let reply = &sent[1];
    assert_eq!(reply.to, "alice@example.com");
    assert_eq!(reply.subject, format!("Re: {OUTREACH_SUBJECT}"));
    assert_eq!(reply.reply_to.as_deref(), Some("inbox@example.com"));
    assert!(reply.html_body.contains("Sure, happy to help!"));
    assert_eq!(token::extract(&reply.html_body), Some(token.clone()));

    let entries = h.entries().await;
    let directions: Vec<Direction> = entries.iter().map(|e| e.direction).collect();
    assert_eq!(
        directions,
        vec![
            Direction::Outbound,
            Direction::InboundMatch,
            Direction::Outbound,
            Direction::AutoReply,
        ]
    );
    let auto = &entries[3];
    assert_eq!(auto.thread_id, token.as_str());
    assert_eq!(auto.variant, "AUTO");
    assert_eq!(auto.status, "ok");
    assert_eq!(auto.note, "auto_replied");

    // Timestamps never go backwards.
    assert!(entries.windows(2).all(|w| w[0].ts <= w[1].ts));

    // The same unread message is not answered twice.
    let again = h.orchestrator.run_poll_cycle().await.unwrap();
    assert_eq!(again.matched, 0);
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test]
async fn one_failing_match_does_not_stop_the_cycle() {
    let h = harness(&[
        ("Bounce me", "Thanks for writing."),
        ("Keep going", "Happy to help."),
    ])
    .await;

    let first = h.send_outreach("bounce@example.com").await;
    let second = h.send_outreach("carol@example.com").await;
    h.transport.reject("bounce@example.com");
    h.mailbox.deliver(
        "201",
        reply_from("bounce@example.com", "Bounce me", "hello", &first),
    );
    h.mailbox.deliver(
        "202",
        reply_from("carol@example.com", "Keep going", "hello", &second),
    );
    h.mailbox.deliver(
        "203",
        b"From: dave@example.com\r\nSubject: No token\r\n\r\nJust saying hi.\r\n".to_vec(),
    );

    let report = h.orchestrator.run_poll_cycle().await.unwrap();
    assert_eq!(report.matched, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.replied, 1);

    let entries = h.entries().await;
    let error = entries
        .iter()
        .find(|e| e.direction == Direction::Error)
        .unwrap();
    assert_eq!(error.thread_id, first.as_str());
    assert_eq!(error.status, "error");
    assert!(error.note.contains("400"));

    let replied: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| e.direction == Direction::AutoReply)
        .collect();
    assert_eq!(replied.len(), 1);
    assert_eq!(replied[0].thread_id, second.as_str());
}

#[tokio::test]
async fn stalled_generation_is_recorded_as_error() {
    let h = harness(&[("Slow one", STALL)]).await;

    let token = h.send_outreach("erin@example.com").await;
    h.mailbox.deliver(
        "301",
        reply_from("erin@example.com", "Slow one", "any news?", &token),
    );

    let report = h.orchestrator.run_poll_cycle().await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(h.transport.sent().len(), 1);

    let entries = h.entries().await;
    let error = entries.last().unwrap();
    assert_eq!(error.direction, Direction::Error);
    assert_eq!(error.thread_id, token.as_str());
    assert_eq!(error.status, "error");
    assert!(error.note.contains("timed out"));
}
