//! The two operator commands: send one outreach message, poll once.
//!
//! Each command checks every setting it needs before touching the network or
//! the filesystem.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::llm::create_generator;
use crate::mailbox::ImapConnector;
use crate::pipeline::{DecisionEngine, Dispatcher, Orchestrator, PollReport, Scanner, SendResult};
use crate::store::{CsvLedger, CsvProcessedSet, Ledger};
use crate::transport::create_transport;

/// Subject of the built-in outreach message.
pub const OUTREACH_SUBJECT: &str = "Quick idea to cut manual ops by 30%";

/// Variant tag of the built-in outreach message.
pub const OUTREACH_VARIANT: &str = "A";

/// Body of the built-in outreach message, signed by `from_name`.
pub fn render_outreach(from_name: &str) -> String {
    format!(
        r#"
<div style="font-family:Inter,Arial,sans-serif;line-height:1.6">
  <p>Hi there,</p>
  <p>We built a tiny agent that drafts emails and auto-replies to common questions.
  Teams use it to cut manual ops by ~30% in the first week.</p>
  <p>Worth a 15-min chat to see if it's relevant for you?</p>
  <p>— {}</p>
</div>
"#,
        crate::content::escape_html(from_name)
    )
}

/// Send the outreach template to the configured test recipient.
pub async fn send_outreach(config: &Config) -> Result<SendResult> {
    let sender = config.require_sender()?.clone();
    let to = config.require_test_recipient()?.to_string();
    let transport = create_transport(config.require_transport()?, config.timeout)?;

    let ledger: Arc<dyn Ledger> = Arc::new(CsvLedger::open(&config.store.ledger_path).await?);
    let dispatcher = Dispatcher::new(transport, ledger, sender.clone())
        .with_reply_to(config.reply_to());

    let result = dispatcher
        .send(
            &to,
            OUTREACH_SUBJECT,
            &render_outreach(&sender.name),
            None,
            OUTREACH_VARIANT,
        )
        .await?;
    Ok(result)
}

/// Run one poll cycle against the configured mailbox.
pub async fn poll(config: &Config) -> Result<PollReport> {
    let sender = config.require_sender()?.clone();
    let mailbox = config.require_mailbox()?.clone();
    let transport = create_transport(config.require_transport()?, config.timeout)?;
    let generator = create_generator(config.require_generation()?, config.timeout)?;

    let ledger: Arc<dyn Ledger> = Arc::new(CsvLedger::open(&config.store.ledger_path).await?);
    let processed = Arc::new(CsvProcessedSet::open(&config.store.processed_path).await?);

    let connector = Arc::new(ImapConnector::new(mailbox.port, config.timeout));
    let orchestrator = Orchestrator::new(
        Scanner::new(connector, mailbox, processed),
        DecisionEngine::new(generator, sender.clone()),
        Dispatcher::new(transport, Arc::clone(&ledger), sender).with_reply_to(config.reply_to()),
        ledger,
    );
    orchestrator.run_poll_cycle().await
}
