//! Reply decision — ask the generator for a draft and classify it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SenderIdentity;
use crate::content::escape_html;
use crate::llm::Generator;

use super::types::{Action, InboundMatch};

/// The exact sentence the generator returns when the sender opted out.
pub const REFUSAL_SENTENCE: &str = "Not replying per unsubscribe.";

/// Ledger variant for automated replies.
pub const AUTO_VARIANT: &str = "AUTO";

const SYSTEM_PROMPT: &str = "\
You are a polite SDR. Write a short, helpful reply (70-120 words), in the same language as the inbound email if possible.
- Acknowledge their message.
- Provide 1 clear answer or propose a quick call.
- Keep it simple, no marketing fluff.
- Sign as: {name}, {email}
";

pub struct DecisionEngine {
    generator: Arc<dyn Generator>,
    sender: SenderIdentity,
}

impl DecisionEngine {
    pub fn new(generator: Arc<dyn Generator>, sender: SenderIdentity) -> Self {
        Self { generator, sender }
    }

    /// Draft a reply to `inbound` and decide what to do with it.
    pub async fn decide(&self, inbound: &InboundMatch) -> Action {
        let system = self.system_prompt();
        let user = user_prompt(&inbound.subject, &inbound.body);

        let draft = match self.generator.complete(&system, &user).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(thread_id = %inbound.token, error = %e, "Reply generation failed");
                return Action::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let action = classify(draft);
        debug!(
            thread_id = %inbound.token,
            model = self.generator.model_name(),
            action = action.label(),
            "Reply decided"
        );
        action
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT
            .replace("{name}", &self.sender.name)
            .replace("{email}", &self.sender.address)
    }
}

fn user_prompt(subject: &str, body: &str) -> String {
    format!(
        "Inbound subject: {subject}\n----\nInbound message:\n{body}\n----\n\
         Write a concise reply. If the inbound says \"unsubscribe\" (or similar), \
         return exactly: \"{REFUSAL_SENTENCE}\""
    )
}

fn classify(draft: String) -> Action {
    if draft.trim().is_empty() {
        Action::Failed {
            reason: "empty draft".into(),
        }
    } else if is_refusal(&draft) {
        Action::Skip
    } else {
        Action::Reply {
            body: draft.trim().to_string(),
        }
    }
}

/// True iff `text` is the refusal sentence, ignoring surrounding whitespace and
/// case. Nothing looser counts.
pub fn is_refusal(text: &str) -> bool {
    text.trim().to_lowercase() == REFUSAL_SENTENCE.to_lowercase()
}

/// Prefix `Re: ` unless the subject already starts with `re:` in any case.
pub fn add_reply_prefix(subject: &str) -> String {
    let already = subject
        .get(..3)
        .is_some_and(|head| head.eq_ignore_ascii_case("re:"));
    if already {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Wrap a plain-text reply in the HTML shell sent to the recipient.
pub fn render_reply_html(body: &str) -> String {
    format!(
        "<div style='font-family:Inter,Arial,sans-serif;line-height:1.5;white-space:pre-wrap'>{}</div>",
        escape_html(body)
    )
}
