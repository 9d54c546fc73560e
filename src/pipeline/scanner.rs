//! Inbound scanner — finds unread messages that carry a thread token.
//!
//! Connection setup (authenticate, select, search) and the processed-set
//! snapshot happen eagerly in `poll_once`; fetching and parsing happen lazily
//! as the returned stream is polled.

use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::content;
use crate::error::{Result, ScanError};
use crate::mailbox::{MailboxConnector, MailboxSession};
use crate::store::ProcessedSet;
use crate::token;

use super::types::InboundMatch;

/// Lazy, finite, single-use stream of matches from one poll.
pub type MatchStream =
    Pin<Box<dyn Stream<Item = std::result::Result<InboundMatch, ScanError>> + Send>>;

pub struct Scanner {
    connector: Arc<dyn MailboxConnector>,
    config: MailboxConfig,
    processed: Arc<dyn ProcessedSet>,
}

impl Scanner {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        config: MailboxConfig,
        processed: Arc<dyn ProcessedSet>,
    ) -> Self {
        Self {
            connector,
            config,
            processed,
        }
    }

    /// Open a fresh session and return the stream of token-bearing messages.
    ///
    /// Every scanned id is recorded in the processed set whether or not it
    /// matched, so a message is examined at most once across polls. A failed
    /// fetch leaves its id unrecorded for the next poll.
    pub async fn poll_once(&self) -> Result<MatchStream> {
        let mut session = self.connector.open_session();

        if let Err(e) = self.prepare(session.as_mut()).await {
            let _ = session.logout().await;
            return Err(e);
        }

        let ids = match session.search_unseen().await {
            Ok(ids) => ids,
            Err(e) => {
                let _ = session.logout().await;
                return Err(e.into());
            }
        };

        let already = match self.processed.load().await {
            Ok(set) => set,
            Err(e) => {
                let _ = session.logout().await;
                return Err(e.into());
            }
        };

        info!(
            mailbox = %self.config.mailbox,
            unseen = ids.len(),
            "Scanning unread messages"
        );

        let state = ScanState {
            session: Some(session),
            pending: ids.into(),
            visited: already,
            processed: Arc::clone(&self.processed),
        };
        Ok(Box::pin(futures::stream::unfold(state, ScanState::next)))
    }

    async fn prepare(&self, session: &mut dyn MailboxSession) -> Result<()> {
        session
            .authenticate(
                &self.config.host,
                &self.config.username,
                self.config.password.expose_secret(),
            )
            .await?;
        session.select_mailbox(&self.config.mailbox).await?;
        Ok(())
    }
}

struct ScanState {
    /// `None` once the session has been logged out.
    session: Option<Box<dyn MailboxSession>>,
    pending: VecDeque<String>,
    /// Ids already processed before this poll, plus ids handled during it.
    visited: HashSet<String>,
    processed: Arc<dyn ProcessedSet>,
}

type Step = std::result::Result<InboundMatch, ScanError>;

impl ScanState {
    async fn next(mut self) -> Option<(Step, Self)> {
        loop {
            let session = self.session.as_mut()?;

            let Some(uid) = self.pending.pop_front() else {
                if let Err(e) = session.logout().await {
                    debug!(error = %e, "Mailbox logout failed");
                }
                self.session = None;
                return None;
            };

            if !self.visited.insert(uid.clone()) {
                debug!(uid = %uid, "Already processed, skipping");
                continue;
            }

            let raw = match session.fetch_full(&uid).await {
                Ok(raw) => raw,
                Err(source) => {
                    // Not recorded; the next poll retries it.
                    warn!(uid = %uid, error = %source, "Failed to fetch message");
                    return Some((Err(ScanError::Fetch { uid, source }), self));
                }
            };

            let found = content::parse_message(&raw).and_then(|mail| {
                token::extract(&mail.text).map(|token| InboundMatch {
                    uid: uid.clone(),
                    sender: mail.sender,
                    subject: mail.subject,
                    token,
                    body: mail.text,
                })
            });

            if let Err(source) = self.processed.insert(&uid).await {
                warn!(uid = %uid, error = %source, "Failed to record processed message");
                return Some((Err(ScanError::Store { uid, source }), self));
            }

            match found {
                Some(hit) => {
                    debug!(uid = %uid, thread_id = %hit.token, "Matched thread token");
                    return Some((Ok(hit), self));
                }
                None => debug!(uid = %uid, "No thread token"),
            }
        }
    }
}
