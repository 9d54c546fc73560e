//! Mailbox collaborator — the capability set the scanner needs from an inbox.

pub mod imap;

use async_trait::async_trait;

use crate::error::TransportError;

pub use imap::ImapConnector;

/// One authenticated conversation with a mailbox server.
///
/// Sessions are single-use: the scanner opens a fresh one per poll and calls
/// `logout` when done.
#[async_trait]
pub trait MailboxSession: Send {
    async fn authenticate(
        &mut self,
        host: &str,
        user: &str,
        pass: &str,
    ) -> Result<(), TransportError>;

    async fn select_mailbox(&mut self, name: &str) -> Result<(), TransportError>;

    /// Provider-native identifiers of every unread message.
    async fn search_unseen(&mut self) -> Result<Vec<String>, TransportError>;

    /// Raw RFC 5322 bytes of one message.
    async fn fetch_full(&mut self, id: &str) -> Result<Vec<u8>, TransportError>;

    async fn logout(&mut self) -> Result<(), TransportError>;
}

/// Opens new mailbox sessions.
pub trait MailboxConnector: Send + Sync {
    fn open_session(&self) -> Box<dyn MailboxSession>;
}
