//! Thread tokens — generation, embedding into outbound HTML, extraction from
//! inbound plain text.
//!
//! The grammar is deliberately narrow: the literal `TID:` followed by exactly
//! twelve characters from `[A-Z0-9]`, with no further ASCII alphanumeric
//! directly after them.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Marker that precedes every token in outbound content.
pub const MARKER: &str = "TID:";

/// Number of characters in a token.
pub const TOKEN_LEN: usize = 12;

/// Opaque identifier correlating an outbound message with its replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadToken(String);

impl ThreadToken {
    /// Mint a fresh token from a v4 UUID (128 random bits, truncated).
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..TOKEN_LEN].to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejected token text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid thread token {0:?}: expected {TOKEN_LEN} characters from [A-Z0-9]")]
pub struct InvalidToken(pub String);

impl FromStr for ThreadToken {
    type Err = InvalidToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == TOKEN_LEN && s.bytes().all(is_token_byte) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidToken(s.to_string()))
        }
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit()
}

/// Append the tracking footer to an outbound HTML body.
///
/// The visible `[TID:…]` reference survives quoting and HTML-to-text
/// conversion on the reader's side; the trailing comment is a second copy for
/// clients that keep the raw HTML.
pub fn embed(html_body: &str, token: &ThreadToken) -> String {
    format!(
        "{html_body}\n\
         <hr style=\"border:none;border-top:1px solid #eee;margin:16px 0;\" />\n\
         <div style=\"font-size:12px;color:#888;\">\n\
         Ref: <b>[{MARKER}{token}]</b><br/>\n\
         If you prefer not to hear from us, reply \"unsubscribe\".\n\
         </div>\n\
         <!-- {MARKER}{token} -->\n"
    )
}

/// Find the first valid token in already-flattened plain text.
pub fn extract(text: &str) -> Option<ThreadToken> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(MARKER) {
        let start = from + pos + MARKER.len();
        let end = start + TOKEN_LEN;
        if end <= bytes.len()
            && bytes[start..end].iter().copied().all(is_token_byte)
            && !bytes.get(end).is_some_and(|b| b.is_ascii_alphanumeric())
        {
            // All bytes are ASCII, so the slice is on char boundaries.
            return Some(ThreadToken(text[start..end].to_string()));
        }
        from = from + pos + MARKER.len();
    }
    None
}
