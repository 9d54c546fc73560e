//! Raw IMAP4rev1 over rustls. Blocking socket I/O runs inside
//! `spawn_blocking`; every operation is bounded by the configured timeout.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;

use super::{MailboxConnector, MailboxSession};

/// Error type for blocking IMAP operations.
type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Opens IMAPS sessions on a fixed port.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    port: u16,
    timeout: Duration,
}

impl ImapConnector {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl MailboxConnector for ImapConnector {
    fn open_session(&self) -> Box<dyn MailboxSession> {
        Box::new(ImapSession::new(self.port, self.timeout))
    }
}

/// One IMAP session. Not connected until `authenticate` succeeds.
pub struct ImapSession {
    port: u16,
    timeout: Duration,
    conn: Option<ImapConnection>,
}

impl ImapSession {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            conn: None,
        }
    }

    /// Run `f` against the live connection on the blocking pool.
    ///
    /// The connection is moved into the blocking task and handed back on
    /// completion. If the timeout fires first the connection is abandoned and
    /// later calls fail with "not connected".
    async fn run<T, F>(&mut self, op: &str, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapConnection) -> Result<T, ImapError> + Send + 'static,
    {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| mailbox_error(op, "not connected"))?;

        let task = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(TransportError::Timeout {
                op: format!("IMAP {op}"),
                timeout: self.timeout,
            }),
            Ok(Err(join)) => Err(mailbox_error(op, join)),
            Ok(Ok((conn, result))) => {
                self.conn = Some(conn);
                result.map_err(|e| mailbox_error(op, e))
            }
        }
    }
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn authenticate(
        &mut self,
        host: &str,
        user: &str,
        pass: &str,
    ) -> Result<(), TransportError> {
        let host = host.to_string();
        let login = format!("LOGIN {} {}", quote(user)?, quote(pass)?);
        let port = self.port;
        let read_timeout = self.timeout;

        let task = tokio::task::spawn_blocking(move || -> Result<ImapConnection, ImapError> {
            let mut conn = ImapConnection::connect(&host, port, read_timeout)?;
            conn.command(&login)?.ensure_ok()?;
            Ok(conn)
        });

        let conn = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    op: "IMAP login".into(),
                    timeout: self.timeout,
                });
            }
            Ok(Err(join)) => return Err(mailbox_error("login", join)),
            Ok(Ok(result)) => result.map_err(|e| mailbox_error("login", e))?,
        };

        self.conn = Some(conn);
        Ok(())
    }

    async fn select_mailbox(&mut self, name: &str) -> Result<(), TransportError> {
        let cmd = format!("SELECT {}", quote(name)?);
        self.run("select", move |conn| {
            conn.command(&cmd)?.ensure_ok()?;
            Ok(())
        })
        .await
    }

    async fn search_unseen(&mut self) -> Result<Vec<String>, TransportError> {
        self.run("search", |conn| {
            let resp = conn.command("UID SEARCH UNSEEN")?.ensure_ok()?;
            Ok(parse_search(&resp.untagged))
        })
        .await
    }

    async fn fetch_full(&mut self, id: &str) -> Result<Vec<u8>, TransportError> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(mailbox_error("fetch", format!("invalid UID {id:?}")));
        }
        let cmd = format!("UID FETCH {id} RFC822");
        self.run("fetch", move |conn| {
            let resp = conn.command(&cmd)?.ensure_ok()?;
            resp.literals
                .into_iter()
                .next()
                .ok_or_else(|| "FETCH response carried no message literal".into())
        })
        .await
    }

    async fn logout(&mut self) -> Result<(), TransportError> {
        if self.conn.is_none() {
            return Ok(());
        }
        let result = self
            .run("logout", |conn| {
                conn.command("LOGOUT")?;
                Ok(())
            })
            .await;
        self.conn = None;
        result
    }
}

// ── Connection ──────────────────────────────────────────────────────

/// A tagged command's collected response.
#[derive(Debug, Default)]
struct ImapResponse {
    /// Untagged and continuation lines, without line terminators.
    untagged: Vec<String>,
    /// Literal payloads in arrival order.
    literals: Vec<Vec<u8>>,
    /// Tagged completion, e.g. `OK SEARCH completed`.
    status: String,
}

impl ImapResponse {
    fn ensure_ok(self) -> Result<Self, ImapError> {
        if self.status.starts_with("OK") {
            Ok(self)
        } else {
            Err(format!("server replied {:?}", self.status).into())
        }
    }
}

struct ImapConnection {
    stream: BufReader<TlsStream>,
    next_tag: u32,
}

impl ImapConnection {
    fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((host, port))?;
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())?;
        let tls = rustls::ClientConnection::new(tls_config, server_name)?;

        let mut conn = Self {
            stream: BufReader::new(rustls::StreamOwned::new(tls, tcp)),
            next_tag: 1,
        };

        let greeting = conn.read_line()?;
        let greeting = String::from_utf8_lossy(&greeting);
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(format!("unexpected IMAP greeting {:?}", greeting.trim_end()).into());
        }
        debug!(host, port, "IMAP connected");
        Ok(conn)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, ImapError> {
        let mut buf = Vec::new();
        if self.stream.read_until(b'\n', &mut buf)? == 0 {
            return Err("IMAP connection closed".into());
        }
        Ok(buf)
    }

    fn command(&mut self, cmd: &str) -> Result<ImapResponse, ImapError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        writer.flush()?;

        let mut resp = ImapResponse::default();
        loop {
            let raw = self.read_line()?;
            let line = String::from_utf8_lossy(&raw).trim_end().to_string();

            if let Some(len) = literal_len(&line) {
                let mut data = vec![0u8; len];
                self.stream.read_exact(&mut data)?;
                resp.literals.push(data);
                resp.untagged.push(line);
                continue;
            }

            if let Some(status) = line
                .strip_prefix(tag.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
            {
                resp.status = status.to_string();
                return Ok(resp);
            }

            resp.untagged.push(line);
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn mailbox_error(op: &str, reason: impl std::fmt::Display) -> TransportError {
    TransportError::Mailbox {
        op: op.to_string(),
        reason: reason.to_string(),
    }
}

/// IMAP quoted string. CR/LF cannot be quoted and are rejected.
fn quote(value: &str) -> Result<String, TransportError> {
    if value.contains(['\r', '\n']) {
        return Err(mailbox_error("command", "argument contains a line break"));
    }
    Ok(format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

/// Byte count of a literal announced at the end of a response line (`{123}`).
fn literal_len(line: &str) -> Option<usize> {
    let body = line.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].parse().ok()
}

/// Identifiers from `* SEARCH` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .map(str::to_string)
        .collect()
}
