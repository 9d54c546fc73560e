//! Configuration types, built once from the environment in `main` and passed
//! into each component at construction.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Default per-call timeout for mailbox, transport and generation calls.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Who outbound mail is from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub address: String,
    pub name: String,
}

impl SenderIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Fail unless a sender address is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "FROM_EMAIL".into(),
                hint: "Set the address outbound mail is sent from.".into(),
            });
        }
        Ok(())
    }
}

/// IMAP mailbox settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
}

/// Outbound transport selection.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    SendGrid {
        api_key: SecretString,
    },
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: SecretString,
    },
}

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBackend {
    OpenAi,
    Anthropic,
}

/// Generation collaborator settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub backend: GenerationBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Flat-file locations for the ledger and processed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub ledger_path: PathBuf,
    pub processed_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("mails_log.csv"),
            processed_path: PathBuf::from("inbound_seen.csv"),
        }
    }
}

/// Complete application configuration.
///
/// Optional sections are `None` when their variables are absent; the commands
/// that need them call the matching `require_*` accessor, which turns absence
/// into a `ConfigError` before any I/O happens.
#[derive(Debug, Clone)]
pub struct Config {
    pub sender: SenderIdentity,
    pub test_recipient: Option<String>,
    pub mailbox: Option<MailboxConfig>,
    pub transport: Option<TransportConfig>,
    pub generation: Option<GenerationConfig>,
    pub store: StoreConfig,
    pub timeout: Duration,
}

impl Config {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let sender = SenderIdentity {
            address: get("FROM_EMAIL").unwrap_or_default(),
            name: get("FROM_NAME").unwrap_or_else(|| "SDR Bot".to_string()),
        };

        let mailbox = match (get("IMAP_USER"), get("IMAP_PASS")) {
            (Some(username), Some(password)) => Some(MailboxConfig {
                host: get("IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".to_string()),
                port: parse_or("IMAP_PORT", get("IMAP_PORT"), 993)?,
                username,
                password: SecretString::from(password),
                mailbox: get("IMAP_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            }),
            _ => None,
        };

        let transport = if let Some(api_key) = get("SENDGRID_API_KEY") {
            Some(TransportConfig::SendGrid {
                api_key: SecretString::from(api_key),
            })
        } else if let Some(host) = get("SMTP_HOST") {
            Some(TransportConfig::Smtp {
                host,
                port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
                username: get("SMTP_USER").unwrap_or_default(),
                password: SecretString::from(get("SMTP_PASS").unwrap_or_default()),
            })
        } else {
            None
        };

        let model = get("AUTO_REPLY_MODEL");
        let generation = if let Some(key) = get("OPENAI_API_KEY") {
            Some(GenerationConfig {
                backend: GenerationBackend::OpenAi,
                api_key: SecretString::from(key),
                model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            })
        } else {
            get("ANTHROPIC_API_KEY").map(|key| GenerationConfig {
                backend: GenerationBackend::Anthropic,
                api_key: SecretString::from(key),
                model: model.unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            })
        };

        let defaults = StoreConfig::default();
        let store = StoreConfig {
            ledger_path: get("LOG_FILE").map_or(defaults.ledger_path, PathBuf::from),
            processed_path: get("SEEN_FILE").map_or(defaults.processed_path, PathBuf::from),
        };

        let timeout_secs = parse_or(
            "REPLYLOOP_TIMEOUT_SECS",
            get("REPLYLOOP_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "REPLYLOOP_TIMEOUT_SECS".into(),
                message: "must be at least 1 second".into(),
            });
        }

        Ok(Self {
            sender,
            test_recipient: get("TEST_TO"),
            mailbox,
            transport,
            generation,
            store,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn require_sender(&self) -> Result<&SenderIdentity, ConfigError> {
        self.sender.validate()?;
        Ok(&self.sender)
    }

    pub fn require_test_recipient(&self) -> Result<&str, ConfigError> {
        self.test_recipient
            .as_deref()
            .ok_or_else(|| missing("TEST_TO", "Set the recipient for the `send` command."))
    }

    pub fn require_mailbox(&self) -> Result<&MailboxConfig, ConfigError> {
        self.mailbox
            .as_ref()
            .ok_or_else(|| missing("IMAP_USER", "Set IMAP_USER and IMAP_PASS (and IMAP_HOST)."))
    }

    pub fn require_transport(&self) -> Result<&TransportConfig, ConfigError> {
        self.transport.as_ref().ok_or_else(|| {
            missing(
                "SENDGRID_API_KEY",
                "Set SENDGRID_API_KEY, or SMTP_HOST with SMTP_USER/SMTP_PASS.",
            )
        })
    }

    pub fn require_generation(&self) -> Result<&GenerationConfig, ConfigError> {
        self.generation
            .as_ref()
            .ok_or_else(|| missing("OPENAI_API_KEY", "Set OPENAI_API_KEY or ANTHROPIC_API_KEY."))
    }

    /// Address replies should go to: the polled mailbox, when configured.
    pub fn reply_to(&self) -> Option<String> {
        self.mailbox.as_ref().map(|m| m.username.clone())
    }
}

impl TransportConfig {
    /// Fail if the selected transport has no usable credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::SendGrid { api_key } if api_key.expose_secret().trim().is_empty() => {
                Err(missing("SENDGRID_API_KEY", "The SendGrid API key is empty."))
            }
            Self::Smtp { host, .. } if host.trim().is_empty() => {
                Err(missing("SMTP_HOST", "The SMTP relay host is empty."))
            }
            _ => Ok(()),
        }
    }
}

fn missing(key: &str, hint: &str) -> ConfigError {
    ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?} is not a valid value"),
        }),
    }
}
