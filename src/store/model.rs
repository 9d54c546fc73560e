//! Ledger record types.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Column header of the ledger file.
pub const LEDGER_HEADER: [&str; 8] = [
    "ts",
    "direction",
    "thread_id",
    "to",
    "subject",
    "variant",
    "status",
    "note",
];

/// Column header of the processed-set file.
pub const PROCESSED_HEADER: [&str; 1] = ["msg_uid"];

/// What kind of event a ledger row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outbound,
    InboundMatch,
    AutoReply,
    AutoSkip,
    Error,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::InboundMatch => "inbound-match",
            Self::AutoReply => "auto-reply",
            Self::AutoSkip => "auto-skip",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" => Ok(Self::Outbound),
            "inbound-match" => Ok(Self::InboundMatch),
            "auto-reply" => Ok(Self::AutoReply),
            "auto-skip" => Ok(Self::AutoSkip),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown direction {other:?}")),
        }
    }
}

/// One immutable ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub ts: DateTime<Utc>,
    pub direction: Direction,
    pub thread_id: String,
    pub to: String,
    pub subject: String,
    pub variant: String,
    pub status: String,
    pub note: String,
}

impl LedgerEntry {
    /// New entry stamped with the current (monotonic) time. Remaining columns
    /// start empty and are filled with the builder methods.
    pub fn new(
        direction: Direction,
        thread_id: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            ts: monotonic_now(),
            direction,
            thread_id: thread_id.into(),
            to: to.into(),
            subject: subject.into(),
            variant: String::new(),
            status: String::new(),
            note: String::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Column values in `LEDGER_HEADER` order.
    pub fn to_fields(&self) -> [String; 8] {
        [
            self.ts.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.direction.as_str().to_string(),
            self.thread_id.clone(),
            self.to.clone(),
            self.subject.clone(),
            self.variant.clone(),
            self.status.clone(),
            self.note.clone(),
        ]
    }

    /// Rebuild an entry from one ledger row.
    pub fn from_fields(fields: &[String]) -> Result<Self, String> {
        let [ts, direction, thread_id, to, subject, variant, status, note] = fields else {
            return Err(format!(
                "expected {} columns, found {}",
                LEDGER_HEADER.len(),
                fields.len()
            ));
        };
        let ts = DateTime::parse_from_rfc3339(ts)
            .map_err(|e| format!("bad timestamp {ts:?}: {e}"))?
            .with_timezone(&Utc);
        Ok(Self {
            ts,
            direction: direction.parse()?,
            thread_id: thread_id.clone(),
            to: to.clone(),
            subject: subject.clone(),
            variant: variant.clone(),
            status: status.clone(),
            note: note.clone(),
        })
    }
}

static LAST_TS: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

/// Current UTC time at microsecond precision (what the ledger stores), never
/// earlier than any value previously returned in this process.
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    let mut last = LAST_TS.lock().unwrap_or_else(PoisonError::into_inner);
    let ts = match *last {
        Some(prev) if prev > now => prev,
        _ => now,
    };
    *last = Some(ts);
    ts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_roundtrip() {
        for d in [
            Direction::Outbound,
            Direction::InboundMatch,
            Direction::AutoReply,
            Direction::AutoSkip,
            Direction::Error,
        ] {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
        assert!("inbound".parse::<Direction>().is_err());
    }

    #[test]
    fn fields_roundtrip() {
        let entry = LedgerEntry::new(Direction::Outbound, "ABCDEFABCDEF", "a@x.test", "Hi, there")
            .with_variant("A")
            .with_status("sg:202")
            .with_note("sent");
        let fields = entry.to_fields();
        assert_eq!(LedgerEntry::from_fields(&fields).unwrap(), entry);
    }

    #[test]
    fn from_fields_rejects_wrong_arity() {
        let fields = vec!["2026-01-01T00:00:00Z".to_string(), "outbound".to_string()];
        assert!(LedgerEntry::from_fields(&fields).is_err());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut prev = monotonic_now();
        for _ in 0..1000 {
            let next = monotonic_now();
            assert!(next >= prev);
            prev = next;
        }
    }
}
