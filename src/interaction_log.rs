//! Durable record of when each chat last spoke and was last checked on.
//!
//! The whole map lives in memory behind one lock and is written back in full
//! after every change, so the message path and the sweep never lose each
//! other's updates.

use crate::transport::ChatId;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Timestamps kept for one chat, as RFC 3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<String>,
}

impl InteractionRecord {
    /// When the chat last sent a message, if recorded and readable.
    pub fn last_response(&self) -> Option<Result<DateTime<Utc>, String>> {
        self.last_response_at
            .as_deref()
            .map(|raw| parse_timestamp(raw).ok_or_else(|| raw.to_string()))
    }
}

/// Parses an RFC 3339 timestamp, or a naive ISO one taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

type Entries = BTreeMap<ChatId, InteractionRecord>;

pub struct InteractionLog {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl InteractionLog {
    /// Opens the log at `path`. A missing or unreadable file starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path).await;
        debug!(path = %path.display(), chats = entries.len(), "interaction log loaded");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, chat: &ChatId) -> Option<InteractionRecord> {
        self.entries.lock().await.get(chat).cloned()
    }

    /// Stamps `lastResponseAt` for one chat and saves.
    pub async fn record_response(&self, chat: &ChatId, at: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.entry(chat.clone()).or_default().last_response_at = Some(at.to_rfc3339());
        self.save(&entries).await;
    }

    /// Stamps `lastCheckAt` for every chat in `chats`, keeping their other
    /// fields, and saves once.
    pub async fn record_checks(&self, chats: &[ChatId], at: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        let stamp = at.to_rfc3339();
        for chat in chats {
            entries.entry(chat.clone()).or_default().last_check_at = Some(stamp.clone());
        }
        self.save(&entries).await;
    }

    /// Writes the full map. Failures are logged; memory stays authoritative
    /// and the next save catches up.
    async fn save(&self, entries: &Entries) {
        if let Err(e) = write(&self.path, entries).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist interaction log");
        }
    }
}

async fn load(path: &Path) -> Entries {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no interaction log yet");
            return Entries::new();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "interaction log unreadable, starting empty");
        Entries::new()
    })
}

async fn write(path: &Path, entries: &Entries) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
