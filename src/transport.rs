use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Opaque identity of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// A message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat: ChatId,
    pub text: String,
}

/// Text sent back to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Whether `text` carries Markdown formatting.
    pub markdown: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
        }
    }
}

/// Chat delivery service. Delivers messages per chat in order and never
/// retries on the bot's behalf.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Waits for the next batch of inbound messages.
    async fn receive(&self) -> anyhow::Result<Vec<Inbound>>;

    async fn send(&self, chat: &ChatId, reply: &Reply) -> anyhow::Result<()>;
}

/// Telegram caps a single message at this many characters.
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// [`Transport`] over the Telegram Bot API using long polling.
pub struct TelegramTransport {
    http: Client,
    base_url: String,
    poll_timeout: Duration,
    offset: Mutex<i64>,
}

#[derive(Deserialize)]
struct Updates {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct Sent {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramTransport {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> anyhow::Result<Self> {
        // The HTTP timeout has to outlast the long poll.
        let http = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{token}", api_base.trim_end_matches('/')),
            poll_timeout,
            offset: Mutex::new(0),
        })
    }
}

/// Splits text into pieces Telegram accepts, on character boundaries.
fn chunks(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(limit).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn receive(&self) -> anyhow::Result<Vec<Inbound>> {
        let mut offset = self.offset.lock().await;
        let url = format!("{}/getUpdates", self.base_url);
        let updates: Updates = self
            .http
            .get(url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout.as_secs().to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;
        if !updates.ok {
            anyhow::bail!(
                "getUpdates failed: {}",
                updates.description.unwrap_or_default()
            );
        }
        let mut inbound = Vec::new();
        for update in updates.result {
            *offset = (*offset).max(update.update_id + 1);
            if let Some(Message {
                chat,
                text: Some(text),
            }) = update.message
            {
                trace!(chat = chat.id, %text, "telegram message");
                inbound.push(Inbound {
                    chat: ChatId::from(chat.id),
                    text,
                });
            }
        }
        Ok(inbound)
    }

    async fn send(&self, chat: &ChatId, reply: &Reply) -> anyhow::Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        for piece in chunks(&reply.text, TELEGRAM_MESSAGE_LIMIT) {
            let mut body = json!({ "chat_id": chat.as_str(), "text": piece });
            if reply.markdown {
                body["parse_mode"] = json!("Markdown");
            }
            let sent: Sent = self.http.post(&url).json(&body).send().await?.json().await?;
            if !sent.ok {
                anyhow::bail!(
                    "sendMessage to {chat} failed: {}",
                    sent.description.unwrap_or_default()
                );
            }
        }
        debug!(%chat, "reply sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn transport(server: &MockServer) -> TelegramTransport {
        TelegramTransport::new(&server.base_url(), "T0K", Duration::from_secs(0)).unwrap()
    }

    #[tokio::test]
    async fn receives_text_and_advances_offset() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/botT0K/getUpdates")
                    .query_param("offset", "0");
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": [
                        { "update_id": 7, "message": { "chat": { "id": 42 }, "text": "hi" } },
                        { "update_id": 8, "message": { "chat": { "id": 42 } } }
                    ]
                }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/botT0K/getUpdates")
                    .query_param("offset", "9");
                then.status(200).json_body(json!({ "ok": true, "result": [] }));
            })
            .await;
        let t = transport(&server);
        let batch = t.receive().await.unwrap();
        assert_eq!(
            batch,
            vec![Inbound {
                chat: ChatId::from(42_i64),
                text: "hi".into()
            }]
        );
        assert!(t.receive().await.unwrap().is_empty());
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn markdown_flag_sets_parse_mode() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/botT0K/sendMessage").json_body(json!({
                    "chat_id": "42", "text": "*hi*", "parse_mode": "Markdown"
                }));
                then.status(200).json_body(json!({ "ok": true, "result": {} }));
            })
            .await;
        transport(&server)
            .send(&ChatId::from(42_i64), &Reply::markdown("*hi*"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn splits_long_messages() {
        let text = "a".repeat(10);
        let parts = chunks(&text, 4);
        assert_eq!(parts, vec!["aaaa", "aaaa", "aa"]);
    }
}
