use astra::runtime::serve;
use astra::{
    App, Backend, BackendError, ChatId, Config, InMemoryRecordStore, Inbound, Reply, Schema,
    Transport,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

struct CannedBackend;

#[async_trait]
impl Backend for CannedBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        Ok(format!("you said {prompt}"))
    }
}

/// Hands out queued batches, then cancels the loop once drained.
struct QueueTransport {
    batches: Mutex<VecDeque<Vec<Inbound>>>,
    sent: Mutex<Vec<(ChatId, Reply)>>,
    done: CancellationToken,
}

#[async_trait]
impl Transport for QueueTransport {
    async fn receive(&self) -> anyhow::Result<Vec<Inbound>> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => {
                self.done.cancel();
                std::future::pending().await
            }
        }
    }

    async fn send(&self, chat: &ChatId, reply: &Reply) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((chat.clone(), reply.clone()));
        Ok(())
    }
}

fn msg(chat: &str, text: &str) -> Inbound {
    Inbound {
        chat: ChatId::from(chat),
        text: text.into(),
    }
}

#[tokio::test]
async fn replies_in_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_toml(&format!(
        "log_path = {:?}\n[notion]\ndatabase_id = \"db\"\n",
        dir.path().join("log.json").display().to_string()
    ))
    .unwrap();
    let store = Arc::new(InMemoryRecordStore::new(
        Schema::new()
            .with_field("Task name", "title")
            .with_field("Status", "status")
            .with_field("Due Date", "date"),
    ));
    let cancel = CancellationToken::new();
    let transport = Arc::new(QueueTransport {
        batches: Mutex::new(VecDeque::from(vec![
            vec![msg("a", "/settask Taxes"), msg("b", "hi")],
            vec![msg("a", "04/15/2026")],
        ])),
        sent: Mutex::new(Vec::new()),
        done: cancel.clone(),
    });
    let app = App::assemble(&config, store.clone(), Arc::new(CannedBackend), transport.clone()).await;

    serve(transport.as_ref(), &app.orchestrator, cancel).await;

    let sent = transport.sent.lock().unwrap().clone();
    let texts: Vec<(&str, &str)> = sent
        .iter()
        .map(|(chat, reply)| (chat.as_str(), reply.text.as_str()))
        .collect();
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0].0, "a");
    assert!(texts[0].1.starts_with("📅 Got it: 'Taxes'"));
    assert_eq!(texts[1], ("b", "you said hi"));
    assert_eq!(
        texts[2],
        ("a", "✅ Task 'Taxes' created in Notion, due 04/15/2026.")
    );
    assert_eq!(store.records().await.len(), 1);
    assert!(dir.path().join("log.json").exists());
}
