use astra::{Backend, BackendError, Context, ReplyGenerator};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend answering from a fixed script and remembering every prompt.
#[derive(Default)]
struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<String, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(BackendError::Empty))
    }
}

struct SlowBackend {
    calls: Mutex<usize>,
}

#[async_trait]
impl Backend for SlowBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        *self.calls.lock().unwrap() += 1;
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok("too late".into())
    }
}

#[tokio::test]
async fn good_reply_skips_fallback() {
    let backend = ScriptedBackend::new(vec![Ok("Sure, here's one.".into())]);
    let replies = ReplyGenerator::new(backend.clone(), "Astra");
    assert_eq!(replies.generate("tell me a joke").await, "Sure, here's one.");
    assert_eq!(backend.prompts().len(), 1);
}

#[tokio::test]
async fn empty_reply_gets_exactly_one_fallback() {
    let backend = ScriptedBackend::new(vec![Ok("   ".into()), Ok("I blanked. Classic me.".into())]);
    let replies = ReplyGenerator::new(backend.clone(), "Astra");
    assert_eq!(replies.generate("hello?").await, "I blanked. Classic me.");
    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("you glitched while responding to: 'hello?'"));
}

#[tokio::test]
async fn double_failure_returns_last_resort() {
    let backend = ScriptedBackend::new(vec![
        Err(BackendError::Transport("connection refused".into())),
        Err(BackendError::Status(500)),
        Ok("never asked".into()),
    ]);
    let replies = ReplyGenerator::new(backend.clone(), "Astra");
    let text = replies.generate("hi").await;
    assert_eq!(text, "Astra short-circuited mid-roast. Try again later.");
    assert_eq!(text, replies.last_resort());
    assert_eq!(backend.prompts().len(), 2);
}

#[tokio::test]
async fn timeouts_count_as_failures() {
    let backend = Arc::new(SlowBackend {
        calls: Mutex::new(0),
    });
    let replies =
        ReplyGenerator::new(backend.clone(), "Astra").with_timeout(Duration::from_millis(20));
    assert_eq!(replies.generate("hi").await, replies.last_resort());
    assert_eq!(*backend.calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn contextual_reply_is_a_single_call() {
    let backend = ScriptedBackend::new(vec![Ok("Oh, you're back.".into())]);
    let replies = ReplyGenerator::new(backend.clone(), "Astra");
    let text = replies.generate_contextual(Context::NoResponse).await;
    assert_eq!(text, "Oh, you're back.");
    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("ignoring Astra for an hour"));
}

#[tokio::test]
async fn contextual_failures_surface_literals() {
    let backend = ScriptedBackend::new(vec![
        Err(BackendError::Status(502)),
        Err(BackendError::Transport("reset".into())),
    ]);
    let replies = ReplyGenerator::new(backend.clone(), "Astra");
    assert_eq!(
        replies.generate_contextual(Context::Generic).await,
        "Ollama mood: 502. Feeling grumpy."
    );
    assert_eq!(
        replies.generate_contextual(Context::Generic).await,
        "Astra fell asleep again."
    );
    assert_eq!(backend.prompts().len(), 2);
}
