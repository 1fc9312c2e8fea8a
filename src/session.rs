//! Per-chat dialogue handling: decides whether a message is a command, the
//! answer to a pending question, or free chat, and drives at most one
//! downstream operation for it.

use crate::command::{self, Command, SETTASK_USAGE};
use crate::error::{TaskError, bounded};
use crate::interaction_log::InteractionLog;
use crate::property;
use crate::reply::{Context, ReplyGenerator};
use crate::tasks::TaskBook;
use crate::transport::{ChatId, Reply};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Longest store or transport error text echoed back to a chat.
const MAX_ERROR_CHARS: usize = 300;

/// Task text held while the bot waits for its due date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogueState {
    #[default]
    Idle,
    AwaitingDueDate(PendingTask),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    pub state: DialogueState,
}

impl ChatSession {
    pub fn pending_task(&self) -> Option<&PendingTask> {
        match &self.state {
            DialogueState::AwaitingDueDate(task) => Some(task),
            DialogueState::Idle => None,
        }
    }
}

/// In-memory dialogue state for every chat seen since startup.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<ChatId, ChatSession>>,
}

impl SessionStore {
    pub async fn get(&self, chat: &ChatId) -> ChatSession {
        self.inner.lock().await.get(chat).cloned().unwrap_or_default()
    }

    pub async fn put(&self, chat: &ChatId, session: ChatSession) {
        self.inner.lock().await.insert(chat.clone(), session);
    }
}

/// Chats the engagement sweep considers reachable.
#[derive(Default)]
pub struct ActiveChats {
    inner: Mutex<BTreeSet<ChatId>>,
}

impl ActiveChats {
    pub async fn insert(&self, chat: &ChatId) {
        self.inner.lock().await.insert(chat.clone());
    }

    pub async fn contains(&self, chat: &ChatId) -> bool {
        self.inner.lock().await.contains(chat)
    }

    /// Current members in a stable order.
    pub async fn snapshot(&self) -> Vec<ChatId> {
        self.inner.lock().await.iter().cloned().collect()
    }
}

fn help_text(persona: &str) -> String {
    format!(
        "*{persona}* keeps your Notion tasks honest.\n\n\
         `{SETTASK_USAGE}` create a task\n\
         `/listtasks` show tasks that are not done\n\
         `{}` change a property\n\
         `{}` show every property of a task\n\
         `/roast` you asked for it\n\n\
         Anything else gets a reply from me.",
        command::UPDATE_USAGE,
        command::DETAILS_USAGE,
    )
}

/// Turns a failed task operation into the text shown to the user.
fn failure(operation: &str, err: &TaskError) -> Reply {
    match err {
        TaskError::Store(e) => error!(error = %e, operation, "record store call failed"),
        other => debug!(error = %other, operation, "task operation refused"),
    }
    let reason = bounded(&err.to_string(), MAX_ERROR_CHARS);
    Reply::text(format!("❌ Failed to {operation}: {reason}"))
}

/// Routes inbound chat messages through the dialogue state machine.
pub struct Orchestrator {
    sessions: SessionStore,
    active: Arc<ActiveChats>,
    log: Arc<InteractionLog>,
    tasks: TaskBook,
    replies: Arc<ReplyGenerator>,
    persona: String,
}

impl Orchestrator {
    pub fn new(
        tasks: TaskBook,
        replies: Arc<ReplyGenerator>,
        log: Arc<InteractionLog>,
        active: Arc<ActiveChats>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            sessions: SessionStore::default(),
            active,
            log,
            tasks,
            replies,
            persona: persona.into(),
        }
    }

    /// Current dialogue state of `chat`.
    pub async fn session(&self, chat: &ChatId) -> ChatSession {
        self.sessions.get(chat).await
    }

    /// Handles one inbound message to completion and returns the reply.
    ///
    /// Every message stamps the chat's last response time and marks the chat
    /// active, whichever branch handles it.
    pub async fn handle(&self, chat: &ChatId, text: &str) -> Reply {
        self.log.record_response(chat, Utc::now()).await;
        self.active.insert(chat).await;

        let session = self.sessions.get(chat).await;
        let (session, reply) = match (session.state, command::parse(text)) {
            (state, Some(Command::SetTask { title, due })) => {
                self.begin_task(state, title, due).await
            }
            (DialogueState::AwaitingDueDate(task), _) => self.answer_due_date(task, text).await,
            (DialogueState::Idle, Some(cmd)) => (ChatSession::default(), self.run(cmd).await),
            (DialogueState::Idle, None) => {
                debug!(%chat, "free chat");
                let reply = Reply::text(self.replies.generate(text).await);
                (ChatSession::default(), reply)
            }
        };
        self.sessions.put(chat, session).await;
        reply
    }

    async fn begin_task(
        &self,
        state: DialogueState,
        title: String,
        due: Option<String>,
    ) -> (ChatSession, Reply) {
        if title.is_empty() {
            let reply = Reply::text(format!("❌ Usage: {SETTASK_USAGE}"));
            return (ChatSession { state }, reply);
        }
        let task = PendingTask { text: title };
        match due {
            Some(due) => self.answer_due_date(task, &due).await,
            None => {
                let reply = Reply::text(format!(
                    "📅 Got it: '{}'. When is it due? Reply with a date in MM/DD/YYYY format.",
                    task.text
                ));
                let session = ChatSession {
                    state: DialogueState::AwaitingDueDate(task),
                };
                (session, reply)
            }
        }
    }

    /// Completes a pending task with `text` as its due date. An unreadable
    /// date keeps the task pending so the user can try again.
    async fn answer_due_date(&self, task: PendingTask, text: &str) -> (ChatSession, Reply) {
        if let Err(e) = property::parse_user_date(text) {
            let reply = Reply::text(format!(
                "❌ {e} Still waiting on a due date for '{}'.",
                task.text
            ));
            let session = ChatSession {
                state: DialogueState::AwaitingDueDate(task),
            };
            return (session, reply);
        }
        let reply = match self.tasks.create(&task.text, text).await {
            Ok(msg) => Reply::text(msg),
            Err(e) => failure("create task", &e),
        };
        (ChatSession::default(), reply)
    }

    async fn run(&self, cmd: Command) -> Reply {
        match cmd {
            Command::Help => Reply::markdown(help_text(&self.persona)),
            Command::ListTasks => match self.tasks.list().await {
                Ok(text) => Reply::text(text),
                Err(e) => failure("fetch tasks", &e),
            },
            Command::UpdateTask {
                identity,
                field,
                value,
            } => match self.tasks.update(&identity, &field, &value).await {
                Ok(text) => Reply::text(text),
                Err(e) => failure("update task", &e),
            },
            Command::TaskDetails { identity } => match self.tasks.details(&identity).await {
                Ok(text) => Reply::text(text),
                Err(e) => failure("fetch details", &e),
            },
            Command::Roast => Reply::text(self.replies.generate_contextual(Context::Generic).await),
            Command::Usage(usage) => Reply::text(format!("❌ Usage: {usage}")),
            Command::Unknown(name) => {
                Reply::text(format!("🤷 I don't know /{name}. Try /help."))
            }
            Command::SetTask { .. } => {
                // Routed through `begin_task` by `handle`.
                Reply::text(format!("❌ Usage: {SETTASK_USAGE}"))
            }
        }
    }
}
