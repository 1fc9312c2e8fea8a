//! Chat-driven task assistant.
//!
//! Inbound chat messages are routed by the [`Orchestrator`]: slash commands
//! become task operations against a [`RecordStore`] through the [`TaskBook`],
//! a pending `/settask` waits for its due date, and everything else is
//! answered by the [`ReplyGenerator`]. A [`Sweep`] periodically nudges chats
//! that went quiet, using the same [`InteractionLog`].

pub mod args;
pub mod command;
pub mod config;
pub mod error;
pub mod interaction_log;
pub mod logger;
pub mod notion;
pub mod property;
pub mod record_store;
pub mod reply;
pub mod runtime;
pub mod session;
pub mod sweep;
pub mod tasks;
pub mod transport;

pub use config::Config;
pub use error::{BackendError, StoreError, TaskError};
pub use interaction_log::{InteractionLog, InteractionRecord};
pub use notion::NotionStore;
pub use property::{FieldSchema, PropertyType, Schema};
pub use record_store::{Filter, InMemoryRecordStore, Properties, Record, RecordStore, Sort};
pub use reply::{Backend, Context, OllamaBackend, ReplyGenerator};
pub use runtime::{App, shutdown_signal};
pub use session::{ActiveChats, ChatSession, DialogueState, Orchestrator, PendingTask};
pub use sweep::{Sweep, SweepReport};
pub use tasks::TaskBook;
pub use transport::{ChatId, Inbound, Reply, TelegramTransport, Transport};
