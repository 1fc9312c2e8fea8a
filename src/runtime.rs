//! Wiring of transport, dialogue handling and the engagement sweep.

use crate::config::Config;
use crate::interaction_log::InteractionLog;
use crate::notion::NotionStore;
use crate::reply::{OllamaBackend, ReplyGenerator};
use crate::session::{ActiveChats, Orchestrator};
use crate::sweep::Sweep;
use crate::tasks::TaskBook;
use crate::transport::{TelegramTransport, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause before polling again after the transport failed.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(5);

/// Everything the bot needs, assembled from a [`Config`].
pub struct App {
    pub orchestrator: Orchestrator,
    pub sweep: Sweep,
    pub transport: Arc<dyn Transport>,
    pub sweep_interval: Duration,
}

impl App {
    /// Builds the production stack: Telegram, Notion and Ollama.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = NotionStore::new(&config.notion, config.notion_token()?)?;
        let timeout = Duration::from_secs(config.ollama.timeout_secs);
        let backend = OllamaBackend::new(&config.ollama.url, &config.ollama.model, timeout)?;
        let transport = TelegramTransport::new(
            &config.telegram.api_base,
            &config.telegram_token()?,
            Duration::from_secs(config.telegram.poll_timeout_secs),
        )?;
        info!(model = backend.model(), "using Ollama backend");
        Ok(Self::assemble(
            config,
            Arc::new(store),
            Arc::new(backend),
            Arc::new(transport),
        )
        .await)
    }

    /// Builds the bot around the given collaborators.
    pub async fn assemble(
        config: &Config,
        store: Arc<dyn crate::record_store::RecordStore>,
        backend: Arc<dyn crate::reply::Backend>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let log = Arc::new(InteractionLog::open(&config.log_path).await);
        let active = Arc::new(ActiveChats::default());
        let replies = Arc::new(
            ReplyGenerator::new(backend, config.name.clone())
                .with_timeout(Duration::from_secs(config.ollama.timeout_secs)),
        );
        let tasks = TaskBook::new(store, config.tasks.clone());
        let orchestrator = Orchestrator::new(
            tasks,
            replies.clone(),
            log.clone(),
            active.clone(),
            config.name.clone(),
        );
        let sweep = Sweep::new(
            active,
            log,
            replies,
            transport.clone(),
            Duration::from_secs(config.idle_after_secs),
        );
        Self {
            orchestrator,
            sweep,
            transport,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Runs the message loop and the sweep until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self {
            orchestrator,
            sweep,
            transport,
            sweep_interval,
        } = self;
        let sweep = Arc::new(sweep);
        let sweep_task = {
            let sweep = sweep.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { sweep.run(sweep_interval, cancel).await })
        };
        serve(transport.as_ref(), &orchestrator, cancel.clone()).await;
        cancel.cancel();
        sweep_task.await?;
        Ok(())
    }
}

/// Handles inbound messages one at a time, in arrival order, until `cancel`
/// fires. Each reply is sent before the next message is looked at.
pub async fn serve(transport: &dyn Transport, orchestrator: &Orchestrator, cancel: CancellationToken) {
    info!("listening for messages");
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = transport.receive() => batch,
        };
        match batch {
            Ok(messages) => {
                for msg in messages {
                    let reply = orchestrator.handle(&msg.chat, &msg.text).await;
                    if let Err(e) = transport.send(&msg.chat, &reply).await {
                        warn!(chat = %msg.chat, error = %e, "failed to send reply");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "receiving messages failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                }
            }
        }
    }
    debug!("message loop stopped");
}

/// Waits for either `Ctrl+C` or `SIGTERM` (on Unix).
pub async fn shutdown_signal() {
    debug!("awaiting shutdown signal");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "no SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    debug!("shutdown signal received");
}
