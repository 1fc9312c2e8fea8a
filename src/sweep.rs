use crate::interaction_log::InteractionLog;
use crate::reply::{Context, ReplyGenerator};
use crate::session::ActiveChats;
use crate::transport::{ChatId, Reply, Transport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed message every active chat receives on each sweep.
pub const CHECK_IN: &str =
    "👋 Just checking in. Anything new for your task list? /settask it before you forget.";

/// Outcome of one pass over the active chats.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub visited: usize,
    pub nudged: usize,
    pub failed: usize,
}

/// Periodic nudge for chats that have gone quiet.
pub struct Sweep {
    active: Arc<ActiveChats>,
    log: Arc<InteractionLog>,
    replies: Arc<ReplyGenerator>,
    transport: Arc<dyn Transport>,
    idle_after: chrono::Duration,
}

impl Sweep {
    pub fn new(
        active: Arc<ActiveChats>,
        log: Arc<InteractionLog>,
        replies: Arc<ReplyGenerator>,
        transport: Arc<dyn Transport>,
        idle_after: Duration,
    ) -> Self {
        Self {
            active,
            log,
            replies,
            transport,
            idle_after: chrono::Duration::from_std(idle_after)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    /// Runs one sweep as of `now`: quiet chats get a roast, every chat gets
    /// the check-in, and all of them are stamped as checked in one save.
    ///
    /// A failure for one chat is logged and the sweep moves on.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let chats = self.active.snapshot().await;
        let mut report = SweepReport::default();
        for chat in &chats {
            report.visited += 1;
            match self.visit(chat, now).await {
                Ok(true) => report.nudged += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(%chat, error = %e, "sweep failed for chat");
                    report.failed += 1;
                }
            }
        }
        self.log.record_checks(&chats, now).await;
        report
    }

    /// Returns whether the chat was nudged for being quiet. The check-in is
    /// attempted even when the nudge could not be delivered.
    async fn visit(&self, chat: &ChatId, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let record = self.log.get(chat).await.unwrap_or_default();
        let mut nudge = Ok(false);
        match record.last_response() {
            Some(Ok(at)) if now - at > self.idle_after => {
                let roast = self.replies.generate_contextual(Context::NoResponse).await;
                nudge = match self.transport.send(chat, &Reply::text(roast)).await {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        warn!(%chat, error = %e, "nudge not delivered");
                        Err(e)
                    }
                };
            }
            Some(Err(raw)) => {
                warn!(%chat, %raw, "unreadable last response time, skipping nudge");
            }
            _ => {}
        }
        self.transport.send(chat, &Reply::text(CHECK_IN)).await?;
        nudge
    }

    /// Runs [`Sweep::run_once`] every `interval` until `cancel` fires. The
    /// first pass happens one interval after start.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_once(Utc::now()).await;
                    info!(visited = report.visited, nudged = report.nudged, failed = report.failed, "engagement sweep done");
                }
            }
        }
        debug!("sweep loop stopped");
    }
}
