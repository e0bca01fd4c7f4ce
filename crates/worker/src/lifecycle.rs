//! Worker lifecycle: startup connectivity checks and graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dicebot_common::config::AppConfig;
use dicebot_common::error::AppError;
use dicebot_common::types::RequestSource;
use dicebot_notifier::NotificationChannel;
use dicebot_notifier::listener::ListenerHandle;

use crate::cycle::BatchCycle;
use crate::processor::RequestProcessor;
use crate::scheduler::Scheduler;
use crate::store::RequestStore;

/// Runtime settings the worker needs from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub max_batch_size: u32,
    pub channel_timeout: Duration,
    pub source: RequestSource,
}

impl From<&AppConfig> for WorkerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_batch_size: config.max_batch_size,
            channel_timeout: config.channel_timeout(),
            source: config.request_source,
        }
    }
}

/// Owns the scheduler, the inbound listener and the store for the process lifetime.
pub struct Worker<S, C: ?Sized> {
    store: Arc<S>,
    scheduler: Option<Scheduler<S, C>>,
    listener: Option<ListenerHandle>,
    shutting_down: AtomicBool,
}

impl<S, C> Worker<S, C>
where
    S: RequestStore,
    C: NotificationChannel + ?Sized + 'static,
{
    /// Verify connectivity, then start claim cycles when polling the queue.
    ///
    /// Either connectivity check failing is fatal; no cycle is started.
    pub async fn start(
        store: Arc<S>,
        channel: Arc<C>,
        settings: WorkerSettings,
    ) -> Result<Self, AppError> {
        store
            .ping()
            .await
            .map_err(|e| AppError::Connectivity(format!("store unreachable: {e}")))?;
        tracing::info!("Store connectivity verified");

        let identity = channel
            .identify()
            .await
            .map_err(|e| AppError::Connectivity(format!("notification channel handshake failed: {e}")))?;
        tracing::info!(bot = %identity, "Notification channel verified");

        let scheduler = match settings.source {
            RequestSource::QueuePoll => {
                let processor = RequestProcessor::new(channel, settings.channel_timeout);
                let cycle =
                    BatchCycle::new(Arc::clone(&store), processor, settings.max_batch_size);
                let scheduler = Scheduler::new(cycle, settings.poll_interval);
                scheduler.start().await;
                Some(scheduler)
            }
            RequestSource::InlineTrigger => {
                tracing::info!("Inline trigger mode, queue polling disabled");
                None
            }
        };

        Ok(Self {
            store,
            scheduler,
            listener: None,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Attach the channel's inbound listener so shutdown stops it too.
    pub fn with_listener(mut self, listener: ListenerHandle) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn scheduler(&self) -> Option<&Scheduler<S, C>> {
        self.scheduler.as_ref()
    }

    pub fn listener(&self) -> Option<&ListenerHandle> {
        self.listener.as_ref()
    }

    /// Stop the timer, let an in-flight cycle finish, stop the listener and
    /// close the pool. A second call while shutdown is under way is a no-op.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("Shutdown already in progress");
            return;
        }

        tracing::info!("Shutting down, waiting for in-flight cycle");
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop().await;
        }
        if let Some(listener) = &self.listener {
            listener.stop().await;
        }
        self.store.close().await;
        tracing::info!("Shutdown complete");
    }
}
