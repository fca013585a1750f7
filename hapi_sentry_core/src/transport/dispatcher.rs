/**
 * Background dispatch of built requests.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌──────────────┐  spawn(chain, request)  ┌──────────────────────┐
 *  │ Transport    │ ──────────────────────► │ dispatch task        │
 *  │ ::send()     │ ◄── DispatchHandle ──── │ (one per send)       │
 *  └──────────────┘                         └──────────┬───────────┘
 *                                                      │ PluginChain → HttpClient
 *                                           ┌──────────▼───────────┐
 *                                           │ backend              │
 *                                           └──────────┬───────────┘
 *                     DeliveryReport channel ◄─────────┘
 * ```
 *
 * Every send gets its own task; there is no queue and no ordering between
 * tasks. The caller gets a `DispatchHandle` back immediately and may drop
 * it, await it, or abort the task. Whatever happens, the outcome is also
 * published on a bounded report channel for observers such as metrics
 * exporters. When the channel is full the oldest report is evicted, so a
 * late subscriber reads the most recent outcomes.
 *
 * Tasks run on the ambient tokio runtime when the dispatcher is created
 * inside one, otherwise on a dedicated single-worker runtime owned by the
 * dispatcher.
 */
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use super::http::HttpClient;
use super::plugin::PluginChain;
use super::request::{OutgoingRequest, Reply};
use crate::error::{Result, TransportError};

// ---------------------------------------------------------------------------
// DeliveryOutcome / DeliveryReport
// ---------------------------------------------------------------------------

/// How a dispatched request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The backend acknowledged the event with a non-empty `id`.
    Confirmed { id: String },

    /// A reply arrived but it was not a valid acknowledgement.
    Unacknowledged { status: u16, body: String },

    /// No usable reply after all retries.
    Failed { error: String },
}

impl DeliveryOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DeliveryOutcome::Confirmed { .. })
    }
}

/// Outcome of one dispatch, published on the report channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub event_id: Uuid,
    pub outcome: DeliveryOutcome,
}

// ---------------------------------------------------------------------------
// DispatchHandle
// ---------------------------------------------------------------------------

/**
 * Handle to one dispatch task.
 *
 * Dropping the handle detaches the task; it keeps running.
 */
#[derive(Debug)]
pub struct DispatchHandle {
    event_id: Uuid,
    task: JoinHandle<DeliveryOutcome>,
}

impl DispatchHandle {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the task at its next suspension point.
    pub fn abort(&self) {
        self.task.abort();
    }

    /**
     * Waits for the task to finish.
     *
     * # Returns
     * `None` if the task was aborted or panicked.
     */
    pub async fn outcome(self) -> Option<DeliveryOutcome> {
        self.task.await.ok()
    }
}

// ---------------------------------------------------------------------------
// Runtime selection
// ---------------------------------------------------------------------------

/// Runtime created by the dispatcher when no ambient one exists.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        // may run inside an async context; must not block. In-flight tasks are abandoned.
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    client: Arc<dyn HttpClient>,
    reports: Sender<DeliveryReport>,
    report_rx: Receiver<DeliveryReport>,
    logger: Arc<str>,
    handle: Handle,
    _owned: Option<OwnedRuntime>,
}

impl Dispatcher {
    /**
     * Creates a dispatcher bound to the current runtime, or to a dedicated
     * one (thread name `sentry-dispatch`) when called outside any runtime.
     *
     * # Arguments
     * * `client`: terminal HTTP client shared by all tasks.
     * * `report_capacity`: size of the delivery-report channel.
     * * `logger`: logger channel name recorded on every task span.
     */
    pub fn new(
        client: Arc<dyn HttpClient>,
        report_capacity: usize,
        logger: &str,
    ) -> Result<Self> {
        let (handle, owned) = match Handle::try_current() {
            Ok(handle) => (handle, None),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("sentry-dispatch")
                    .enable_all()
                    .build()
                    .map_err(|e| TransportError::Runtime(e.to_string()))?;
                (runtime.handle().clone(), Some(OwnedRuntime(Some(runtime))))
            }
        };

        Ok(Self::with_handle(client, report_capacity, logger, handle, owned))
    }

    fn with_handle(
        client: Arc<dyn HttpClient>,
        report_capacity: usize,
        logger: &str,
        handle: Handle,
        owned: Option<OwnedRuntime>,
    ) -> Self {
        let (reports, report_rx) = crossbeam_channel::bounded(report_capacity.max(1));
        Self {
            client,
            reports,
            report_rx,
            logger: Arc::from(logger),
            handle,
            _owned: owned,
        }
    }

    /// Receiver for delivery reports. Clones share one queue.
    pub fn reports(&self) -> Receiver<DeliveryReport> {
        self.report_rx.clone()
    }

    /**
     * Spawns a task that runs `request` through `chain` and interprets the
     * reply. Returns immediately.
     */
    pub fn dispatch(
        &self,
        chain: PluginChain,
        request: OutgoingRequest,
        event_id: Uuid,
    ) -> DispatchHandle {
        let client = Arc::clone(&self.client);
        let reports = self.reports.clone();
        let backlog = self.report_rx.clone();
        let span = info_span!(
            "sentry_dispatch",
            logger = %self.logger,
            event_id = %event_id.simple(),
            url = %request.url,
        );

        let task = self.handle.spawn(
            async move {
                let outcome = match chain.execute(client.as_ref(), request).await {
                    Ok(reply) => interpret_reply(&reply),
                    Err(err) => {
                        warn!(error = %err, "sending event to sentry failed");
                        DeliveryOutcome::Failed {
                            error: err.to_string(),
                        }
                    }
                };

                publish(&reports, &backlog, DeliveryReport {
                    event_id,
                    outcome: outcome.clone(),
                });
                outcome
            }
            .instrument(span),
        );

        DispatchHandle { event_id, task }
    }
}

/**
 * Reads the backend acknowledgement.
 *
 * Anything other than a JSON object with a non-empty string `id` is logged
 * at warning level with the raw parsed value and reported as
 * `Unacknowledged`.
 */
pub fn interpret_reply(reply: &Reply) -> DeliveryOutcome {
    let parsed: Option<serde_json::Value> = serde_json::from_slice(&reply.body).ok();

    let id = parsed
        .as_ref()
        .and_then(|v| v.get("id"))
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty());

    match id {
        Some(id) => {
            debug!(id, status = reply.status.as_u16(), "event accepted by sentry");
            DeliveryOutcome::Confirmed { id: id.to_string() }
        }
        None => {
            let response = parsed
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            warn!(
                status = reply.status.as_u16(),
                response = %response,
                "sentry sending requests error"
            );
            DeliveryOutcome::Unacknowledged {
                status: reply.status.as_u16(),
                body: reply.body_text(),
            }
        }
    }
}

/// Publishes `report`, evicting the oldest queued report when the channel is full.
fn publish(
    reports: &Sender<DeliveryReport>,
    backlog: &Receiver<DeliveryReport>,
    report: DeliveryReport,
) {
    match reports.try_send(report) {
        Ok(()) => {}
        Err(TrySendError::Full(report)) => {
            if let Ok(evicted) = backlog.try_recv() {
                debug!(
                    evicted = %evicted.event_id.simple(),
                    "delivery report channel is full, dropping oldest report"
                );
            }
            if reports.try_send(report).is_err() {
                debug!("delivery report channel is full, dropping report");
            }
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}
