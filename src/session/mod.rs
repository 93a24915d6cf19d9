//! The session facade and its three long-lived workers.
//!
//! # Architecture
//!
//! [`Session::start`] spawns the workers that make the session durable:
//!
//! - the **event loop** ([`supervisor`]) owns the transport lifecycle:
//!   connect with timeout, consume transport events, reconnect with bounded
//!   exponential backoff;
//! - the **send worker** ([`sender`]) drains the outbound queue while the
//!   session is connected and parks frames while it is not;
//! - the **health checker** ([`health`]) periodically audits liveness and
//!   queue pressure, without ever forcing a reconnect.
//!
//! All lifecycle state lives behind one mutex; the outbound queue is its own
//! concurrency primitive. [`Session::stop`] cascades cancellation through a
//! watch channel and the queue's stop sentinel, then joins every worker with
//! a grace timeout.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::{Config, Tuning};
use crate::error::Error;
use crate::handler::SessionHandler;
use crate::protocol;
use crate::queue::{OutboundQueue, PushOutcome};
use crate::state::{Phase, SessionState, Status};
use crate::telemetry;

mod health;
mod sender;
mod supervisor;

static GLOBAL: OnceCell<Session> = OnceCell::new();

/// A durable logical session over a WebSocket transport.
///
/// The session outlives individual connections: transient failures are
/// absorbed by the supervisor's reconnect loop, outbound messages are held
/// in a bounded queue until the transport can take them, and inbound frames
/// are dispatched to the injected [`SessionHandler`] off the I/O context.
///
/// Cloning is cheap; all clones drive the same underlying session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: Config,
    tuning: Tuning,
    handler: Arc<dyn SessionHandler>,
    state: Mutex<SessionState>,
    queue: OutboundQueue,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Option<Workers>>,
}

struct Workers {
    event_loop: JoinHandle<()>,
    send_worker: JoinHandle<()>,
    health_checker: JoinHandle<()>,
}

impl Session {
    /// Create a session from explicit configuration.
    pub fn new(config: Config, tuning: Tuning, handler: impl SessionHandler) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let queue = OutboundQueue::new(tuning.queue_capacity, tuning.overflow_policy);

        Self {
            inner: Arc::new(Inner {
                config,
                tuning,
                handler: Arc::new(handler),
                state: Mutex::new(SessionState::new()),
                queue,
                shutdown_tx,
                workers: Mutex::new(None),
            }),
        }
    }

    /// Create a session from environment variables, installing the log
    /// subscriber when `WS_LOG` asks for one.
    pub fn from_env(handler: impl SessionHandler) -> Result<Self> {
        let config = Config::from_env()?;
        telemetry::init(config.log_enabled);
        Ok(Self::new(config, Tuning::default(), handler))
    }

    /// Install the process-wide session instance.
    ///
    /// A process represents one client identity, so at most one session may
    /// be installed; a second call fails. Sessions created with
    /// [`Session::new`] are not subject to this policy.
    pub fn install(
        config: Config,
        tuning: Tuning,
        handler: impl SessionHandler,
    ) -> Result<&'static Session> {
        GLOBAL
            .try_insert(Self::new(config, tuning, handler))
            .map_err(|_| Error::config("a session is already installed for this process"))
    }

    /// The process-wide session, if one was installed.
    #[must_use]
    pub fn current() -> Option<&'static Session> {
        GLOBAL.get()
    }

    /// Start the session workers and begin connecting.
    ///
    /// Idempotent: only the first call on an idle session has any effect.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Idle {
                return;
            }
            state.phase = Phase::Connecting;
        }

        let workers = Workers {
            event_loop: tokio::spawn(supervisor::run(
                Arc::clone(&self.inner),
                self.inner.shutdown_tx.subscribe(),
            )),
            send_worker: tokio::spawn(sender::run(
                Arc::clone(&self.inner),
                self.inner.shutdown_tx.subscribe(),
            )),
            health_checker: tokio::spawn(health::run(
                Arc::clone(&self.inner),
                self.inner.shutdown_tx.subscribe(),
            )),
        };
        *self.inner.workers.lock() = Some(workers);

        info!(url = %self.inner.config.url, identifier = %self.inner.config.client_identifier, "session started");
    }

    /// Stop the session cooperatively.
    ///
    /// Idempotent. Signals every worker, joins each one within the shutdown
    /// grace (aborting stragglers), discards whatever is left in the queue
    /// and releases the transport.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.phase.is_shutdown() {
                return;
            }
            state.phase = Phase::Stopping;
        }
        info!("stopping session");

        self.inner.queue.push_stop();
        let _ = self.inner.shutdown_tx.send(true);

        let workers = self.inner.workers.lock().take();
        if let Some(workers) = workers {
            let grace = self.inner.tuning.shutdown_grace;
            join_with_grace("event-loop", workers.event_loop, grace).await;
            join_with_grace("send-worker", workers.send_worker, grace).await;
            join_with_grace("health-checker", workers.health_checker, grace).await;
        }

        let discarded = self.inner.queue.drain();
        if discarded > 0 {
            info!(discarded, "discarded queued frames on shutdown");
        }

        let mut state = self.inner.state.lock();
        state.transport = None;
        state.phase = Phase::Stopped;
        drop(state);
        info!("session stopped");
    }

    /// Queue a pre-serialized frame body for delivery.
    ///
    /// Never blocks and never fails: a full queue is resolved by the
    /// configured overflow policy and logged.
    pub fn send_message(&self, frame: impl Into<String>) {
        match self.inner.queue.push(frame.into()) {
            PushOutcome::Enqueued => {}
            PushOutcome::DroppedOldest => {
                warn!("outbound queue full; dropped oldest frame");
            }
            PushOutcome::Rejected => {
                warn!("outbound queue full; new frame dropped");
            }
        }
    }

    /// Wrap `data` in the outbound envelope addressed to the host and queue
    /// it.
    ///
    /// Only serialization can fail; queueing follows the same
    /// never-blocks-never-throws contract as [`Session::send_message`].
    pub fn send_data<T: Serialize>(&self, data: &T) -> Result<()> {
        let frame = protocol::frame(&self.inner.config.host_identifier, data)?;
        self.send_message(frame);
        Ok(())
    }

    /// Whether the session is live: started and not shutting down.
    #[must_use]
    pub fn running(&self) -> bool {
        self.inner.state.lock().phase.is_running()
    }

    /// Point-in-time snapshot of the session.
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.status()
    }
}

impl Inner {
    pub(crate) fn status(&self) -> Status {
        let (phase, retry_count, max_retries_reached) = {
            let state = self.state.lock();
            (state.phase, state.retry_count, state.max_retries_reached)
        };
        let (event_worker_alive, send_worker_alive) = {
            let workers = self.workers.lock();
            workers.as_ref().map_or((false, false), |w| {
                (!w.event_loop.is_finished(), !w.send_worker.is_finished())
            })
        };

        Status {
            connected: phase.is_connected(),
            started: !matches!(phase, Phase::Idle | Phase::Stopped),
            stopping: phase == Phase::Stopping,
            retry_count,
            max_retries_reached,
            queue_size: self.queue.len(),
            event_worker_alive,
            send_worker_alive,
        }
    }
}

async fn join_with_grace(name: &str, mut worker: JoinHandle<()>, grace: Duration) {
    match timeout(grace, &mut worker).await {
        Ok(Ok(())) => debug!(worker = name, "worker joined"),
        Ok(Err(e)) => warn!(worker = name, error = %e, "worker terminated abnormally"),
        Err(_) => {
            worker.abort();
            warn!(worker = name, grace = ?grace, "worker exceeded shutdown grace; aborted");
        }
    }
}
