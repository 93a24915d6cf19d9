//! Event loop: transport lifecycle, reconnection and inbound dispatch.
//!
//! Reconnect policy is single-sourced here. Other workers observe the phase
//! but never tear down or re-open the transport themselves.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use futures::FutureExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::Inner;
use crate::protocol;
use crate::queue::PushOutcome;
use crate::state::Phase;
use crate::transport::{self, TransportEvent};

pub(super) async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff: ExponentialBackoff = (&inner.tuning).into();

    loop {
        if *shutdown.borrow() {
            break;
        }
        {
            let mut state = inner.state.lock();
            if state.phase.is_shutdown() {
                break;
            }
            state.phase = Phase::Connecting;
        }

        // The token is re-read per attempt so the application can refresh it
        // across reconnects.
        let token = inner.handler.last_connected_at();
        debug!(url = %inner.config.url, "opening connection");
        let attempt = transport::connect(
            &inner.config.url,
            &inner.config.client_identifier,
            &token,
            inner.tuning.connection_timeout,
        );

        let outcome = tokio::select! {
            res = attempt => Some(res),
            _ = shutdown.changed() => None,
        };

        match outcome {
            // Stop won the race; the half-open attempt is dropped with the future.
            None => break,
            Some(Err(e)) => {
                warn!(error = %e, "connection attempt failed");
            }
            Some(Ok((handle, events))) => {
                let usable = {
                    let mut state = inner.state.lock();
                    if state.phase.is_shutdown() {
                        handle.close();
                        false
                    } else {
                        state.mark_connected(handle);
                        true
                    }
                };
                if !usable {
                    break;
                }
                backoff.reset();
                info!("connected");

                drive_connection(&inner, events, &mut shutdown).await;
                inner.state.lock().transport = None;
            }
        }

        if !wait_backoff(&inner, &mut backoff, &mut shutdown).await {
            break;
        }
    }

    debug!("event loop exited");
}

/// Consume transport events until the connection dies or a stop arrives.
async fn drive_connection(
    inner: &Arc<Inner>,
    mut events: mpsc::Receiver<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Some(transport) = inner.state.lock().transport.as_ref() {
                    transport.close();
                }
                return;
            }

            event = events.recv() => match event {
                Some(TransportEvent::Open) => debug!("transport open"),
                Some(TransportEvent::Message(payload)) => dispatch_message(inner, payload),
                Some(TransportEvent::Closed { code, reason }) => {
                    warn!(code = ?code, reason = ?reason, "connection closed");
                    return;
                }
                Some(TransportEvent::Error(e)) => {
                    error!(error = %e, "transport error");
                    return;
                }
                None => return,
            }
        }
    }
}

/// Record liveness, answer keepalives, and hand the payload to the user
/// handler on a detached task.
fn dispatch_message(inner: &Arc<Inner>, payload: String) {
    inner.state.lock().record_message();

    if protocol::is_ping(&payload) {
        respond_to_ping(inner);
    }

    let handler = Arc::clone(&inner.handler);
    tokio::spawn(async move {
        if AssertUnwindSafe(handler.handle_message(payload))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("message handler panicked");
        }
    });
}

fn respond_to_ping(inner: &Arc<Inner>) {
    debug!("keepalive ping received");
    match protocol::pong_frame(&inner.config.host_identifier) {
        Ok(frame) => enqueue_reply(inner, frame, "pong"),
        Err(e) => error!(error = %e, "failed to serialize pong frame"),
    }

    if inner.config.monitor_enabled() {
        let status = inner.status();
        match protocol::monitor_frame(
            &inner.config.monitor_identifier,
            &inner.config.client_identifier,
            &status,
        ) {
            Ok(frame) => enqueue_reply(inner, frame, "monitor"),
            Err(e) => error!(error = %e, "failed to serialize monitor frame"),
        }
    }
}

fn enqueue_reply(inner: &Inner, frame: String, kind: &'static str) {
    match inner.queue.push(frame) {
        PushOutcome::Enqueued => {}
        PushOutcome::DroppedOldest => {
            warn!(kind, "outbound queue full; dropped oldest frame to enqueue reply");
        }
        PushOutcome::Rejected => warn!(kind, "outbound queue full; reply frame dropped"),
    }
}

/// Advance the retry budget and wait out the backoff delay.
///
/// Returns `false` when the loop should exit: the session is stopping or the
/// retry budget is exhausted. The wait is interruptible by the stop signal.
async fn wait_backoff(
    inner: &Arc<Inner>,
    backoff: &mut ExponentialBackoff,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let attempt = {
        let mut state = inner.state.lock();
        if state.phase.is_shutdown() {
            return false;
        }
        if state.retry_count >= inner.tuning.retry_limit {
            state.phase = Phase::Stopped;
            state.max_retries_reached = true;
            None
        } else {
            state.phase = Phase::Reconnecting;
            state.retry_count += 1;
            Some(state.retry_count)
        }
    };

    let Some(attempt) = attempt else {
        error!(
            limit = inner.tuning.retry_limit,
            "retry limit reached; session stopped"
        );
        inner.handler.max_retries_reached();
        return false;
    };

    let delay = backoff
        .next_backoff()
        .unwrap_or(inner.tuning.retry_max_delay);
    info!(attempt, delay = ?delay, "waiting before reconnect");

    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}
