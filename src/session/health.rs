//! Health checker: periodic liveness and queue-pressure audit.
//!
//! Purely observational. It raises alerts but never tears down the
//! transport; reconnect policy stays single-sourced in the supervisor.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::Inner;

pub(super) async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.tuning.health_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Swallow the immediate first tick so audits start one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let (phase, last_message_at) = {
            let state = inner.state.lock();
            (state.phase, state.last_message_at)
        };
        if phase.is_shutdown() {
            break;
        }

        let queue_len = inner.queue.len();
        if phase.is_connected() {
            if queue_len > inner.tuning.queue_pressure_threshold() {
                error!(
                    queue_len,
                    capacity = inner.tuning.queue_capacity,
                    "outbound queue under pressure"
                );
            }
            if let Some(last) = last_message_at {
                let idle = last.elapsed();
                if idle > inner.tuning.health_interval {
                    warn!(idle = ?idle, "no inbound frames for a full audit period");
                }
            }
        }

        let status = inner.status();
        info!(
            phase = %phase,
            connected = status.connected,
            queue_size = status.queue_size,
            retry_count = status.retry_count,
            max_retries_reached = status.max_retries_reached,
            "session health audit"
        );
    }

    debug!("health checker exited");
}
