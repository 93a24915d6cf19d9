//! Send worker: drains the outbound queue toward the live transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::Inner;
use crate::error::Error;
use crate::queue::QueueItem;

/// How long a single pop may wait. Bounds shutdown latency when the queue
/// stays empty.
const POP_WAIT: Duration = Duration::from_secs(1);
/// Pause before a frame popped while disconnected goes back to the queue.
const PARK_DELAY: Duration = Duration::from_secs(1);

enum Disposition {
    Sent,
    Failed(Error),
    Park(String),
    Quit(Option<String>),
}

pub(super) async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let Some(item) = inner.queue.pop(POP_WAIT).await else {
            if inner.state.lock().phase.is_shutdown() {
                break;
            }
            continue;
        };
        let QueueItem::Frame(frame) = item else {
            debug!("stop sentinel received");
            break;
        };

        let disposition = {
            let state = inner.state.lock();
            if state.phase.is_shutdown() {
                Disposition::Quit(Some(frame))
            } else if state.phase.is_connected() {
                match state.transport.as_ref() {
                    Some(transport) => match transport.send(frame) {
                        Ok(()) => Disposition::Sent,
                        // Deliberately not re-enqueued: a frame the transport
                        // chokes on must not circulate forever.
                        Err(e) => Disposition::Failed(e),
                    },
                    None => Disposition::Park(frame),
                }
            } else {
                Disposition::Park(frame)
            }
        };

        match disposition {
            Disposition::Sent => trace!("frame forwarded to transport"),
            Disposition::Failed(e) => warn!(error = %e, "transport refused frame; dropped"),
            Disposition::Quit(frame) => {
                // Hand the in-flight frame back so the shutdown drain counts it.
                if let Some(frame) = frame {
                    let _ = inner.queue.requeue(frame);
                }
                break;
            }
            Disposition::Park(frame) => {
                tokio::select! {
                    () = tokio::time::sleep(PARK_DELAY) => {}
                    _ = shutdown.changed() => {}
                }
                // Head position keeps delivery in enqueue order across the park.
                if !inner.queue.requeue(frame) {
                    warn!("queue refilled during park; parked frame discarded");
                }
                if inner.state.lock().phase.is_shutdown() {
                    break;
                }
            }
        }
    }

    debug!("send worker exited");
}
