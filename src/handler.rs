//! The seam between the session core and the embedding application.

use async_trait::async_trait;

/// Application-supplied capability driving a session.
///
/// The session calls these methods at well-defined points of its lifecycle;
/// none of them may assume a particular calling context. `handle_message`
/// runs on a detached task, never on the transport's I/O context, so a slow
/// handler cannot stall inbound frames or keepalive replies. A panicking
/// handler is caught and logged; it never affects the connection.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// #[async_trait]
/// impl SessionHandler for Printer {
///     fn last_connected_at(&self) -> String {
///         "never".to_owned()
///     }
///
///     async fn handle_message(&self, payload: String) {
///         println!("inbound: {payload}");
///     }
/// }
/// ```
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Opaque token forwarded as the `last-connected-at` header.
    ///
    /// Re-read on every connection attempt, so the application can serve a
    /// fresh value after reconnects.
    fn last_connected_at(&self) -> String;

    /// Process one inbound frame.
    ///
    /// Frames are dispatched in arrival order; completion order is
    /// unspecified because each invocation runs on its own task.
    async fn handle_message(&self, payload: String);

    /// Invoked exactly once if the session exhausts its retry budget.
    fn max_retries_reached(&self) {}
}
