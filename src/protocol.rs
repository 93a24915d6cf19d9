//! Wire-level frame shapes and keepalive detection.
//!
//! Every outbound frame is a UTF-8 JSON envelope of the form
//! `{"receiver_id": "<id>", "data": <object>}`. Inbound keepalive pings are
//! recognised by a case-sensitive substring match, which tolerates whatever
//! JSON the server wraps around the marker.

use serde::Serialize;

use crate::Result;
use crate::state::Status;

/// Literal marker identifying an inbound keepalive ping.
pub const PING_MATCH_SUBSTRING: &str = r#""operation":"ping""#;

/// Outbound envelope addressed to a single receiver.
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    receiver_id: &'a str,
    data: T,
}

#[derive(Debug, Serialize)]
struct PongData {
    operation: &'static str,
}

#[derive(Debug, Serialize)]
struct MonitorData<'a> {
    status: &'a Status,
    config: MonitorConfig<'a>,
}

#[derive(Debug, Serialize)]
struct MonitorConfig<'a> {
    tipo_operacao: &'static str,
    gpa_code: &'a str,
}

/// Whether `payload` is a keepalive ping.
#[must_use]
pub fn is_ping(payload: &str) -> bool {
    payload.contains(PING_MATCH_SUBSTRING)
}

/// Serialize an arbitrary payload into the outbound envelope.
pub fn frame<T: Serialize>(receiver_id: &str, data: &T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope { receiver_id, data })?)
}

/// The keepalive reply addressed to the host.
pub fn pong_frame(host_identifier: &str) -> Result<String> {
    frame(host_identifier, &PongData { operation: "pong" })
}

/// The status report that accompanies a pong when monitoring is enabled.
pub fn monitor_frame(
    monitor_identifier: &str,
    client_identifier: &str,
    status: &Status,
) -> Result<String> {
    frame(
        monitor_identifier,
        &MonitorData {
            status,
            config: MonitorConfig {
                tipo_operacao: "monitor",
                gpa_code: client_identifier,
            },
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn detects_ping_inside_any_payload() {
        assert!(is_ping(r#"{"operation":"ping"}"#));
        assert!(is_ping(r#"{"meta":1,"operation":"ping","x":2}"#));
    }

    #[test]
    fn ping_match_is_exact_and_case_sensitive() {
        assert!(!is_ping(r#"{"operation": "ping"}"#));
        assert!(!is_ping(r#"{"OPERATION":"PING"}"#));
        assert!(!is_ping(r#"{"operation":"pong"}"#));
    }

    #[test]
    fn envelope_puts_receiver_id_first() {
        let frame = frame("h-1", &json!({"x": 1})).unwrap();

        assert!(frame.starts_with(r#"{"receiver_id":"h-1""#));
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["data"]["x"], 1);
    }

    #[test]
    fn pong_frame_targets_the_host() {
        let frame = pong_frame("h-1").unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(parsed["receiver_id"], "h-1");
        assert_eq!(parsed["data"]["operation"], "pong");
    }

    #[test]
    fn monitor_frame_embeds_status_and_client_code() {
        let status = Status {
            connected: true,
            started: true,
            stopping: false,
            retry_count: 2,
            max_retries_reached: false,
            queue_size: 7,
            event_worker_alive: true,
            send_worker_alive: true,
        };
        let frame = monitor_frame("mon", "c-1", &status).unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(parsed["receiver_id"], "mon");
        assert_eq!(parsed["data"]["config"]["tipo_operacao"], "monitor");
        assert_eq!(parsed["data"]["config"]["gpa_code"], "c-1");
        assert_eq!(parsed["data"]["status"]["connected"], true);
        assert_eq!(parsed["data"]["status"]["queue_size"], 7);
        assert_eq!(parsed["data"]["status"]["retry_count"], 2);
    }
}
