//! Wire message shapes for the protocol-buffer-shaped RPC surface.
//!
//! Two logical services share one `axum` router and MessagePack encoding:
//! `MasterService` (`GetNextInstance`, `RegisterMOMInstance`) and
//! `MessageService` (`SendMessage`, `ReceiveMessage`, `CreateTopic`).
//! Status strings are exactly `Success`, `Empty`, or `Error`, serialized via
//! `serde`'s string representation of `Status` rather than free-form text.

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// The exact status vocabulary of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Empty,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNextInstanceResponse {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMomInstanceRequest {
    pub node_name: String,
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMomInstanceResponse {
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub topic: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveMessageRequest {
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveMessageResponse {
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub topic_name: String,
    pub partitions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicResponse {
    pub status: Status,
    pub message: String,
}

/// Maps a `BrokerError` onto the `{status, message}` wire shape.
#[must_use]
pub fn error_response(err: &BrokerError) -> (Status, String) {
    (Status::Error, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_to_wire_format_strings() {
        assert_eq!(serde_json::to_string(&Status::Success).unwrap(), "\"Success\"");
        assert_eq!(serde_json::to_string(&Status::Empty).unwrap(), "\"Empty\"");
        assert_eq!(serde_json::to_string(&Status::Error).unwrap(), "\"Error\"");
    }

    #[test]
    fn error_response_always_uses_error_status() {
        let (status, message) = error_response(&BrokerError::NoInstances);
        assert_eq!(status, Status::Error);
        assert!(message.contains("no instances"));
    }
}
