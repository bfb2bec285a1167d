//! DAP message envelopes (spec.md §6.1). Grounded on the teacher's
//! `dap::yadap::protocol` request/response/event structs, extended with
//! the reverse-request direction the client core also has to speak.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub seq: i64,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub seq: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A decoded DAP frame, discriminated by its `type` field (spec.md §6.1).
/// Requests and responses are direction-agnostic at the wire level — a
/// reverse request/response uses exactly the same shape, just initiated
/// by the adapter instead of the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(RequestMessage),
    Response(ResponseMessage),
    Event(EventMessage),
}

impl ResponseMessage {
    pub fn success(request_seq: i64, seq: i64, command: impl Into<String>, body: Option<Value>) -> Self {
        ResponseMessage {
            seq,
            request_seq,
            success: true,
            command: command.into(),
            message: None,
            body,
        }
    }

    pub fn failure(request_seq: i64, seq: i64, command: impl Into<String>, message: impl Into<String>) -> Self {
        ResponseMessage {
            seq,
            request_seq,
            success: false,
            command: command.into(),
            message: Some(message.into()),
            body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_tag_discriminates_request_response_and_event_on_the_wire() {
        let req = Message::Request(RequestMessage { seq: 1, command: "next".into(), arguments: Value::Null });
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], "request");
        assert_eq!(v["command"], "next");

        let resp = Message::Response(ResponseMessage::success(1, 2, "next", None));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["type"], "response");
        assert_eq!(v["success"], true);

        let ev = Message::Event(EventMessage { seq: 3, event: "stopped".into(), body: None });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "event");
    }

    #[test]
    fn response_message_omits_absent_optional_fields() {
        let resp = ResponseMessage::success(1, 2, "threads", None);
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("message").is_none());
        assert!(v.get("body").is_none());
    }

    #[test]
    fn failure_response_carries_the_error_message_and_no_body() {
        let resp = ResponseMessage::failure(4, 5, "launch", "adapter exploded");
        assert!(!resp.success);
        assert_eq!(resp.message.as_deref(), Some("adapter exploded"));
        assert!(resp.body.is_none());
    }

    #[test]
    fn a_raw_frame_deserializes_into_the_matching_message_variant() {
        let raw = serde_json::json!({
            "type": "event",
            "seq": 7,
            "event": "thread",
            "body": { "reason": "started", "threadId": 1 }
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        match msg {
            Message::Event(e) => {
                assert_eq!(e.event, "thread");
                assert_eq!(e.body.unwrap()["threadId"], 1);
            }
            _ => panic!("expected an event message"),
        }
    }
}
