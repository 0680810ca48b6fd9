//! Wire shapes exchanged with the worker.
//!
//! Every message is one JSON object on one line. Requests carry
//! `id`/`method`/`params`; replies carry `id` plus `result` or `error`;
//! notifications carry `event`/`params` and no `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TransportError, TransportResult};
use crate::id::RequestId;

/// Method names understood by the analysis worker.
pub mod methods {
    pub const SERVER_GET_VERSION: &str = "server.getVersion";
    pub const SERVER_SHUTDOWN: &str = "server.shutdown";
    pub const SEARCH_FIND_ELEMENT_REFERENCES: &str = "search.findElementReferences";
    pub const SEARCH_FIND_MEMBER_DECLARATIONS: &str = "search.findMemberDeclarations";
    pub const SEARCH_FIND_MEMBER_REFERENCES: &str = "search.findMemberReferences";
    pub const SEARCH_FIND_TOP_LEVEL_DECLARATIONS: &str = "search.findTopLevelDeclarations";
    pub const CONTEXT_SET_OPTIONS: &str = "context.setOptions";
    pub const CONTEXT_SET_PRIORITY_SOURCES: &str = "context.setPrioritySources";
}

/// Notification event names.
pub mod events {
    pub const SERVER_CONNECTED: &str = "server.connected";
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(id: &RequestId, method: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Serialize to a single line of JSON (no trailing newline).
    pub fn to_line(&self) -> TransportResult<String> {
        serde_json::to_string(self).map_err(TransportError::SerializeFailed)
    }
}

/// Ids are strings on the wire, but a worker that echoes a bare number is
/// still understood.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(u64),
}

/// Any inbound line: a reply, an error reply, or a notification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let id = Option::<WireId>::deserialize(deserializer)?;
    Ok(id.map(|id| match id {
        WireId::Text(text) => text,
        WireId::Number(number) => number.to_string(),
    }))
}

impl InboundMessage {
    /// Parse one line. `None` when the line is not a JSON object of the
    /// expected shape.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn remote_error(&self) -> Option<RemoteError> {
        self.error.as_ref().map(RemoteError::from_value)
    }

    /// The notification carried by an id-less message, if it names an event.
    pub fn into_notification(self) -> Option<ServerNotification> {
        let event = self.event?;
        Some(ServerNotification {
            event,
            params: self.params.unwrap_or(Value::Null),
        })
    }
}

/// Error object of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
    #[serde(rename = "stackTrace", default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl RemoteError {
    pub const UNKNOWN_CODE: &'static str = "UNKNOWN";

    /// Read an error payload leniently; workers are not consistent about
    /// its shape.
    pub fn from_value(value: &Value) -> Self {
        if let Ok(error) = serde_json::from_value::<RemoteError>(value.clone()) {
            return error;
        }
        let field = |name: &str| value.get(name).and_then(scalar_to_string);
        Self {
            code: field("code").unwrap_or_else(|| Self::UNKNOWN_CODE.to_string()),
            message: field("message")
                .or_else(|| scalar_to_string(value))
                .unwrap_or_else(|| value.to_string()),
            stack_trace: field("stackTrace"),
        }
    }
}

/// Unsolicited message from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNotification {
    pub event: String,
    #[serde(default)]
    pub params: Value,
}

/// String form of a JSON scalar; `None` for null, arrays and objects.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_in_wire_order() {
        let request = RequestEnvelope::new(&RequestId::new(3), methods::SEARCH_FIND_MEMBER_REFERENCES)
            .with_params(json!({ "name": "toString" }));
        assert_eq!(
            request.to_line().unwrap(),
            r#"{"id":"3","method":"search.findMemberReferences","params":{"name":"toString"}}"#
        );
    }

    #[test]
    fn request_without_params_omits_them() {
        let request = RequestEnvelope::new(&RequestId::new(0), methods::SERVER_GET_VERSION);
        assert_eq!(
            request.to_line().unwrap(),
            r#"{"id":"0","method":"server.getVersion"}"#
        );
    }

    #[test]
    fn reply_parses_with_string_or_numeric_id() {
        let reply = InboundMessage::parse(r#"{"id":"0","result":{"version":"1.2.3"}}"#).unwrap();
        assert_eq!(reply.id.as_deref(), Some("0"));
        assert_eq!(reply.result, Some(json!({ "version": "1.2.3" })));

        let numeric = InboundMessage::parse(r#"{"id":7,"result":null}"#).unwrap();
        assert_eq!(numeric.id.as_deref(), Some("7"));
        assert_eq!(numeric.result, None);
    }

    #[test]
    fn non_objects_do_not_parse() {
        assert!(InboundMessage::parse("not json").is_none());
        assert!(InboundMessage::parse("[1,2,3]").is_none());
        assert!(InboundMessage::parse("\"server.connected\"").is_none());
        assert!(InboundMessage::parse(r#"{"event":42}"#).is_none());
    }

    #[test]
    fn notification_has_no_id() {
        let message =
            InboundMessage::parse(r#"{"event":"server.connected","params":{"version":"1.0"}}"#)
                .unwrap();
        assert!(message.id.is_none());
        let notification = message.into_notification().unwrap();
        assert_eq!(notification.event, events::SERVER_CONNECTED);
        assert_eq!(notification.params, json!({ "version": "1.0" }));
    }

    #[test]
    fn remote_error_reads_full_and_partial_shapes() {
        let full = RemoteError::from_value(&json!({
            "code": "INVALID_PARAMETER",
            "message": "offset out of range",
            "stackTrace": "#0 main"
        }));
        assert_eq!(full.code, "INVALID_PARAMETER");
        assert_eq!(full.stack_trace.as_deref(), Some("#0 main"));

        let numeric_code = RemoteError::from_value(&json!({ "code": -32601, "message": "nope" }));
        assert_eq!(numeric_code.code, "-32601");
        assert_eq!(numeric_code.message, "nope");

        let bare = RemoteError::from_value(&json!("boom"));
        assert_eq!(bare.code, RemoteError::UNKNOWN_CODE);
        assert_eq!(bare.message, "boom");
    }
}
