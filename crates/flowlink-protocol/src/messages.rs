use serde::{Deserialize, Serialize};

use crate::constants::JSONRPC_VERSION;
use crate::error::ProtocolError;

/// Identifier correlating a request with its response.
///
/// Requests issued by the client always carry numeric ids. Servers are free
/// to echo any JSON-RPC id, so string ids are accepted on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Text(String),
}

impl RequestId {
    /// The numeric value of this id, if it is numeric.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            RequestId::Number(n) => Some(*n),
            RequestId::Text(_) => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

/// Structured error carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A correlatable call expecting exactly one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: serde_json::Value,
}

/// The answer to a [`Request`], matched by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<serde_json::Value, RpcError>,
}

/// A one-way message. Sent by the client as fire-and-forget, or pushed by
/// the server unsolicited.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: serde_json::Value,
}

/// Any envelope travelling over the socket.
///
/// Discriminated by the presence of `id` and `method`:
/// both present is a request, only `method` is a notification, only `id`
/// is a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Envelope", try_from = "Envelope")]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn request(id: impl Into<RequestId>, method: &str, params: serde_json::Value) -> Self {
        Message::Request(Request {
            id: id.into(),
            method: method.to_string(),
            params,
        })
    }

    pub fn notification(method: &str, params: serde_json::Value) -> Self {
        Message::Notification(Notification {
            method: method.to_string(),
            params,
        })
    }

    pub fn success(id: impl Into<RequestId>, result: serde_json::Value) -> Self {
        Message::Response(Response {
            id: id.into(),
            outcome: Ok(result),
        })
    }

    pub fn error(id: impl Into<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Message::Response(Response {
            id: id.into(),
            outcome: Err(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        })
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary frame holding UTF-8 JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::parse(text)
    }

    /// Encode for a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Message::Request(r) => Some(&r.id),
            Message::Response(r) => Some(&r.id),
            Message::Notification(_) => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }

    /// The message as a JSON value, as forwarded to bus subscribers.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Flat wire representation with every field optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(default = "default_jsonrpc")]
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        let mut envelope = Envelope {
            jsonrpc: default_jsonrpc(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        };
        match message {
            Message::Request(r) => {
                envelope.id = Some(r.id);
                envelope.method = Some(r.method);
                envelope.params = Some(r.params);
            }
            Message::Notification(n) => {
                envelope.method = Some(n.method);
                envelope.params = Some(n.params);
            }
            Message::Response(r) => {
                envelope.id = Some(r.id);
                match r.outcome {
                    // `Some(Null)` still serializes, keeping `"result": null` on the wire.
                    Ok(result) => envelope.result = Some(result),
                    Err(error) => envelope.error = Some(error),
                }
            }
        }
        envelope
    }
}

impl TryFrom<Envelope> for Message {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let params = envelope.params.unwrap_or(serde_json::Value::Null);
        match (envelope.id, envelope.method) {
            (Some(id), Some(method)) => Ok(Message::Request(Request { id, method, params })),
            (None, Some(method)) => Ok(Message::Notification(Notification { method, params })),
            (Some(id), None) => {
                let outcome = match envelope.error {
                    Some(error) => Err(error),
                    None => Ok(envelope.result.unwrap_or(serde_json::Value::Null)),
                };
                Ok(Message::Response(Response { id, outcome }))
            }
            (None, None) => Err(ProtocolError::InvalidMessage(
                "envelope has neither id nor method".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_with_null_result_keeps_result_field() {
        let text = Message::success(7u64, serde_json::Value::Null).to_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.as_object().unwrap().contains_key("result"));
    }

    #[test]
    fn envelope_without_id_or_method_is_rejected() {
        let err = Message::parse(r#"{"jsonrpc":"2.0","params":{}}"#).unwrap_err();
        assert!(err.to_string().contains("neither id nor method"));
    }
}
