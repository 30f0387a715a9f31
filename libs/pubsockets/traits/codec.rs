use crate::core::message::{ClientMessage, CorrelationId, Method, ServerError, ServerMessage};
use crate::traits::error::{PubSubError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Trait for converting between frames and structured messages
pub trait MessageCodec: Send + Sync {
    /// Decode one frame into zero or more server messages
    ///
    /// Malformed frames are reported as `PubSubError::Codec`.
    fn parse(&self, frame: &str) -> Result<Vec<ServerMessage>>;

    /// Encode a client request into a frame
    fn serialize(&self, message: &ClientMessage) -> Result<String>;
}

/// JSON codec
///
/// A frame holds either a single message object or an array of them.
///
/// ```text
/// → {"uid":"2","method":"subscribe","params":{"channel":"news"}}
/// ← [{"uid":"2","method":"subscribe","body":{"channel":"news"}}]
/// ← {"method":"message","body":{"channel":"news","data":{"text":"hi"}}}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Debug, Deserialize)]
struct WireServerMessage {
    #[serde(default)]
    uid: Option<Value>,
    method: String,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireClientMessage<'a> {
    uid: &'a CorrelationId,
    method: &'static str,
    #[serde(skip_serializing_if = "params_empty")]
    params: &'a Map<String, Value>,
}

fn params_empty(params: &&Map<String, Value>) -> bool {
    params.is_empty()
}

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode(value: Value) -> Result<ServerMessage> {
        let wire: WireServerMessage = serde_json::from_value(value)
            .map_err(|e| PubSubError::Codec(format!("invalid message: {}", e)))?;

        let correlation_id = match wire.uid {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(CorrelationId::new(s)),
            Some(Value::Number(n)) => Some(CorrelationId::new(n.to_string())),
            Some(other) => {
                return Err(PubSubError::Codec(format!("invalid uid: {}", other)));
            }
        };

        let method = Method::from_wire(&wire.method, correlation_id.is_some());

        let body = match wire.body {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(PubSubError::Codec(format!(
                    "body of '{}' is not an object: {}",
                    wire.method, other
                )));
            }
        };

        let error = match wire.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(ServerError::new(s)),
            Some(Value::Object(map)) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                Some(ServerError {
                    code: map.get("code").and_then(Value::as_i64),
                    message,
                })
            }
            Some(other) => Some(ServerError::new(other.to_string())),
        };

        Ok(ServerMessage {
            correlation_id,
            method,
            body,
            error,
        })
    }
}

impl MessageCodec for JsonCodec {
    fn parse(&self, frame: &str) -> Result<Vec<ServerMessage>> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| PubSubError::Codec(format!("invalid JSON frame: {}", e)))?;

        match value {
            Value::Array(items) => items.into_iter().map(Self::decode).collect(),
            obj @ Value::Object(_) => Ok(vec![Self::decode(obj)?]),
            other => Err(PubSubError::Codec(format!(
                "frame must be an object or array, got {}",
                other
            ))),
        }
    }

    fn serialize(&self, message: &ClientMessage) -> Result<String> {
        let wire = WireClientMessage {
            uid: &message.correlation_id,
            method: message.method.as_str(),
            params: &message.payload,
        };
        serde_json::to_string(&wire).map_err(|e| PubSubError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::ClientMethod;
    use serde_json::json;

    #[test]
    fn test_parse_batch_of_replies_and_pushes() {
        let frame = r#"[
            {"uid":"2","method":"subscribe","body":{"channel":"news"},"error":null},
            {"method":"message","body":{"channel":"news","data":{"text":"hi"}}}
        ]"#;

        let batch = JsonCodec.parse(frame).unwrap();
        assert_eq!(batch.len(), 2);

        assert_eq!(batch[0].correlation_id, Some(CorrelationId::from(2)));
        assert_eq!(batch[0].method, Method::SubscribeResponse);
        assert!(batch[0].error.is_none());

        assert_eq!(batch[1].correlation_id, None);
        assert_eq!(batch[1].method, Method::Message);
        assert_eq!(batch[1].channel(), Some("news"));
    }

    #[test]
    fn test_parse_single_object_frame() {
        let batch = JsonCodec
            .parse(r#"{"method":"unsubscribe","body":{"channel":"news"}}"#)
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].method, Method::Unsubscribe);
    }

    #[test]
    fn test_parse_numeric_uid_and_error_forms() {
        let batch = JsonCodec
            .parse(r#"[{"uid":7,"method":"connect","error":"invalid token"},
                       {"uid":"8","method":"publish","error":{"code":103,"message":"permission denied"}},
                       {"uid":"9","method":"ping","error":""}]"#)
            .unwrap();

        assert_eq!(batch[0].correlation_id, Some(CorrelationId::from(7)));
        assert_eq!(batch[0].error, Some(ServerError::new("invalid token")));
        assert_eq!(
            batch[1].error,
            Some(ServerError::with_code(103, "permission denied"))
        );
        assert!(batch[2].error.is_none());
    }

    #[test]
    fn test_parse_empty_batch() {
        assert!(JsonCodec.parse("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(matches!(JsonCodec.parse("not json"), Err(PubSubError::Codec(_))));
        assert!(matches!(JsonCodec.parse("42"), Err(PubSubError::Codec(_))));
        assert!(matches!(
            JsonCodec.parse(r#"{"uid":"1"}"#),
            Err(PubSubError::Codec(_))
        ));
        assert!(matches!(
            JsonCodec.parse(r#"{"method":"message","body":[1,2]}"#),
            Err(PubSubError::Codec(_))
        ));
    }

    #[test]
    fn test_serialize_request() {
        let mut payload = Map::new();
        payload.insert("channel".to_string(), json!("news"));
        let message = ClientMessage {
            correlation_id: CorrelationId::from(3),
            method: ClientMethod::Unsubscribe,
            payload,
        };

        let frame = JsonCodec.serialize(&message).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"uid":"3","method":"unsubscribe","params":{"channel":"news"}})
        );
    }

    #[test]
    fn test_serialize_omits_empty_params() {
        let message = ClientMessage {
            correlation_id: CorrelationId::from(4),
            method: ClientMethod::Ping,
            payload: Map::new(),
        };
        let value: Value = serde_json::from_str(&JsonCodec.serialize(&message).unwrap()).unwrap();
        assert_eq!(value, json!({"uid":"4","method":"ping"}));
    }
}
