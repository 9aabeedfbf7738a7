/// OneBot v11 frame codec
use crate::error::{BridgeError, Result};
use crate::types::{ChatInfo, ChatType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic attribute map of one decoded inbound frame
pub type Attributes = Map<String, Value>;

/// `post_type` value of chat message events
pub const POST_TYPE_MESSAGE: &str = "message";

pub const ACTION_SEND_GROUP_MSG: &str = "send_group_msg";
pub const ACTION_SEND_PRIVATE_MSG: &str = "send_private_msg";
pub const ACTION_GET_FRIEND_LIST: &str = "get_friend_list";
pub const ACTION_GET_GROUP_LIST: &str = "get_group_list";

/// Outbound action frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFrame {
    pub action: String,
    pub params: Value,
    pub echo: String,
}

impl ActionFrame {
    pub fn new(action: &str, params: Value, echo: &str) -> Self {
        let params = if params.is_null() {
            Value::Object(Map::new())
        } else {
            params
        };
        Self {
            action: action.to_string(),
            params,
            echo: echo.to_string(),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Encode an action into a wire frame
pub fn encode(action: &str, params: Value, token: &str) -> Result<Vec<u8>> {
    ActionFrame::new(action, params, token).to_bytes()
}

/// Decode an inbound frame into its attribute map
pub fn decode(bytes: &[u8]) -> Result<Attributes> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BridgeError::MalformedFrame(format!(
            "expected JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(BridgeError::MalformedFrame(e.to_string())),
    }
}

/// Routing decision for one decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind<'a> {
    /// Response correlated by a non-empty `echo`
    Response(&'a str),
    /// Unsolicited event with its `post_type`
    Event(&'a str),
    /// Neither; dropped
    Other,
}

pub fn classify(attrs: &Attributes) -> FrameKind<'_> {
    if let Some(echo) = attrs.get("echo").and_then(Value::as_str) {
        if !echo.is_empty() {
            return FrameKind::Response(echo);
        }
    }
    match attrs.get("post_type").and_then(Value::as_str) {
        Some(post_type) => FrameKind::Event(post_type),
        None => FrameKind::Other,
    }
}

/// Render a numeric or string id as a decimal string
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                // only whole floats inside the i64 range name a real id
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| (f as i64).to_string())
            }
        }
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Params of a send-message action
pub fn send_message_params(chat_id: &str, chat_type: ChatType, text: &str) -> Result<(&'static str, Value)> {
    let id: i64 = chat_id
        .parse()
        .map_err(|_| BridgeError::InvalidChatId(chat_id.to_string()))?;
    Ok(match chat_type {
        ChatType::Group => (
            ACTION_SEND_GROUP_MSG,
            serde_json::json!({ "group_id": id, "message": text }),
        ),
        ChatType::Private => (
            ACTION_SEND_PRIVATE_MSG,
            serde_json::json!({ "user_id": id, "message": text }),
        ),
    })
}

/// Fail if the backend reported the action as failed
pub fn check_status(action: &str, response: &Value) -> Result<()> {
    if response.get("status").and_then(Value::as_str) == Some("failed") {
        let retcode = response.get("retcode").and_then(Value::as_i64).unwrap_or(-1);
        return Err(BridgeError::ActionFailed {
            action: action.to_string(),
            retcode,
        });
    }
    Ok(())
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct FriendEntry {
    user_id: Value,
    #[serde(default)]
    nickname: String,
}

#[derive(Deserialize)]
struct GroupEntry {
    group_id: Value,
    #[serde(default)]
    group_name: String,
}

/// Parse a `get_friend_list` response
pub fn parse_friend_list(response: Value) -> Result<Vec<ChatInfo>> {
    check_status(ACTION_GET_FRIEND_LIST, &response)?;
    let resp: ListResponse<FriendEntry> = serde_json::from_value(response)?;
    Ok(resp
        .data
        .into_iter()
        .filter_map(|f| {
            id_string(&f.user_id).map(|id| ChatInfo {
                id,
                name: f.nickname,
                chat_type: ChatType::Private,
                latest_preview: None,
            })
        })
        .collect())
}

/// Parse a `get_group_list` response
pub fn parse_group_list(response: Value) -> Result<Vec<ChatInfo>> {
    check_status(ACTION_GET_GROUP_LIST, &response)?;
    let resp: ListResponse<GroupEntry> = serde_json::from_value(response)?;
    Ok(resp
        .data
        .into_iter()
        .filter_map(|g| {
            id_string(&g.group_id).map(|id| ChatInfo {
                id,
                name: g.group_name,
                chat_type: ChatType::Group,
                latest_preview: None,
            })
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_shape() {
        let bytes = encode("get_friend_list", Value::Null, "req_1").unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({ "action": "get_friend_list", "params": {}, "echo": "req_1" })
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode(b"{not json"),
            Err(BridgeError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode(b"[1,2,3]"),
            Err(BridgeError::MalformedFrame(_))
        ));
        assert!(matches!(decode(&[0xff, 0xfe]), Err(BridgeError::MalformedFrame(_))));
    }

    #[test]
    fn test_classify() {
        let resp = decode(br#"{"status":"ok","echo":"req_7","data":[]}"#).unwrap();
        assert_eq!(classify(&resp), FrameKind::Response("req_7"));

        let event = decode(br#"{"post_type":"message","echo":""}"#).unwrap();
        assert_eq!(classify(&event), FrameKind::Event("message"));

        let meta = decode(br#"{"post_type":"meta_event"}"#).unwrap();
        assert_eq!(classify(&meta), FrameKind::Event("meta_event"));

        let bare = decode(br#"{"status":"ok"}"#).unwrap();
        assert_eq!(classify(&bare), FrameKind::Other);
    }

    #[test]
    fn test_id_string_variants() {
        assert_eq!(id_string(&json!(123)), Some("123".to_string()));
        assert_eq!(id_string(&json!(456.0)), Some("456".to_string()));
        assert_eq!(id_string(&json!("789")), Some("789".to_string()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!(1.5)), None);
        assert_eq!(id_string(&json!(1e300)), None);
        assert_eq!(id_string(&json!(-3.0)), Some("-3".to_string()));
        assert_eq!(id_string(&Value::Null), None);
    }

    #[test]
    fn test_send_message_params() {
        let (action, params) = send_message_params("789", ChatType::Group, "hello").unwrap();
        assert_eq!(action, "send_group_msg");
        assert_eq!(params, json!({ "group_id": 789, "message": "hello" }));

        let (action, params) = send_message_params("123", ChatType::Private, "hi").unwrap();
        assert_eq!(action, "send_private_msg");
        assert_eq!(params, json!({ "user_id": 123, "message": "hi" }));

        assert!(matches!(
            send_message_params("abc", ChatType::Group, "x"),
            Err(BridgeError::InvalidChatId(_))
        ));
    }

    #[test]
    fn test_parse_lists() {
        let friends = parse_friend_list(json!({
            "status": "ok",
            "data": [{ "user_id": 10001, "nickname": "Bob" }],
            "echo": "req_1"
        }))
        .unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, "10001");
        assert_eq!(friends[0].chat_type, ChatType::Private);

        let groups = parse_group_list(json!({
            "data": [{ "group_id": 456, "group_name": "Rustaceans" }]
        }))
        .unwrap();
        assert_eq!(groups[0].name, "Rustaceans");
        assert_eq!(groups[0].chat_type, ChatType::Group);
    }

    #[test]
    fn test_failed_status_surfaces() {
        let err = parse_group_list(json!({ "status": "failed", "retcode": 1404, "data": null }))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ActionFailed { retcode: 1404, .. }));
    }
}
