use serde::{Deserialize, Serialize};

/// Model string sent with every conversation request.
pub const DEFAULT_MODEL: &str = "text-davinci-002-render";

/// Sentinel payload that marks the end of a conversation stream.
pub const STREAM_DONE_TOKEN: &str = "[DONE]";

// MARK: - Session

/// Session returned by `/api/auth/session`.
///
/// The endpoint replies with an empty object when nobody is signed in, so
/// every field is lenient. An empty `access_token` is the unauthenticated
/// signal and is rejected before any authenticated request goes out.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSession {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires: String,
    #[serde(default)]
    pub user: Option<SessionUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
}

// MARK: - Request Types

/// Caller-supplied input for one conversation exchange.
#[derive(Debug, Clone)]
pub struct ConversationParams {
    pub text: String,
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
}

impl ConversationParams {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: None,
            parent_message_id: None,
        }
    }
}

/// Wire body for `POST /backend-api/conversation`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationBody {
    pub action: String,
    pub model: String,
    pub parent_message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageContent {
    pub content_type: String,
    pub parts: Vec<String>,
}

/// Partial update for `PATCH /backend-api/conversation/{id}`.
///
/// Unset fields are left out of the body so the server keeps their
/// current values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationProperty {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// MARK: - Response Types

/// One decoded unit handed to the conversation callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationResponse {
    pub text: String,
    pub message_id: String,
    pub conversation_id: String,
}

/// Raw payload of one conversation stream frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationEvent {
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub id: String,
    #[serde(default)]
    pub content: Option<EventContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventContent {
    #[serde(default)]
    pub parts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn conversation_body_omits_absent_conversation_id() {
        let body = ConversationBody {
            action: "next".to_string(),
            model: DEFAULT_MODEL.to_string(),
            parent_message_id: "p1".to_string(),
            conversation_id: None,
            messages: vec![ConversationMessage {
                id: "m1".to_string(),
                role: "user".to_string(),
                content: MessageContent {
                    content_type: "text".to_string(),
                    parts: vec!["hello".to_string()],
                },
            }],
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "next",
                "model": "text-davinci-002-render",
                "parent_message_id": "p1",
                "messages": [{
                    "id": "m1",
                    "role": "user",
                    "content": {
                        "content_type": "text",
                        "parts": ["hello"],
                    },
                }],
            })
        );
    }

    #[test]
    fn conversation_property_serializes_partially() {
        let props = ConversationProperty {
            is_visible: Some(false),
            title: None,
        };
        let value = serde_json::to_value(&props).unwrap();
        assert_eq!(value, json!({ "is_visible": false }));
    }

    #[test]
    fn session_tolerates_signed_out_response() {
        let session: ApiSession = serde_json::from_str("{}").unwrap();
        assert!(session.access_token.is_empty());
        assert!(session.user.is_none());
    }

    #[test]
    fn session_deserializes_wire_form() {
        let session: ApiSession = serde_json::from_value(json!({
            "accessToken": "tok",
            "expires": "2024-01-01T00:00:00.000Z",
            "user": { "id": "u1", "name": "Ada", "picture": "https://example.com/a.png" },
        }))
        .unwrap();
        assert_eq!(session.access_token, "tok");
        assert_eq!(session.user.unwrap().name, "Ada");
    }

    #[test]
    fn event_tolerates_missing_message() {
        let event: ConversationEvent =
            serde_json::from_value(json!({ "conversation_id": "c1" })).unwrap();
        assert!(event.message.is_none());
        assert_eq!(event.conversation_id.as_deref(), Some("c1"));
    }
}
