//! Message protocol definitions
//!
//! Newline-delimited JSON protocol. Every frame is a flat object whose
//! `action` field names its kind; Serde's internally tagged enums map
//! those objects to typed requests and responses.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::ChannelId;

/// Client → Server frame
///
/// `CreateChannel`/`JoinChannel` are only valid as the first frame;
/// `Message` is only valid once the client has joined a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    /// Create a channel and join it
    CreateChannel {
        #[serde(default)]
        channel_name: String,
        #[serde(default)]
        channel_password: String,
        #[serde(default)]
        member_name: String,
    },
    /// Join an existing channel
    JoinChannel {
        #[serde(default)]
        channel_name: String,
        #[serde(default)]
        channel_password: String,
        #[serde(default)]
        member_name: String,
    },
    /// Chat message for the current channel
    Message {
        #[serde(default)]
        message: String,
        /// Client-side stamp; replaced by the server before fan-out
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Any other action value
    #[serde(other)]
    Unknown,
}

/// Server → Client frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Outcome of a create request
    #[serde(rename = "createChannel")]
    CreateChannel { success: bool, message: String },
    /// Outcome of a join request (also sent after an automatic join)
    #[serde(rename = "joinChannel")]
    JoinChannel {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<ChannelId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        member_name: Option<String>,
        message: String,
    },
    /// Handshake-level protocol error
    #[serde(rename = "error")]
    Error { success: bool, message: String },
    /// Chat message fanned out to every channel member
    #[serde(rename = "message")]
    Chat {
        message: String,
        member_name: String,
        timestamp: String,
    },
}

impl ServerMessage {
    /// Successful create response
    pub fn channel_created() -> Self {
        ServerMessage::CreateChannel {
            success: true,
            message: "channel created successfully".to_string(),
        }
    }

    /// Successful join response
    pub fn channel_joined(channel_name: &str, channel_id: ChannelId, member_name: &str) -> Self {
        ServerMessage::JoinChannel {
            success: true,
            channel_name: Some(channel_name.to_string()),
            channel_id: Some(channel_id),
            member_name: Some(member_name.to_string()),
            message: "channel joined successfully".to_string(),
        }
    }
}

/// Convert a handshake failure into the response sent before closing
impl From<&AppError> for ServerMessage {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::ChannelExists(_) => ServerMessage::CreateChannel {
                success: false,
                message: "channel already exists".to_string(),
            },
            AppError::MissingFields => ServerMessage::CreateChannel {
                success: false,
                message: "channelName and memberName are required".to_string(),
            },
            AppError::ChannelNotFound(name) => ServerMessage::JoinChannel {
                success: false,
                channel_name: Some(name.clone()),
                channel_id: None,
                member_name: None,
                message: "channel does not exist".to_string(),
            },
            AppError::WrongPassword(name) => ServerMessage::JoinChannel {
                success: false,
                channel_name: Some(name.clone()),
                channel_id: None,
                member_name: None,
                message: "channel password is incorrect".to_string(),
            },
            AppError::MissingName => ServerMessage::JoinChannel {
                success: false,
                channel_name: None,
                channel_id: None,
                member_name: None,
                message: "memberName is required".to_string(),
            },
            AppError::UnknownAction => ServerMessage::Error {
                success: false,
                message: "Unknown action".to_string(),
            },
            // Transport-level errors close the connection without a response
            _ => ServerMessage::Error {
                success: false,
                message: "Internal error".to_string(),
            },
        }
    }
}

/// Why an inbound frame could not be turned into a `ClientRequest`
#[derive(Debug)]
pub enum DecodeError {
    /// Not valid JSON at all
    Malformed(serde_json::Error),
    /// Valid JSON, but no recognisable `action` or wrongly typed fields
    Unrecognized(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(e) => write!(f, "malformed frame: {}", e),
            DecodeError::Unrecognized(e) => write!(f, "unrecognized frame: {}", e),
        }
    }
}

/// Decode one inbound frame
pub fn decode_request(line: &str) -> Result<ClientRequest, DecodeError> {
    serde_json::from_str::<ClientRequest>(line).map_err(|e| {
        if e.is_data() {
            DecodeError::Unrecognized(e)
        } else {
            DecodeError::Malformed(e)
        }
    })
}

/// Encode one outbound frame (without the trailing newline)
pub fn encode(msg: &ServerMessage) -> Result<String, AppError> {
    Ok(serde_json::to_string(msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_deserialize() {
        let json = r#"{"action":"createChannel","channelName":"general","channelPassword":"pw1","memberName":"alice"}"#;
        match decode_request(json).unwrap() {
            ClientRequest::CreateChannel {
                channel_name,
                channel_password,
                member_name,
            } => {
                assert_eq!(channel_name, "general");
                assert_eq!(channel_password, "pw1");
                assert_eq!(member_name, "alice");
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let json = r#"{"action":"joinChannel","channelName":"general"}"#;
        match decode_request(json).unwrap() {
            ClientRequest::JoinChannel {
                channel_password,
                member_name,
                ..
            } => {
                assert!(channel_password.is_empty());
                assert!(member_name.is_empty());
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_caught() {
        let msg = decode_request(r#"{"action":"dance"}"#).unwrap();
        assert_eq!(msg, ClientRequest::Unknown);
    }

    #[test]
    fn test_missing_action_is_unrecognized() {
        let err = decode_request(r#"{"channelName":"general"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Unrecognized(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = decode_request(r#"{"action":"message","#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_chat_serialize() {
        let msg = ServerMessage::Chat {
            message: "hi".to_string(),
            member_name: "alice_x".to_string(),
            timestamp: "12:00:00".to_string(),
        };
        let json = encode(&msg).unwrap();
        assert!(json.contains("\"action\":\"message\""));
        assert!(json.contains("\"memberName\":\"alice_x\""));
        assert!(json.contains("\"timestamp\":\"12:00:00\""));
        assert!(!json.contains("success"));
    }

    #[test]
    fn test_join_response_serialize() {
        let json = encode(&ServerMessage::channel_joined("general", ChannelId(3), "bob_y")).unwrap();
        assert!(json.contains("\"action\":\"joinChannel\""));
        assert!(json.contains("\"channelId\":3"));
        assert!(json.contains("\"memberName\":\"bob_y\""));
        assert!(json.contains("\"success\":true"));
    }

    #[test]
    fn test_failure_response_omits_absent_fields() {
        let msg = ServerMessage::from(&AppError::MissingName);
        let json = encode(&msg).unwrap();
        assert!(!json.contains("channelId"));
        assert!(!json.contains("channelName"));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn test_unknown_action_response() {
        let json = encode(&ServerMessage::from(&AppError::UnknownAction)).unwrap();
        assert!(json.contains("\"action\":\"error\""));
        assert!(json.contains("\"message\":\"Unknown action\""));
    }

    #[test]
    fn test_encoded_frame_has_no_raw_newline() {
        let msg = ServerMessage::Chat {
            message: "line one\nline two".to_string(),
            member_name: "a".to_string(),
            timestamp: "00:00:00".to_string(),
        };
        assert!(!encode(&msg).unwrap().contains('\n'));
    }
}
