use serde::{Deserialize, Serialize};

use crate::models::{DirectMessage, Notification, UserId};

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Identity resolved; sent to the joining connection only
    #[serde(rename = "ready")]
    Ready(ReadyPayload),

    /// Full set of online users, pushed on every registry change
    #[serde(rename = "presence:update")]
    PresenceUpdate(PresenceSnapshot),

    /// A persisted direct message, hydrated
    #[serde(rename = "dm:message")]
    DirectMessage(DirectMessage),

    /// Ephemeral typing signal relayed to the recipient
    #[serde(rename = "dm:typing")]
    Typing(TypingRelay),

    /// A persisted notification, hydrated
    #[serde(rename = "notification:new")]
    NotificationNew(Notification),
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::PresenceUpdate(_) => "presence:update",
            Self::DirectMessage(_) => "dm:message",
            Self::Typing(_) => "dm:typing",
            Self::NotificationNew(_) => "notification:new",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub online_user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRelay {
    pub sender_user_id: UserId,
    pub is_typing: bool,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate when the token was not supplied on the upgrade request
    #[serde(rename = "identify")]
    Identify { token: String },

    #[serde(rename = "dm:send")]
    SendDirectMessage(SendDirectMessage),

    #[serde(rename = "dm:typing")]
    Typing(TypingSignal),
}

/// Fields are optional on the wire; the relay decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDirectMessage {
    #[serde(default)]
    pub recipient_user_id: Option<UserId>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    #[serde(default)]
    pub recipient_user_id: Option<UserId>,
    #[serde(default)]
    pub is_typing: bool,
}
