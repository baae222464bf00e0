use std::sync::Arc;

use agora_db::Database;
use agora_types::events::{GatewayCommand, GatewayEvent, SendDirectMessage, TypingRelay, TypingSignal};
use agora_types::models::DirectMessage;
use agora_types::{AgoraError, AgoraResult, UserId};
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;
use crate::session::{ConnectionSession, message_group};

/// Decode one inbound text frame. Malformed frames are the caller's to drop.
pub fn parse_frame(text: &str) -> Result<GatewayCommand, serde_json::Error> {
    serde_json::from_str(text)
}

/// A recipient is acceptable when present, positive, and not the sender.
pub fn accept_recipient(sender: UserId, recipient: Option<UserId>) -> Option<UserId> {
    recipient.filter(|&id| id > 0 && id != sender)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Persists direct messages and relays them, plus typing signals, to the
/// participants' message groups.
#[derive(Clone)]
pub struct MessageRelay {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl MessageRelay {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Store then emit one `dm:message` to both parties' groups, so every
    /// connection of either user gets the same payload exactly once.
    /// Returns `Ok(None)` when the request is ignored (bad or self recipient).
    pub async fn send(
        &self,
        session: &ConnectionSession,
        request: SendDirectMessage,
    ) -> AgoraResult<Option<DirectMessage>> {
        let sender = session.user_id;
        let Some(recipient) = accept_recipient(sender, request.recipient_user_id) else {
            debug!("{} ({}) dm:send ignored, bad recipient", session.label(), sender);
            return Ok(None);
        };

        let body = non_blank(request.body);
        let image_url = non_blank(request.image_url);
        if body.is_none() && image_url.is_none() {
            return Err(AgoraError::validation("message body or image is required"));
        }

        let message = self
            .db
            .call(move |db| {
                db.create_direct_message(sender, recipient, body.as_deref(), image_url.as_deref())
            })
            .await?;

        let groups = [message_group(sender), message_group(recipient)];
        let delivered = self
            .dispatcher
            .multicast(&groups, &GatewayEvent::DirectMessage(message.clone()));
        debug!(
            "dm {} from {} to {} delivered to {} connections",
            message.id, sender, recipient, delivered
        );
        Ok(Some(message))
    }

    /// Relay a typing signal to the recipient's connections only. Nothing is stored.
    pub fn typing(&self, session: &ConnectionSession, signal: TypingSignal) -> bool {
        let Some(recipient) = accept_recipient(session.user_id, signal.recipient_user_id) else {
            return false;
        };
        let event = GatewayEvent::Typing(TypingRelay {
            sender_user_id: session.user_id,
            is_typing: signal.is_typing,
        });
        self.dispatcher.multicast(&[message_group(recipient)], &event);
        true
    }

    /// Route one decoded command from a joined connection.
    pub async fn handle(&self, session: &ConnectionSession, command: GatewayCommand) {
        match command {
            GatewayCommand::Identify { .. } => {
                debug!("{} ({}) sent identify after joining", session.label(), session.user_id);
            }
            GatewayCommand::SendDirectMessage(request) => {
                if let Err(e) = self.send(session, request).await {
                    warn!("{} ({}) dm:send rejected: {}", session.label(), session.user_id, e);
                }
            }
            GatewayCommand::Typing(signal) => {
                self.typing(session, signal);
            }
        }
    }
}
