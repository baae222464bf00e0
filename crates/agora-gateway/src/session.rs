use agora_types::UserId;
use agora_types::events::{GatewayEvent, ReadyPayload};
use agora_types::models::User;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatcher::{Dispatcher, Frame};

/// Group every connection of `user_id` joins to receive notifications.
pub fn notification_group(user_id: UserId) -> String {
    format!("notifications:user:{}", user_id)
}

/// Group every connection of `user_id` joins to receive direct messages.
pub fn message_group(user_id: UserId) -> String {
    format!("dm:user:{}", user_id)
}

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Authenticating,
    Joined,
    Disconnected,
}

impl SessionPhase {
    /// Disconnected is terminal; any live phase may fail into it.
    pub fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Joined)
                | (Connecting | Authenticating | Joined, Disconnected)
        )
    }

    /// Advance, or stay put if the transition is not allowed.
    pub fn advance(&mut self, next: SessionPhase) -> bool {
        if self.can_advance_to(next) {
            debug!("session phase {:?} -> {:?}", self, next);
            *self = next;
            true
        } else {
            false
        }
    }
}

/// The bound, authenticated state of one live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSession {
    pub conn_id: Uuid,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub notification_group: String,
    pub message_group: String,
}

impl ConnectionSession {
    pub fn new(conn_id: Uuid, user: &User) -> Self {
        Self {
            conn_id,
            user_id: user.id,
            display_name: user.display_name.clone(),
            handle: user.handle.clone(),
            notification_group: notification_group(user.id),
            message_group: message_group(user.id),
        }
    }

    /// Name for log lines.
    pub fn label(&self) -> &str {
        self.handle
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or("anonymous")
    }
}

/// A session that reached `Joined`. Leaving happens exactly once: explicitly
/// through [`JoinedSession::leave`], or on drop if the connection task ends
/// any other way (error, abort, panic). The phase is the guard: only the
/// `Joined -> Disconnected` transition runs cleanup.
pub struct JoinedSession {
    session: ConnectionSession,
    dispatcher: Dispatcher,
    phase: SessionPhase,
}

impl JoinedSession {
    /// Attach the connection, join both groups, queue `ready`, then register
    /// the handle (which pushes presence). Returns the outbound receiver.
    pub fn join(dispatcher: &Dispatcher, user: &User) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (conn_id, rx) = dispatcher.attach();
        let session = ConnectionSession::new(conn_id, user);

        dispatcher.join(conn_id, &session.notification_group);
        dispatcher.join(conn_id, &session.message_group);
        dispatcher.send_to_connection(
            conn_id,
            &GatewayEvent::Ready(ReadyPayload {
                user_id: session.user_id,
                display_name: session.display_name.clone(),
                handle: session.handle.clone(),
            }),
        );
        dispatcher.user_online(session.user_id, conn_id);

        info!("{} ({}) joined [conn={}]", session.label(), session.user_id, conn_id);
        (
            Self {
                session,
                dispatcher: dispatcher.clone(),
                phase: SessionPhase::Joined,
            },
            rx,
        )
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn leave(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if !self.phase.advance(SessionPhase::Disconnected) {
            return;
        }
        // Leave the groups first so the departing connection is not sent its own presence change.
        self.dispatcher.detach(self.session.conn_id);
        self.dispatcher.user_offline(self.session.user_id, self.session.conn_id);
        info!(
            "{} ({}) left [conn={}]",
            self.session.label(),
            self.session.user_id,
            self.session.conn_id
        );
    }
}

impl Drop for JoinedSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use agora_types::events::PresenceSnapshot;
    use chrono::Utc;

    use super::*;
    use crate::dispatcher::tests::drain;

    fn user(id: UserId, name: &str) -> User {
        let now = Utc::now();
        User {
            id,
            external_id: format!("idp_{}", id),
            display_name: Some(name.to_string()),
            handle: None,
            avatar_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn phases_only_move_forward() {
        let mut phase = SessionPhase::Connecting;
        assert!(!phase.advance(SessionPhase::Joined));
        assert!(phase.advance(SessionPhase::Authenticating));
        assert!(phase.advance(SessionPhase::Joined));
        assert!(phase.advance(SessionPhase::Disconnected));
        assert!(!phase.advance(SessionPhase::Authenticating));
        assert_eq!(phase, SessionPhase::Disconnected);
    }

    #[test]
    fn group_names_are_per_user() {
        let session = ConnectionSession::new(Uuid::new_v4(), &user(42, "Ada"));
        assert_eq!(session.notification_group, "notifications:user:42");
        assert_eq!(session.message_group, "dm:user:42");
    }

    #[test]
    fn join_sends_ready_then_presence() {
        let dispatcher = Dispatcher::new();
        let (joined, mut rx) = JoinedSession::join(&dispatcher, &user(3, "Cy"));

        assert_eq!(dispatcher.group_size("dm:user:3"), 1);
        assert_eq!(dispatcher.group_size("notifications:user:3"), 1);

        let events = drain(&mut rx);
        assert!(matches!(&events[0], GatewayEvent::Ready(r) if r.user_id == 3));
        assert_eq!(
            events[1],
            GatewayEvent::PresenceUpdate(PresenceSnapshot { online_user_ids: vec![3] })
        );
        joined.leave();
    }

    #[test]
    fn cleanup_runs_once_on_leave_or_drop() {
        let dispatcher = Dispatcher::new();
        let (observer, mut observer_rx) = dispatcher.attach();

        let (first, _rx1) = JoinedSession::join(&dispatcher, &user(8, "Hal"));
        let (mut second, _rx2) = JoinedSession::join(&dispatcher, &user(8, "Hal"));
        assert_eq!(dispatcher.registry().connection_count(8), 2);
        assert_eq!(second.phase(), SessionPhase::Joined);

        first.leave();
        assert!(dispatcher.registry().is_online(8));

        second.cleanup();
        assert_eq!(second.phase(), SessionPhase::Disconnected);
        assert!(!dispatcher.registry().is_online(8));

        // drop after cleanup is a no-op
        drop(second);
        assert_eq!(dispatcher.group_size("dm:user:8"), 0);

        // join, join, leave, leave: one snapshot each, nothing duplicated
        let snapshots = drain(&mut observer_rx);
        assert_eq!(snapshots.len(), 4);
        assert_eq!(
            snapshots.last(),
            Some(&GatewayEvent::PresenceUpdate(PresenceSnapshot { online_user_ids: vec![] }))
        );
        dispatcher.detach(observer);
    }
}
