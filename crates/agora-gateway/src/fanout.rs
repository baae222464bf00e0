use std::sync::Arc;

use agora_db::Database;
use agora_types::events::GatewayEvent;
use agora_types::models::{Notification, NotificationKind};
use agora_types::{AgoraError, AgoraResult, UserId};
use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::session::notification_group;

/// Turns reply and like actions into stored notifications for the thread
/// author, pushed live to the author's notification group.
#[derive(Clone)]
pub struct NotificationFanout {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl NotificationFanout {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub async fn notify_reply(&self, thread_id: i64, actor: UserId) -> AgoraResult<Option<Notification>> {
        self.notify(thread_id, actor, NotificationKind::ReplyOnThread).await
    }

    pub async fn notify_like(&self, thread_id: i64, actor: UserId) -> AgoraResult<Option<Notification>> {
        self.notify(thread_id, actor, NotificationKind::LikeOnThread).await
    }

    /// Nothing is stored or emitted when the actor is the author.
    async fn notify(
        &self,
        thread_id: i64,
        actor: UserId,
        kind: NotificationKind,
    ) -> AgoraResult<Option<Notification>> {
        let notification = self
            .db
            .call(move |db| {
                let author = db
                    .get_thread_author(thread_id)?
                    .ok_or_else(|| AgoraError::not_found("thread"))?;
                if author == actor {
                    return Ok(None);
                }
                db.create_notification(author, actor, thread_id, kind).map(Some)
            })
            .await?;

        let Some(notification) = notification else {
            return Ok(None);
        };

        let delivered = self.dispatcher.multicast(
            &[notification_group(notification.user_id)],
            &GatewayEvent::NotificationNew(notification.clone()),
        );
        debug!(
            "{} notification {} for user {} delivered to {} connections",
            kind, notification.id, notification.user_id, delivered
        );
        Ok(Some(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::drain;
    use crate::session::JoinedSession;
    use crate::testing;

    #[tokio::test]
    async fn reply_notifies_connected_author() {
        let db = testing::db();
        let dispatcher = Dispatcher::new();
        let fanout = NotificationFanout::new(db.clone(), dispatcher.clone());
        let author = testing::user(&db, "idp_author", "Author");
        let replier = testing::user(&db, "idp_replier", "Replier");
        let thread = testing::thread(&db, author.id, "Hello there");

        let (_joined, mut author_rx) = JoinedSession::join(&dispatcher, &author);
        let (_other, mut replier_rx) = JoinedSession::join(&dispatcher, &replier);
        drain(&mut author_rx);
        drain(&mut replier_rx);

        let created = fanout.notify_reply(thread, replier.id).await.unwrap().unwrap();
        assert_eq!(created.kind, NotificationKind::ReplyOnThread);
        assert_eq!(created.actor.display_name.as_deref(), Some("Replier"));
        assert_eq!(created.thread.title, "Hello there");

        assert_eq!(drain(&mut author_rx), vec![GatewayEvent::NotificationNew(created.clone())]);
        assert!(drain(&mut replier_rx).is_empty());
        assert_eq!(db.list_notifications(author.id, true).unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn offline_author_still_gets_stored_notification() {
        let db = testing::db();
        let fanout = NotificationFanout::new(db.clone(), Dispatcher::new());
        let author = testing::user(&db, "idp_author", "Author");
        let liker = testing::user(&db, "idp_liker", "Liker");
        let thread = testing::thread(&db, author.id, "Liked thread");

        let created = fanout.notify_like(thread, liker.id).await.unwrap().unwrap();
        assert_eq!(created.kind, NotificationKind::LikeOnThread);
        assert_eq!(db.list_notifications(author.id, false).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn author_acting_on_own_thread_is_silent() {
        let db = testing::db();
        let dispatcher = Dispatcher::new();
        let fanout = NotificationFanout::new(db.clone(), dispatcher.clone());
        let author = testing::user(&db, "idp_author", "Author");
        let thread = testing::thread(&db, author.id, "Talking to myself");
        let (_joined, mut rx) = JoinedSession::join(&dispatcher, &author);
        drain(&mut rx);

        assert!(fanout.notify_reply(thread, author.id).await.unwrap().is_none());
        assert!(drain(&mut rx).is_empty());
        assert!(db.list_notifications(author.id, false).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_thread_is_not_found() {
        let db = testing::db();
        let fanout = NotificationFanout::new(db.clone(), Dispatcher::new());
        let actor = testing::user(&db, "idp_actor", "Actor");
        let err = fanout.notify_like(9_999, actor.id).await.unwrap_err();
        assert!(matches!(err, AgoraError::NotFound(_)));
    }
}
