//! Presence snapshots. Always the full online set, never a delta, so clients
//! can apply whichever snapshot arrives last.

use std::sync::PoisonError;

use agora_types::events::{GatewayEvent, PresenceSnapshot};
use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::registry::ConnectionRegistry;

pub fn snapshot(registry: &ConnectionRegistry) -> PresenceSnapshot {
    PresenceSnapshot {
        online_user_ids: registry.online_user_ids(),
    }
}

impl Dispatcher {
    /// Push the current online set to every connected peer as one event.
    pub fn broadcast_presence(&self) {
        // Snapshot and send under one lock so concurrent changes cannot deliver
        // an older snapshot after a newer one.
        let _guard = self.presence_lock().lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshot(self.registry());
        let online = snapshot.online_user_ids.len();
        let reached = self.broadcast(&GatewayEvent::PresenceUpdate(snapshot));
        debug!("presence: {} online, pushed to {} connection(s)", online, reached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::drain;

    fn presence(ids: &[i64]) -> GatewayEvent {
        GatewayEvent::PresenceUpdate(PresenceSnapshot { online_user_ids: ids.to_vec() })
    }

    #[test]
    fn every_registry_change_pushes_a_full_snapshot() {
        let dispatcher = Dispatcher::new();
        let (observer, mut observer_rx) = dispatcher.attach();
        dispatcher.user_online(1, observer);

        let (phone, _phone_rx) = dispatcher.attach();
        let (laptop, _laptop_rx) = dispatcher.attach();
        dispatcher.user_online(2, phone);
        dispatcher.user_online(2, laptop);

        dispatcher.user_offline(2, phone);
        assert!(dispatcher.registry().is_online(2));

        dispatcher.user_offline(2, laptop);
        assert!(!dispatcher.registry().is_online(2));

        assert_eq!(
            drain(&mut observer_rx),
            vec![
                presence(&[1]),
                presence(&[1, 2]),
                presence(&[1, 2]),
                presence(&[1, 2]),
                presence(&[1]),
            ]
        );
    }

    #[test]
    fn repeated_offline_does_not_broadcast() {
        let dispatcher = Dispatcher::new();
        let (observer, mut rx) = dispatcher.attach();
        let (conn, _conn_rx) = dispatcher.attach();
        dispatcher.user_online(5, conn);
        dispatcher.user_offline(5, conn);
        dispatcher.user_offline(5, conn);

        assert_eq!(drain(&mut rx), vec![presence(&[5]), presence(&[])]);
        dispatcher.detach(observer);
    }
}
