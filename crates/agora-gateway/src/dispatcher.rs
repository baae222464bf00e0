use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use agora_types::UserId;
use agora_types::events::GatewayEvent;
use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;

/// An encoded event, ready to be written as a text frame.
pub type Frame = Utf8Bytes;

/// Manages all connected clients, their group memberships, and delivery.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: ConnectionRegistry,

    hub: RwLock<Hub>,

    /// Serializes presence snapshots so the last one delivered is current.
    presence_lock: Mutex<()>,
}

#[derive(Default)]
struct Hub {
    /// conn_id -> outbound channel + the groups it joined
    peers: HashMap<Uuid, Peer>,

    /// group name -> member connections
    groups: HashMap<String, HashSet<Uuid>>,
}

struct Peer {
    tx: mpsc::UnboundedSender<Frame>,
    groups: Vec<String>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry: ConnectionRegistry::new(),
                hub: RwLock::new(Hub::default()),
                presence_lock: Mutex::new(()),
            }),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub(crate) fn presence_lock(&self) -> &Mutex<()> {
        &self.inner.presence_lock
    }

    /// Register a connection's outbound channel. Returns (conn_id, receiver).
    pub fn attach(&self) -> (Uuid, mpsc::UnboundedReceiver<Frame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub_mut().peers.insert(
            conn_id,
            Peer {
                tx,
                groups: Vec::new(),
            },
        );
        (conn_id, rx)
    }

    /// Add a connection to a group. Unknown connections are ignored.
    pub fn join(&self, conn_id: Uuid, group: &str) {
        let mut hub = self.hub_mut();
        let Some(peer) = hub.peers.get_mut(&conn_id) else {
            return;
        };
        if peer.groups.iter().any(|g| g == group) {
            return;
        }
        peer.groups.push(group.to_string());
        hub.groups.entry(group.to_string()).or_default().insert(conn_id);
    }

    /// Drop a connection and every group membership it held.
    pub fn detach(&self, conn_id: Uuid) {
        let mut hub = self.hub_mut();
        let Some(peer) = hub.peers.remove(&conn_id) else {
            return;
        };
        for group in peer.groups {
            if let Some(members) = hub.groups.get_mut(&group) {
                members.remove(&conn_id);
                if members.is_empty() {
                    hub.groups.remove(&group);
                }
            }
        }
    }

    pub fn group_size(&self, group: &str) -> usize {
        self.hub().groups.get(group).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.hub().peers.len()
    }

    /// Send an event to one connection.
    pub fn send_to_connection(&self, conn_id: Uuid, event: &GatewayEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        self.hub()
            .peers
            .get(&conn_id)
            .is_some_and(|peer| peer.tx.send(frame).is_ok())
    }

    /// Deliver one encoded payload to every connection in any of `groups`.
    /// A connection belonging to several of them receives it once.
    /// Returns the number of connections reached.
    pub fn multicast(&self, groups: &[String], event: &GatewayEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let hub = self.hub();
        let targets: HashSet<Uuid> = groups
            .iter()
            .filter_map(|group| hub.groups.get(group))
            .flatten()
            .copied()
            .collect();

        let delivered = targets
            .iter()
            .filter_map(|conn_id| hub.peers.get(conn_id))
            .filter(|peer| peer.tx.send(frame.clone()).is_ok())
            .count();

        debug!("{} -> {:?} reached {} connection(s)", event.name(), groups, delivered);
        delivered
    }

    /// Deliver an event to every connected client.
    pub fn broadcast(&self, event: &GatewayEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        self.hub()
            .peers
            .values()
            .filter(|peer| peer.tx.send(frame.clone()).is_ok())
            .count()
    }

    /// Register a live handle for the user, then push presence to everyone.
    pub fn user_online(&self, user_id: UserId, conn_id: Uuid) {
        if self.registry().add(user_id, conn_id) {
            self.broadcast_presence();
        }
    }

    /// Remove the user's handle, then push presence to everyone.
    pub fn user_offline(&self, user_id: UserId, conn_id: Uuid) {
        if self.registry().remove(user_id, conn_id) {
            self.broadcast_presence();
        }
    }

    fn hub(&self) -> std::sync::RwLockReadGuard<'_, Hub> {
        self.inner.hub.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn hub_mut(&self) -> std::sync::RwLockWriteGuard<'_, Hub> {
        self.inner.hub.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode(event: &GatewayEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            error!("failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}
