//! Realtime gateway: connection registry, presence, direct-message relay
//! and notification fan-out over WebSocket.

pub mod connection;
pub mod dispatcher;
pub mod fanout;
pub mod identity;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use agora_db::Database;

pub use dispatcher::{Dispatcher, Frame};
pub use fanout::NotificationFanout;
pub use identity::{IdentityVerifier, JwtIdentityVerifier, resolve_identity};
pub use relay::MessageRelay;

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    /// Deadline for token delivery plus identity resolution.
    pub identity_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            identity_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Everything a connection task needs, cheap to clone per connection.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub db: Arc<Database>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub relay: MessageRelay,
    pub settings: GatewaySettings,
}

impl GatewayContext {
    pub fn new(db: Arc<Database>, identity: Arc<dyn IdentityVerifier>, settings: GatewaySettings) -> Self {
        let dispatcher = Dispatcher::new();
        Self {
            relay: MessageRelay::new(db.clone(), dispatcher.clone()),
            dispatcher,
            db,
            identity,
            settings,
        }
    }

    pub fn fanout(&self) -> NotificationFanout {
        NotificationFanout::new(self.db.clone(), self.dispatcher.clone())
    }
}
