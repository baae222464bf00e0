use std::sync::Arc;

use agora_db::Database;
use agora_gateway::{GatewayContext, IdentityVerifier, NotificationFanout};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub fanout: NotificationFanout,
}

impl AppStateInner {
    /// HTTP handlers share the gateway's store and verifier; the fanout holds
    /// the gateway's dispatcher, so actions taken over HTTP reach live sockets.
    pub fn from_gateway(ctx: &GatewayContext) -> AppState {
        Arc::new(Self {
            db: ctx.db.clone(),
            identity: ctx.identity.clone(),
            fanout: ctx.fanout(),
        })
    }
}
