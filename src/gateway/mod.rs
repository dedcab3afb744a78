//! §4.E fan-out gateway: per-session bounded outbound queues, a room
//! registry, and a bus-fed broadcaster. Unchanged in scope from the original
//! spec (§REDESIGN carries no changes here).

mod broadcaster;
mod protocol;
mod rooms;
mod session;
mod ws;

pub use protocol::{ChainSummary, ClientFrame, RoomKind, ServerEvent};
pub use rooms::Rooms;
pub use session::{OutboundFrame, SessionQueue};
pub use ws::upgrade;

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::store::DocumentStore;

pub struct GatewayState {
    pub rooms: Arc<Rooms>,
    pub cache: Arc<dyn CacheStore>,
    pub store: Arc<dyn DocumentStore>,
    pub config: Config,
}

impl GatewayState {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn DocumentStore>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            rooms: Arc::new(Rooms::new()),
            cache,
            store,
            config,
        })
    }

    /// Spawns the bus-fed broadcaster loop feeding this instance's local rooms.
    pub fn spawn_broadcaster(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(broadcaster::run(self.cache.clone(), self.rooms.clone()))
    }
}
