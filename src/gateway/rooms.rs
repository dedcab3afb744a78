//! Room registry (§4.E): `general`, `product:{P}`, `chain:{P}`. Per-process
//! only — cross-instance fan-out is delegated entirely to the shared bus, so
//! this registry never needs to know about sessions on other instances.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::session::SessionQueue;

pub const GENERAL: &str = "general";

pub fn product_room(product: &str) -> String {
    format!("product:{product}")
}

pub fn chain_room(product: &str) -> String {
    format!("chain:{product}")
}

#[derive(Default)]
pub struct Rooms {
    members: RwLock<HashMap<String, HashMap<u64, Arc<SessionQueue>>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, room: &str, session_id: u64, queue: Arc<SessionQueue>) {
        self.members.write().entry(room.to_string()).or_default().insert(session_id, queue);
    }

    pub fn leave(&self, room: &str, session_id: u64) {
        let mut members = self.members.write();
        if let Some(set) = members.get_mut(room) {
            set.remove(&session_id);
            if set.is_empty() {
                members.remove(room);
            }
        }
    }

    /// Removes a session from every room it belongs to (disconnect, §4.E
    /// lifecycle: client- or server-initiated).
    pub fn leave_all(&self, session_id: u64) {
        let mut members = self.members.write();
        members.retain(|_, set| {
            set.remove(&session_id);
            !set.is_empty()
        });
    }

    /// Snapshot of `(session_id, queue)` pairs currently in `room`, taken
    /// under the lock then released before delivery so a slow session never
    /// blocks fan-out to the rest of the room.
    pub fn senders(&self, room: &str) -> Vec<(u64, Arc<SessionQueue>)> {
        self.members
            .read()
            .get(room)
            .map(|set| set.iter().map(|(id, q)| (*id, q.clone())).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_leave_empties_room() {
        let rooms = Rooms::new();
        let queue = Arc::new(SessionQueue::new(8));
        rooms.join(&product_room("NIFTY"), 1, queue);
        assert_eq!(rooms.senders(&product_room("NIFTY")).len(), 1);

        rooms.leave(&product_room("NIFTY"), 1);
        assert_eq!(rooms.senders(&product_room("NIFTY")).len(), 0);
    }

    #[test]
    fn leave_all_removes_session_from_every_room() {
        let rooms = Rooms::new();
        let queue = Arc::new(SessionQueue::new(8));
        rooms.join(GENERAL, 7, queue.clone());
        rooms.join(&product_room("NIFTY"), 7, queue);

        rooms.leave_all(7);

        assert_eq!(rooms.senders(GENERAL).len(), 0);
        assert_eq!(rooms.senders(&product_room("NIFTY")).len(), 0);
    }
}
