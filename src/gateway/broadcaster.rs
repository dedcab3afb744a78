//! Bus-fed fan-out (§4.E broadcast path): subscribes to the two enriched
//! topics and delivers into this instance's *local* rooms only. Every
//! gateway instance runs its own copy against the same bus, so cross-instance
//! delivery needs no coordination beyond that shared subscription.

use std::sync::Arc;

use tracing::{info, warn};

use super::protocol::{ChainSummary, ServerEvent};
use super::rooms::{chain_room, product_room, Rooms, GENERAL};
use super::session::OutboundFrame;
use crate::cache::CacheStore;
use crate::model::{topics, EnrichedChain, EnrichedUnderlying};

pub async fn run(cache: Arc<dyn CacheStore>, rooms: Arc<Rooms>) {
    let mut sub = match cache
        .subscribe(&[topics::ENRICHED_UNDERLYING, topics::ENRICHED_OPTION_CHAIN])
        .await
    {
        Ok(sub) => sub,
        Err(e) => {
            warn!(error = %e, "gateway broadcaster failed to subscribe to bus");
            return;
        }
    };
    info!("gateway broadcaster subscribed to enriched topics");

    while let Some(msg) = sub.recv().await {
        match msg.topic.as_str() {
            t if t == topics::ENRICHED_UNDERLYING => {
                match serde_json::from_slice::<EnrichedUnderlying>(&msg.payload) {
                    Ok(update) => {
                        let room = product_room(&update.tick.product);
                        deliver(&rooms, &room, OutboundFrame::Droppable(ServerEvent::UnderlyingUpdate(update)));
                    }
                    Err(e) => warn!(error = %e, "malformed enriched:underlying payload"),
                }
            }
            t if t == topics::ENRICHED_OPTION_CHAIN => {
                match serde_json::from_slice::<EnrichedChain>(&msg.payload) {
                    Ok(chain) => {
                        let room = chain_room(&chain.chain.product);
                        let summary = ServerEvent::ChainSummary(ChainSummary::from(&chain));
                        deliver(&rooms, &room, OutboundFrame::Droppable(ServerEvent::ChainUpdate(chain)));
                        deliver(&rooms, GENERAL, OutboundFrame::Droppable(summary));
                    }
                    Err(e) => warn!(error = %e, "malformed enriched:option_chain payload"),
                }
            }
            other => warn!(topic = other, "gateway broadcaster received unexpected topic"),
        }
    }
    warn!("gateway broadcaster bus subscription ended");
}

fn deliver(rooms: &Arc<Rooms>, room: &str, frame: OutboundFrame) {
    for (session_id, queue) in rooms.senders(room) {
        if queue.push(frame.clone()) {
            warn!(session_id, room, "closing slow-consumer session");
            queue.close();
            rooms.leave_all(session_id);
        }
    }
}
