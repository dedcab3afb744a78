//! axum `WebSocketUpgrade` handler implementing the §4.E session grammar,
//! grounded in the teacher's `websocket_handler`/`handle_socket` shape (a
//! select loop over inbound client frames and outbound broadcast events) —
//! generalized here to a per-session bounded queue instead of one shared
//! `broadcast` channel, since §4.E requires per-session backpressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::info;

use super::protocol::{ClientFrame, RoomKind, ServerEvent};
use super::rooms::{chain_room, product_room, GENERAL};
use super::session::{OutboundFrame, SessionQueue};
use super::GatewayState;
use crate::cache::typed;
use crate::model::{keys, EnrichedChain, EnrichedUnderlying, OhlcWindow, OhlcWindows, UnderlyingTick, WindowSize};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    let client_id = format!("sess-{session_id}");
    let queue = Arc::new(SessionQueue::new(state.config.session_queue_capacity));

    state.rooms.join(GENERAL, session_id, queue.clone());
    queue.push(OutboundFrame::Protected(ServerEvent::Connected {
        client_id: client_id.clone(),
        rooms: vec![GENERAL.to_string()],
    }));

    let (mut sink, mut stream) = socket.split();
    let writer_queue = queue.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = writer_queue.pop().await {
            if sink.send(Message::Text(frame.event().to_json())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle_client_frame(&state, &queue, session_id, frame).await,
                Err(e) => {
                    queue.push(OutboundFrame::Protected(ServerEvent::Error {
                        message: format!("invalid frame: {e}"),
                    }));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    state.rooms.leave_all(session_id);
    info!(client_id = %client_id, "session disconnected");
}

async fn handle_client_frame(state: &Arc<GatewayState>, queue: &Arc<SessionQueue>, session_id: u64, frame: ClientFrame) {
    match frame {
        ClientFrame::Subscribe { kind, symbol } => {
            let room = room_name(kind, &symbol);
            state.rooms.join(&room, session_id, queue.clone());
            queue.push(OutboundFrame::Protected(ServerEvent::Subscribed { room: room.clone() }));
            deliver_snapshot(state, queue, kind, &symbol).await;
        }
        ClientFrame::Unsubscribe { kind, symbol } => {
            let room = room_name(kind, &symbol);
            state.rooms.leave(&room, session_id);
            queue.push(OutboundFrame::Protected(ServerEvent::Unsubscribed { room }));
        }
        ClientFrame::GetProducts => match state.store.list_products().await {
            Ok(products) => {
                queue.push(OutboundFrame::Protected(ServerEvent::Products { products }));
            }
            Err(e) => {
                queue.push(OutboundFrame::Protected(ServerEvent::Error {
                    message: format!("list_products failed: {e}"),
                }));
            }
        },
    }
}

fn room_name(kind: RoomKind, symbol: &str) -> String {
    match kind {
        RoomKind::Product => product_room(symbol),
        RoomKind::Chain => chain_room(symbol),
    }
}

/// §4.E: a fresh subscribe MUST deliver an immediate snapshot from the hot
/// cache, before any live update, so the client never waits out the publish
/// interval for first data.
async fn deliver_snapshot(state: &Arc<GatewayState>, queue: &Arc<SessionQueue>, kind: RoomKind, symbol: &str) {
    let product = symbol.to_string();
    match kind {
        RoomKind::Product => {
            let Ok(Some(tick)) = typed::get::<UnderlyingTick>(state.cache.as_ref(), &keys::latest_underlying(&product)).await
            else {
                return;
            };
            let w60 = typed::get::<OhlcWindow>(state.cache.as_ref(), &keys::ohlc(&product, WindowSize::OneMinute))
                .await
                .ok()
                .flatten();
            let w300 = typed::get::<OhlcWindow>(state.cache.as_ref(), &keys::ohlc(&product, WindowSize::FiveMinute))
                .await
                .ok()
                .flatten();
            let w900 = typed::get::<OhlcWindow>(state.cache.as_ref(), &keys::ohlc(&product, WindowSize::FifteenMinute))
                .await
                .ok()
                .flatten();
            if let (Some(w60), Some(w300), Some(w900)) = (w60, w300, w900) {
                let snapshot = EnrichedUnderlying {
                    tick,
                    ohlc: OhlcWindows { w60, w300, w900 },
                    processed_at: chrono::Utc::now(),
                };
                queue.push(OutboundFrame::Protected(ServerEvent::UnderlyingUpdate(snapshot)));
            }
        }
        RoomKind::Chain => {
            let Ok(expiries) = state.store.list_expiries(&product).await else {
                return;
            };
            for expiry in expiries {
                if let Ok(Some(chain)) =
                    typed::get::<EnrichedChain>(state.cache.as_ref(), &keys::latest_chain(&product, &expiry)).await
                {
                    queue.push(OutboundFrame::Protected(ServerEvent::ChainUpdate(chain)));
                }
            }
        }
    }
}
