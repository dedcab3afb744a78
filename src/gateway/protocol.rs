//! Session wire grammar (§4.E), tagged the same way `model::raw::RawMessage`
//! tags raw topic envelopes: one `type` discriminant, one variant per frame.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{EnrichedChain, EnrichedUnderlying, Product};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { kind: RoomKind, symbol: String },
    Unsubscribe { kind: RoomKind, symbol: String },
    GetProducts,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Product,
    Chain,
}

/// `general`-room projection of an enriched chain (§4.E point 3): derived by
/// the broadcaster from the same `enriched:option_chain` event, never a
/// separate publish.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub product: Product,
    pub expiry: NaiveDate,
    pub spot_price: Decimal,
    pub pcr_oi: Decimal,
    pub atm_straddle_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<&EnrichedChain> for ChainSummary {
    fn from(c: &EnrichedChain) -> Self {
        Self {
            product: c.chain.product.clone(),
            expiry: c.chain.expiry,
            spot_price: c.chain.spot_price,
            pcr_oi: c.pcr_oi,
            atm_straddle_price: c.atm_straddle_price,
            timestamp: c.chain.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { client_id: String, rooms: Vec<String> },
    Subscribed { room: String },
    Unsubscribed { room: String },
    Products { products: Vec<Product> },
    UnderlyingUpdate(EnrichedUnderlying),
    ChainSummary(ChainSummary),
    ChainUpdate(EnrichedChain),
    Error { message: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"event serialization failed"}"#.to_string())
    }
}
