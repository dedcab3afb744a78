//! Tagged raw envelope variants (§9 design note: "dynamic JSON envelopes
//! become tagged variants"). One topic, one variant, one validation path.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

use super::{OptionChain, OptionQuote, Product, UnderlyingTick};

/// A raw option chain exactly as received off the wire — fields are not yet
/// checked against the §3 structural invariant. `validate()` promotes this
/// into a real `OptionChain` or rejects it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawOptionChain {
    pub product: Product,
    pub expiry: NaiveDate,
    pub spot_price: Decimal,
    pub strikes: Vec<i64>,
    pub calls: Vec<OptionQuote>,
    pub puts: Vec<OptionQuote>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawMessage {
    UnderlyingTick(UnderlyingTick),
    OptionQuote(OptionQuote),
    OptionChain(RawOptionChain),
}

impl RawMessage {
    /// Decode + validate a raw topic payload. Rejects (does not retry) on
    /// schema mismatch, missing field, |calls|!=|strikes|, bid>ask, negative
    /// OI/volume — exactly the §4.D validation list.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<RawMessage, PipelineError> {
        let msg: RawMessage = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::EnvelopeInvalid(format!("{topic}: {e}")))?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        match self {
            RawMessage::UnderlyingTick(_) => Ok(()),
            RawMessage::OptionQuote(q) => validate_quote(q),
            RawMessage::OptionChain(c) => {
                if c.calls.len() != c.strikes.len() || c.puts.len() != c.strikes.len() {
                    return Err(PipelineError::InvariantViolation(
                        "|calls| != |strikes| or |puts| != |strikes|".to_string(),
                    ));
                }
                for i in 0..c.strikes.len() {
                    if c.calls[i].strike != c.strikes[i] || c.puts[i].strike != c.strikes[i] {
                        return Err(PipelineError::InvariantViolation(format!(
                            "strike alignment mismatch at index {i}"
                        )));
                    }
                    validate_quote(&c.calls[i])?;
                    validate_quote(&c.puts[i])?;
                }
                Ok(())
            }
        }
    }

    /// Promote a validated `OptionChain` variant into a structurally-checked
    /// `OptionChain`. Returns `EnvelopeInvalid` if called on a different variant.
    pub fn into_option_chain(self) -> Result<OptionChain, PipelineError> {
        match self {
            RawMessage::OptionChain(c) => OptionChain::new(
                c.product, c.expiry, c.spot_price, c.strikes, c.calls, c.puts, c.timestamp,
            )
            .map_err(|e| PipelineError::InvariantViolation(e.to_string())),
            _ => Err(PipelineError::EnvelopeInvalid(
                "expected option_chain variant".to_string(),
            )),
        }
    }
}

fn validate_quote(q: &OptionQuote) -> Result<(), PipelineError> {
    if q.bid > q.ask {
        return Err(PipelineError::InvariantViolation(format!(
            "bid {} > ask {} for {}",
            q.bid, q.ask, q.symbol
        )));
    }
    if !q.satisfies_price_ordering() {
        return Err(PipelineError::InvariantViolation(format!(
            "last {} outside [bid {}, ask {}] for {}",
            q.last, q.bid, q.ask, q.symbol
        )));
    }
    if q.open_interest < 0 {
        return Err(PipelineError::InvariantViolation(format!(
            "negative open_interest for {}",
            q.symbol
        )));
    }
    if q.volume < 0 {
        return Err(PipelineError::InvariantViolation(format!(
            "negative volume for {}",
            q.symbol
        )));
    }
    Ok(())
}
