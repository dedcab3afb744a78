use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{info, warn};

use super::{DocumentStore, InsertOutcome};
use crate::error::PipelineError;
use crate::model::{EnrichedChain, OptionQuote, Product, UnderlyingTick};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS underlying_ticks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product TEXT NOT NULL,
    tick_id INTEGER NOT NULL,
    price TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_underlying_ticks_unique
    ON underlying_ticks(product, tick_id);
CREATE INDEX IF NOT EXISTS idx_underlying_ticks_recent
    ON underlying_ticks(product, timestamp DESC);

CREATE TABLE IF NOT EXISTS option_quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    product TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_option_quotes_symbol
    ON option_quotes(symbol, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_option_quotes_product
    ON option_quotes(product, timestamp DESC);

CREATE TABLE IF NOT EXISTS option_chains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product TEXT NOT NULL,
    expiry TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_option_chains_unique
    ON option_chains(product, expiry, timestamp);
CREATE INDEX IF NOT EXISTS idx_option_chains_recent
    ON option_chains(product, expiry, timestamp DESC);
"#;

/// §4.G document store. One `rusqlite::Connection` behind a `parking_lot::Mutex`,
/// following the teacher's `DbSignalStorage` shape: WAL mode, `INSERT OR IGNORE`
/// against a unique index for idempotent writes, full row payloads kept as
/// JSON text next to the indexed columns queries actually filter on.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self, PipelineError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .map_err(|e| PipelineError::TransientBackend(format!("open sqlite at {db_path}: {e}")))?;
        info!(path = db_path, "document store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn sql_err(e: rusqlite::Error) -> PipelineError {
    PipelineError::TransientBackend(e.to_string())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), PipelineError> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA_SQL).map_err(sql_err)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if mode.to_lowercase() != "wal" {
            warn!(mode, "WAL mode not active on document store");
        }
        Ok(())
    }

    async fn insert_tick(&self, tick: &UnderlyingTick) -> Result<InsertOutcome, PipelineError> {
        let conn = self.conn.lock();
        let changes = conn
            .execute(
                "INSERT OR IGNORE INTO underlying_ticks (product, tick_id, price, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    tick.product,
                    tick.tick_id,
                    tick.price.to_string(),
                    tick.timestamp.to_rfc3339(),
                ],
            )
            .map_err(sql_err)?;
        Ok(if changes == 0 {
            InsertOutcome::DuplicateIgnored
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn insert_quote(&self, quote: &OptionQuote) -> Result<InsertOutcome, PipelineError> {
        let payload = serde_json::to_string(quote)
            .map_err(|e| PipelineError::EnvelopeInvalid(format!("serialize quote: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO option_quotes (symbol, product, timestamp, payload) VALUES (?1, ?2, ?3, ?4)",
            params![quote.symbol, quote.product, quote.timestamp.to_rfc3339(), payload],
        )
        .map_err(sql_err)?;
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_chain(&self, chain: &EnrichedChain) -> Result<InsertOutcome, PipelineError> {
        let payload = serde_json::to_string(chain)
            .map_err(|e| PipelineError::EnvelopeInvalid(format!("serialize chain: {e}")))?;
        let conn = self.conn.lock();
        let changes = conn
            .execute(
                "INSERT OR IGNORE INTO option_chains (product, expiry, timestamp, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    chain.chain.product,
                    chain.chain.expiry.to_string(),
                    chain.chain.timestamp.to_rfc3339(),
                    payload,
                ],
            )
            .map_err(sql_err)?;
        Ok(if changes == 0 {
            InsertOutcome::DuplicateIgnored
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn query_ticks(
        &self,
        product: &Product,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<UnderlyingTick>, PipelineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT product, tick_id, price, timestamp FROM underlying_ticks
                 WHERE product = ?1
                   AND (?2 IS NULL OR timestamp >= ?2)
                   AND (?3 IS NULL OR timestamp <= ?3)
                 ORDER BY timestamp DESC
                 LIMIT ?4",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(
                params![
                    product,
                    start.map(|t| t.to_rfc3339()),
                    end.map(|t| t.to_rfc3339()),
                    limit as i64,
                ],
                |row| {
                    let price: String = row.get(2)?;
                    let timestamp: String = row.get(3)?;
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, price, timestamp))
                },
            )
            .map_err(sql_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (product, tick_id, price, timestamp) = row.map_err(sql_err)?;
            out.push(UnderlyingTick {
                product,
                tick_id,
                price: price
                    .parse()
                    .map_err(|e| PipelineError::EnvelopeInvalid(format!("stored price: {e}")))?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| PipelineError::EnvelopeInvalid(format!("stored timestamp: {e}")))?
                    .with_timezone(&Utc),
            });
        }
        Ok(out)
    }

    async fn query_chains(
        &self,
        product: &Product,
        expiry: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<EnrichedChain>, PipelineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT payload FROM option_chains
                 WHERE product = ?1 AND (?2 IS NULL OR expiry = ?2)
                 ORDER BY timestamp DESC
                 LIMIT ?3",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(
                params![product, expiry.map(|e| e.to_string()), limit as i64],
                |row| row.get::<_, String>(0),
            )
            .map_err(sql_err)?;

        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(sql_err)?;
            let chain: EnrichedChain = serde_json::from_str(&payload)
                .map_err(|e| PipelineError::EnvelopeInvalid(format!("stored chain: {e}")))?;
            out.push(chain);
        }
        Ok(out)
    }

    async fn list_products(&self) -> Result<Vec<Product>, PipelineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT DISTINCT product FROM underlying_ticks ORDER BY product ASC")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
    }

    async fn list_expiries(&self, product: &Product) -> Result<Vec<NaiveDate>, PipelineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT DISTINCT expiry FROM option_chains WHERE product = ?1 ORDER BY expiry ASC",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![product], |row| row.get::<_, String>(0))
            .map_err(sql_err)?;

        let mut out = Vec::new();
        for row in rows {
            let raw = row.map_err(sql_err)?;
            out.push(
                raw.parse()
                    .map_err(|e| PipelineError::EnvelopeInvalid(format!("stored expiry: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn ping(&self) -> Result<(), PipelineError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |_| Ok(())).map_err(sql_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn store() -> SqliteStore {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let path_str = path.to_str().unwrap().to_string();
        std::mem::forget(path); // keep the file alive for the store's lifetime
        SqliteStore::open(&path_str).unwrap()
    }

    fn tick(product: &str, tick_id: i64) -> UnderlyingTick {
        UnderlyingTick {
            product: product.to_string(),
            tick_id,
            price: dec!(100),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn duplicate_tick_insert_is_idempotent() {
        let store = store();
        store.ensure_schema().await.unwrap();
        let t = tick("NIFTY", 1);
        assert_eq!(store.insert_tick(&t).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            store.insert_tick(&t).await.unwrap(),
            InsertOutcome::DuplicateIgnored
        );
        let rows = store.query_ticks(&"NIFTY".to_string(), None, None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn list_products_is_distinct_and_sorted() {
        let store = store();
        store.ensure_schema().await.unwrap();
        store.insert_tick(&tick("NIFTY", 1)).await.unwrap();
        store.insert_tick(&tick("NIFTY", 2)).await.unwrap();
        store.insert_tick(&tick("BANKNIFTY", 1)).await.unwrap();
        assert_eq!(
            store.list_products().await.unwrap(),
            vec!["BANKNIFTY".to_string(), "NIFTY".to_string()]
        );
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_store() {
        let store = store();
        store.ensure_schema().await.unwrap();
        assert!(store.ping().await.is_ok());
    }
}
