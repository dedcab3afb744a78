//! §4.D ingest subscriber.

mod subscriber;

pub use subscriber::IngestSubscriber;
