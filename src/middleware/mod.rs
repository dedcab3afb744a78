//! Request-logging middleware.

pub mod logging;

pub use logging::request_logging;
