//! Prometheus metrics and structured logging for eiabot.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use metrics::{render_text, write_textfile, Metrics, OUTCOME_LABELS};
