//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load config: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Feed error: {0}")]
    Feed(#[from] eiabot_feed::FeedError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] eiabot_persistence::PersistenceError),

    #[error("Detector error: {0}")]
    Detector(#[from] eiabot_detector::DetectorError),

    #[error("Report error: {0}")]
    Report(#[from] eiabot_report::ReportError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] eiabot_notify::DeliveryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] eiabot_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Short label for the `outcome` metric.
    pub fn outcome_label(&self) -> &'static str {
        use eiabot_detector::DetectorError;
        use eiabot_feed::FeedError;

        match self {
            AppError::Config(_) | AppError::ConfigSource(_) => "config_error",
            AppError::Feed(FeedError::UpstreamUnavailable(_)) => "upstream_unavailable",
            AppError::Feed(FeedError::InsufficientHistory { .. }) => "insufficient_history",
            AppError::Feed(_) => "upstream_format",
            AppError::Persistence(_) | AppError::Detector(DetectorError::Storage(_)) => {
                "storage_unavailable"
            }
            AppError::Detector(_) => "upstream_format",
            AppError::Report(_) => "format_error",
            AppError::Delivery(_) => "delivery_failed",
            AppError::Telemetry(_) | AppError::Io(_) => "internal_error",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
