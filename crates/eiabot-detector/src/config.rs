//! Detector configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the check-then-record sequence is protected against overlapping runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// Look up, deliver, then insert-if-absent. Two overlapping runs can both
    /// deliver; only one record survives.
    #[default]
    ConditionalInsert,
    /// Reserve the slot before delivery, finalize after the ack.
    ReserveThenFinalize,
}

/// Configuration for new-data detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub mode: DedupMode,
    /// Age after which a reservation is treated as abandoned (seconds).
    /// Default: 900 (15 minutes), longer than any delivery timeout.
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,
}

fn default_reservation_ttl_secs() -> u64 {
    900
}

impl DetectorConfig {
    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mode: DedupMode::default(),
            reservation_ttl_secs: default_reservation_ttl_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.mode, DedupMode::ConditionalInsert);
        assert_eq!(config.reservation_ttl(), Duration::from_secs(900));
    }

    #[test]
    fn test_parse_reserve_mode() {
        let config: DetectorConfig = toml::from_str(r#"mode = "reserve_then_finalize""#).unwrap();
        assert_eq!(config.mode, DedupMode::ReserveThenFinalize);
        assert_eq!(config.reservation_ttl_secs, 900);
    }
}
