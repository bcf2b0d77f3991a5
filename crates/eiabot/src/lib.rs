//! EIA energy statistics bot.
//!
//! Fetches weekly petroleum stocks and daily NYMEX futures closes from the
//! EIA open-data API, posts a summary to a Telegram channel when the
//! latest period has not been announced yet, and records each announcement
//! so it is never repeated.

pub mod app;
pub mod config;
pub mod error;

pub use app::{CheckReport, InvocationOutcome, OutcomeBody, Pipeline, Stage};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
