//! Integration tests for eiabot.
//!
//! These drive the real HTTP clients against an in-process server:
//! - EIA v2 and legacy series requests
//! - Telegram sendMessage / sendPhoto
//! - Full invocations with a SQLite posting log

pub mod common;
