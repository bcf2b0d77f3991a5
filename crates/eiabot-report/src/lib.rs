//! Report definitions and Telegram message formatting.
//!
//! Formatting is pure: a `SeriesSet` and a period go in, HTML text (and
//! for the stocks table a PNG) comes out. A figure that cannot be computed
//! (zero baseline, overflow) is omitted and reported in
//! `RenderedReport::omitted`; it never fails the report.

pub mod definition;
pub mod error;
pub mod numbers;
pub mod render;
pub mod table_image;

pub use definition::{FetchOptions, LineSpec, ReportDefinition, Template, Unit};
pub use error::{FormatError, FormatResult, ReportError, ReportResult};
pub use numbers::{
    escape_html, format_delta, format_level, format_money_delta, format_percent_change,
    group_thousands, percent_change, round_to, Precision,
};
pub use render::{render, RenderedReport, ReportImage};
pub use table_image::{Align, TableImage};
