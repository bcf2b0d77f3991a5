//! Message templates (Telegram HTML parse mode).

use crate::definition::{LineSpec, ReportDefinition, Template, Unit};
use crate::error::{FormatError, ReportError, ReportResult};
use crate::numbers::{
    escape_html, format_delta, format_level, format_money_delta, format_percent_change,
};
use crate::table_image::{Align, TableImage};
use eiabot_core::{Period, ReportKind, SeriesId, SeriesSet};
use tracing::warn;

const SOURCE_FOOTER: &str = "Source: US Energy Information Administration";

/// PNG attachment produced alongside the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportImage {
    pub filename: String,
    pub png: Vec<u8>,
}

/// A formatted, ready-to-send report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub kind: ReportKind,
    pub period: Period,
    pub text: String,
    /// Table image for templates that have one. `None` if drawing failed.
    pub image: Option<ReportImage>,
    /// Figures left out of the text, with the reason.
    pub omitted: Vec<(SeriesId, FormatError)>,
}

struct Row<'a> {
    spec: &'a LineSpec,
    level: String,
    delta: Option<String>,
    percent: Option<String>,
}

/// Render a report for `period` from a validated set.
pub fn render(
    definition: &ReportDefinition,
    set: &SeriesSet,
    period: Period,
) -> ReportResult<RenderedReport> {
    let mut omitted = Vec::new();
    let mut rows = Vec::with_capacity(definition.lines.len());

    for spec in &definition.lines {
        let series = set
            .get(&spec.series)
            .ok_or_else(|| ReportError::MissingSeries(spec.series.to_string()))?;
        let (Some(current), Some(previous)) = (series.latest(), series.previous()) else {
            return Err(ReportError::MissingSeries(spec.series.to_string()));
        };

        let precision = spec.unit.precision();
        let delta = match spec.unit {
            Unit::ThousandBarrels => format_delta(current.value, previous.value, precision),
            Unit::Dollars { .. } => {
                format_money_delta(current.value, previous.value, precision, "$")
            }
        };
        // A delta that overflows makes the percentage overflow too; report it once.
        let (delta, percent) = match delta {
            Ok(delta) => match format_percent_change(current.value, previous.value) {
                Ok(pct) => (Some(delta), Some(pct)),
                Err(e) => {
                    warn!(series = %spec.series, error = %e, "Omitting percentage change");
                    omitted.push((spec.series.clone(), e));
                    (Some(delta), None)
                }
            },
            Err(e) => {
                warn!(series = %spec.series, error = %e, "Omitting change figures");
                omitted.push((spec.series.clone(), e));
                (None, None)
            }
        };

        rows.push(Row {
            spec,
            level: format_level(current.value, precision),
            delta,
            percent,
        });
    }

    let (text, image) = match definition.template {
        Template::StocksTable => (
            stocks_table(period, &rows),
            stocks_image(definition.kind, period, &rows),
        ),
        Template::FuturesList => (futures_list(period, &rows), None),
    };

    Ok(RenderedReport {
        kind: definition.kind,
        period,
        text,
        image,
        omitted,
    })
}

fn stocks_table(period: Period, rows: &[Row<'_>]) -> String {
    let label_width = rows.iter().map(|r| r.spec.label.chars().count()).max().unwrap_or(0);
    let level_width = rows.iter().map(|r| r.level.len()).max().unwrap_or(0);
    let delta_width = rows
        .iter()
        .filter_map(|r| r.delta.as_ref().map(String::len))
        .max()
        .unwrap_or(0);
    let pct_width = rows
        .iter()
        .filter_map(|r| r.percent.as_ref().map(String::len))
        .max()
        .unwrap_or(0);

    let mut text = format!(
        "<b>Petroleum product stocks for week ending {} (weekly change)</b>\n\n<pre>\n",
        period.to_long_string()
    );
    for row in rows {
        let line = format!(
            "{:<label_width$}  {:>level_width$}  {:>delta_width$}  {:>pct_width$}",
            row.spec.label,
            row.level,
            row.delta.as_deref().unwrap_or(""),
            row.percent.as_deref().unwrap_or(""),
        );
        text.push_str(&escape_html(line.trim_end()));
        text.push('\n');
    }
    text.push_str("</pre>\nThousand barrels\n");
    text.push_str(SOURCE_FOOTER);
    text
}

/// Same table as `stocks_table`, drawn as a PNG.
fn stocks_image(kind: ReportKind, period: Period, rows: &[Row<'_>]) -> Option<ReportImage> {
    let table = TableImage {
        title: format!("Petroleum product stocks, week ending {}", period.to_long_string()),
        columns: vec![
            ("Thousand barrels".to_string(), Align::Left),
            ("Stocks".to_string(), Align::Right),
            ("Weekly".to_string(), Align::Right),
            ("%".to_string(), Align::Right),
        ],
        rows: rows
            .iter()
            .map(|row| {
                vec![
                    row.spec.label.clone(),
                    row.level.clone(),
                    row.delta.clone().unwrap_or_default(),
                    row.percent.clone().unwrap_or_default(),
                ]
            })
            .collect(),
        footer: vec![SOURCE_FOOTER.to_string()],
    };

    match table.to_png() {
        Ok(png) => Some(ReportImage {
            filename: format!("{}_{}.png", kind.as_str(), period.to_iso()),
            png,
        }),
        Err(e) => {
            warn!(report = %kind, error = %e, "Sending stocks table without image");
            None
        }
    }
}

fn futures_list(period: Period, rows: &[Row<'_>]) -> String {
    let mut text = format!(
        "<b>NYMEX closing prompt-month futures prices for {}</b>\n\
         Change since last recorded close in parenthesis\n\n",
        period.to_long_string()
    );
    for row in rows {
        let per = match row.spec.unit {
            Unit::Dollars { per, .. } => per,
            Unit::ThousandBarrels => "kbbl",
        };
        let change: Vec<&str> = [&row.delta, &row.percent]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let change = if change.is_empty() {
            String::new()
        } else {
            format!(" ({})", change.join(", "))
        };
        text.push_str(&format!(
            "<b>{}:</b> ${}/{}{}\n",
            escape_html(&row.spec.label),
            row.level,
            per,
            change
        ));
    }
    text.push('\n');
    text.push_str(SOURCE_FOOTER);
    text.push_str("\n#petroleum #prices");
    text
}
