//! Report definitions.
//!
//! A `ReportDefinition` ties a `ReportKind` to the upstream queries that
//! feed it, the lines it prints and the template that lays them out.

use crate::numbers::Precision;
use eiabot_core::{Dataset, ReportKind, SeriesId};
use eiabot_feed::{Frequency, SeriesQuery};

/// Unit a line is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Thousand barrels.
    ThousandBarrels,
    /// Dollars per `per`.
    Dollars {
        per: &'static str,
        precision: Precision,
    },
}

impl Unit {
    pub fn precision(&self) -> Precision {
        match self {
            Unit::ThousandBarrels => Precision::VOLUME,
            Unit::Dollars { precision, .. } => *precision,
        }
    }
}

/// One printed figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpec {
    pub series: SeriesId,
    pub label: String,
    pub unit: Unit,
}

impl LineSpec {
    fn new(series: &str, label: &str, unit: Unit) -> Self {
        Self {
            series: SeriesId::new(series),
            label: label.to_string(),
            unit,
        }
    }
}

/// Message layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Weekly stocks as a monospace table.
    StocksTable,
    /// One bold-labelled price line per contract.
    FuturesList,
}

/// Upstream settings that shape the queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Use the retired v1 `series/` API instead of v2.
    pub legacy_series_api: bool,
    pub stocks_lookback: usize,
    pub futures_lookback: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            legacy_series_api: false,
            stocks_lookback: 4,
            futures_lookback: 6,
        }
    }
}

const STOCKS_ROUTE: &str = "petroleum/stoc/wstk";
const PETROLEUM_FUTURES_ROUTE: &str = "petroleum/pri/fut";
const GAS_FUTURES_ROUTE: &str = "natural-gas/pri/fut";

const COMMERCIAL_CRUDE: &str = "WCESTUS1";
const SPR_CRUDE: &str = "WCSSTUS1";
const TOTAL_CRUDE: &str = "WCRSTUS1";
const GASOLINE_STOCKS: &str = "WGTSTUS1";
const DISTILLATE_STOCKS: &str = "WDISTUS1";

const WTI_FRONT_MONTH: &str = "RCLC1";
const RBOB_FRONT_MONTH: &str = "EER_EPMRR_PE1_Y35NY_DPG";
const HEATING_OIL_FRONT_MONTH: &str = "EER_EPD2F_PE1_Y35NY_DPG";
const HENRY_HUB_FRONT_MONTH: &str = "RNGC1";

/// Everything the pipeline needs to produce one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDefinition {
    pub kind: ReportKind,
    pub dataset: Dataset,
    pub queries: Vec<SeriesQuery>,
    pub lines: Vec<LineSpec>,
    /// Series whose latest period is the report's period.
    pub primary: SeriesId,
    pub template: Template,
}

impl ReportDefinition {
    pub fn for_kind(kind: ReportKind, options: &FetchOptions) -> Self {
        match kind {
            ReportKind::CrudeStocks => Self::crude_stocks(options),
            ReportKind::Futures => Self::futures(options),
        }
    }

    fn crude_stocks(options: &FetchOptions) -> Self {
        let lines = vec![
            LineSpec::new(COMMERCIAL_CRUDE, "Commercial crude", Unit::ThousandBarrels),
            LineSpec::new(SPR_CRUDE, "SPR", Unit::ThousandBarrels),
            LineSpec::new(TOTAL_CRUDE, "Total crude", Unit::ThousandBarrels),
            LineSpec::new(GASOLINE_STOCKS, "Gasoline", Unit::ThousandBarrels),
            LineSpec::new(DISTILLATE_STOCKS, "Distillates", Unit::ThousandBarrels),
        ];
        let series: Vec<SeriesId> = lines.iter().map(|l| l.series.clone()).collect();

        let query = if options.legacy_series_api {
            SeriesQuery::legacy("PET", Frequency::Weekly, series)
        } else {
            SeriesQuery::data(STOCKS_ROUTE, Frequency::Weekly, series)
        };

        Self {
            kind: ReportKind::CrudeStocks,
            dataset: ReportKind::CrudeStocks.dataset(),
            queries: vec![query.with_lookback(options.stocks_lookback)],
            primary: SeriesId::new(COMMERCIAL_CRUDE),
            lines,
            template: Template::StocksTable,
        }
    }

    fn futures(options: &FetchOptions) -> Self {
        let per_barrel = Unit::Dollars {
            per: "bbl",
            precision: Precision::CENTS,
        };
        let per_gallon = Unit::Dollars {
            per: "gal",
            precision: Precision::TENTH_CENTS,
        };
        let per_mmbtu = Unit::Dollars {
            per: "MMBTU",
            precision: Precision::TENTH_CENTS,
        };

        let lines = vec![
            LineSpec::new(WTI_FRONT_MONTH, "Crude Oil", per_barrel),
            LineSpec::new(RBOB_FRONT_MONTH, "RBOB Gasoline", per_gallon),
            LineSpec::new(HEATING_OIL_FRONT_MONTH, "Heating Oil", per_gallon),
            LineSpec::new(HENRY_HUB_FRONT_MONTH, "Natural Gas", per_mmbtu),
        ];

        let petroleum: Vec<SeriesId> = lines[..3].iter().map(|l| l.series.clone()).collect();
        let gas = vec![SeriesId::new(HENRY_HUB_FRONT_MONTH)];
        let queries = if options.legacy_series_api {
            vec![
                SeriesQuery::legacy("PET", Frequency::Daily, petroleum),
                SeriesQuery::legacy("NG", Frequency::Daily, gas),
            ]
        } else {
            vec![
                SeriesQuery::data(PETROLEUM_FUTURES_ROUTE, Frequency::Daily, petroleum),
                SeriesQuery::data(GAS_FUTURES_ROUTE, Frequency::Daily, gas),
            ]
        };

        Self {
            kind: ReportKind::Futures,
            dataset: ReportKind::Futures.dataset(),
            queries: queries
                .into_iter()
                .map(|q| q.with_lookback(options.futures_lookback))
                .collect(),
            primary: SeriesId::new(WTI_FRONT_MONTH),
            lines,
            template: Template::FuturesList,
        }
    }

    /// Every series the report prints, in line order.
    pub fn series(&self) -> impl Iterator<Item = &SeriesId> {
        self.lines.iter().map(|l| &l.series)
    }
}
