//! Freqtrade `user_data` layout and file formats
//!
//! Everything here works on files the Freqtrade CLI reads or writes: strategy
//! sources, JSON configs, OHLCV candle files and hyperopt result files.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::models::ChartCandle;

pub const DEFAULT_EXCHANGE: &str = "binance";

/// Config keys that only make sense for the machine the file came from.
const STRIPPED_CONFIG_KEYS: [&str; 3] = ["log_config", "logfile", "forcebuy_enable"];

#[derive(Debug, Clone)]
pub struct UserData {
    root: PathBuf,
}

impl UserData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn strategies_dir(&self) -> PathBuf {
        self.root.join("strategies")
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.root.join("configs")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.root.join("plots")
    }

    pub fn strategy_path(&self, filename: &str) -> PathBuf {
        self.strategies_dir().join(filename)
    }

    pub fn config_path(&self, filename: &str) -> PathBuf {
        self.configs_dir().join(filename)
    }

    /// Paths stored by workers are either absolute or relative to the root.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Candle file Freqtrade keeps for a pair: `data/<exchange>/<BASE_QUOTE>-<tf>.json`.
    /// The pair may carry an exchange prefix (`kraken:BTC/USD`).
    pub fn candle_file_for_pair(&self, pair: &str, timeframe: &str) -> PathBuf {
        let (exchange, symbol) = split_exchange_pair(pair);
        self.data_dir()
            .join(exchange.to_lowercase())
            .join(format!("{}-{}.json", symbol.replacen('/', "_", 1), timeframe))
    }
}

/// Accepts a bare file name only; anything that could walk out of a directory is refused.
pub fn is_plain_filename(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path.components().count() == 1
        && matches!(path.components().next(), Some(Component::Normal(_)))
}

pub fn split_exchange_pair(pair: &str) -> (&str, &str) {
    match pair.split_once(':') {
        Some((exchange, symbol)) if !exchange.is_empty() => (exchange, symbol),
        _ => (DEFAULT_EXCHANGE, pair),
    }
}

/// Name of the first class declared in a strategy source file.
pub fn extract_class_name(source: &str) -> Option<String> {
    let class_regex = Regex::new(r"class\s+([a-zA-Z0-9_]+)\s*\(").ok()?;
    class_regex
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFileName {
    pub pair: String,
    pub timeframe: String,
    pub format: String,
}

/// Parses `BTC_USDT-1h.json` style names. Only the first `_` becomes `/`.
pub fn parse_data_filename(filename: &str) -> Option<DataFileName> {
    let name_regex = Regex::new(r"(?i)^(.+)-(\d+[mhdwM])\.(json|feather|parquet)$").ok()?;
    let caps = name_regex.captures(filename)?;
    let timeframe = caps.get(2)?.as_str();
    Some(DataFileName {
        pair: caps.get(1)?.as_str().replacen('_', "/", 1),
        // `1M` is a month, `1m` a minute
        timeframe: if timeframe.ends_with('M') {
            timeframe.to_string()
        } else {
            timeframe.to_lowercase()
        },
        format: caps.get(3)?.as_str().to_lowercase(),
    })
}

/// Loads `[ms, open, high, low, close, volume]` rows as chart candles.
///
/// Returns `None` when the file is missing, unreadable or empty so callers can
/// fall back to another source. When both range ends are given, candles
/// outside the range are dropped.
pub fn read_candles(
    path: &Path,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<Vec<ChartCandle>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Candle file {} not readable: {}", path.display(), e);
            return None;
        }
    };
    let rows: Vec<Vec<Value>> = match serde_json::from_str(&content) {
        Ok(rows) => rows,
        Err(e) => {
            debug!("Candle file {} is not an OHLCV array: {}", path.display(), e);
            return None;
        }
    };
    if rows.is_empty() {
        return None;
    }

    let mut candles: Vec<ChartCandle> = rows.iter().filter_map(|row| candle_from_row(row)).collect();

    if let (Some(start), Some(end)) = (start, end) {
        let (from, to) = (start.timestamp(), end.timestamp());
        candles.retain(|c| c.time >= from && c.time <= to);
    }

    Some(candles)
}

fn candle_from_row(row: &[Value]) -> Option<ChartCandle> {
    let number = |i: usize| row.get(i).and_then(Value::as_f64);
    Some(ChartCandle {
        time: (number(0)? / 1000.0).floor() as i64,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5).unwrap_or(0.0),
    })
}

/// First and last timestamp of a JSON candle file. Binary formats are not inspected.
pub fn data_file_time_range(path: &Path, format: &str) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    if !format.eq_ignore_ascii_case("json") {
        return (None, None);
    }
    let rows: Vec<Value> = match std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
    {
        Some(rows) => rows,
        None => return (None, None),
    };
    (
        rows.first().and_then(row_timestamp),
        rows.last().and_then(row_timestamp),
    )
}

fn row_timestamp(row: &Value) -> Option<DateTime<Utc>> {
    let raw = match row {
        Value::Array(values) => values.first()?,
        Value::Object(fields) => fields.get("date").or_else(|| fields.get("timestamp"))?,
        _ => return None,
    };
    match raw {
        Value::Number(ms) => Utc.timestamp_millis_opt(ms.as_f64()? as i64).single(),
        Value::String(s) => parse_date_input(s),
        _ => None,
    }
}

/// Dates from forms arrive as RFC 3339 timestamps or plain `YYYY-MM-DD`.
pub fn parse_date_input(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Drops machine-specific keys from a config file before it is stored.
pub fn clean_imported_config(mut config: Value) -> Value {
    if let Value::Object(fields) = &mut config {
        for key in STRIPPED_CONFIG_KEYS {
            fields.remove(key);
        }
    }
    config
}

/// `bot_name` when the config has one, otherwise the file name without `.json`.
pub fn config_display_name(config: &Value, filename: &str) -> String {
    config
        .get("bot_name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| filename.trim_end_matches(".json").to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperoptEpoch {
    pub epoch: Option<i64>,
    pub loss: f64,
    pub is_best: bool,
    pub params: Value,
    pub results: Value,
    pub results_explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperoptResults {
    pub best: HyperoptEpoch,
    pub total_epochs: usize,
}

/// Reads a `.fthypt` file: one JSON object per evaluated epoch.
///
/// The best epoch is the lowest loss among rows flagged `is_best`, or among
/// all rows when none is flagged.
pub fn parse_hyperopt_results(content: &str) -> Result<HyperoptResults> {
    let epochs: Vec<HyperoptEpoch> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(row) => epoch_from_row(&row),
            Err(e) => {
                debug!("Skipping unreadable hyperopt result line: {}", e);
                None
            }
        })
        .collect();

    if epochs.is_empty() {
        bail!("No hyperopt epochs found in results file");
    }

    let lowest = |candidates: Vec<&HyperoptEpoch>| {
        candidates
            .into_iter()
            .min_by(|a, b| a.loss.total_cmp(&b.loss))
            .cloned()
    };
    let flagged: Vec<&HyperoptEpoch> = epochs.iter().filter(|e| e.is_best).collect();
    let best = if flagged.is_empty() {
        lowest(epochs.iter().collect())
    } else {
        lowest(flagged)
    }
    .context("No hyperopt epoch with a loss value")?;

    Ok(HyperoptResults {
        best,
        total_epochs: epochs.len(),
    })
}

fn epoch_from_row(row: &Value) -> Option<HyperoptEpoch> {
    let loss = row.get("loss")?.as_f64()?;
    let params = row
        .get("params_details")
        .or_else(|| row.get("params_dict"))
        .or_else(|| row.get("params"))
        .cloned()
        .unwrap_or(Value::Null);
    let results = row
        .get("results_metrics")
        .or_else(|| row.get("results"))
        .cloned()
        .unwrap_or(Value::Null);

    Some(HyperoptEpoch {
        epoch: row.get("current_epoch").and_then(Value::as_i64),
        loss,
        is_best: row.get("is_best").and_then(Value::as_bool).unwrap_or(false),
        params,
        results,
        results_explanation: row
            .get("results_explanation")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Writes optimized values into a strategy source.
///
/// `params` is grouped by space (`buy`, `sell`, `roi`, `stoploss`). Only
/// numeric literals are replaced; parameters the source does not assign
/// literally are left alone.
pub fn apply_hyperopt_params(source: &str, params: &Value) -> Result<String> {
    let mut updated = source.to_string();

    for space in ["buy", "sell"] {
        if let Some(values) = params.get(space).and_then(Value::as_object) {
            for (key, value) in numeric_entries(values) {
                let pattern = format!(r"(\b{}\s*=\s*)([\d.]+)", regex::escape(key));
                updated = replace_numeric(&updated, &pattern, &value)?;
            }
        }
    }

    let stoploss = match params.get("stoploss") {
        Some(Value::Object(inner)) => inner.get("stoploss").and_then(Value::as_f64),
        Some(value) => value.as_f64(),
        None => None,
    };
    if let Some(stoploss) = stoploss {
        updated = replace_numeric(&updated, r"(stoploss\s*=\s*)([\d.-]+)", &format_number(stoploss))?;
    }

    if let Some(roi) = params.get("roi").and_then(Value::as_object) {
        for (key, value) in numeric_entries(roi) {
            let pattern = format!(
                r#"(minimal_roi\s*=\s*\{{(?:[^}}]*[,\s])?["']?{}["']?\s*:\s*)([\d.]+)"#,
                regex::escape(key)
            );
            updated = replace_numeric(&updated, &pattern, &value)?;
        }
    }

    Ok(updated)
}

fn numeric_entries(values: &Map<String, Value>) -> Vec<(&str, String)> {
    values
        .iter()
        .filter_map(|(key, value)| value.as_f64().map(|n| (key.as_str(), format_number(n))))
        .collect()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn replace_numeric(source: &str, pattern: &str, value: &str) -> Result<String> {
    let re = Regex::new(pattern).with_context(|| format!("Invalid parameter pattern {}", pattern))?;
    Ok(re.replace_all(source, format!("${{1}}{}", value).as_str()).into_owned())
}

/// Backup name for a strategy file about to be rewritten.
pub fn backup_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup.{}", now.timestamp_millis()));
    PathBuf::from(name)
}
