//! Candle loaders and record writers.
//!
//! Loaders need the `serde` feature (JSON) or the `cli` feature (CSV).

#[cfg(any(feature = "serde", feature = "cli"))]
use std::{fs::File, io::BufReader, path::Path};

#[cfg(any(feature = "serde", feature = "cli"))]
use crate::engine::Candle;
#[cfg(any(feature = "serde", feature = "cli"))]
use crate::errors::Result;

/// Reads a JSON array of candles from `path`.
///
/// Each candle is an object with `open_time` (RFC 3339), `open`, `high`, `low` and `close`.
#[cfg(feature = "serde")]
pub fn read_candles_json(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let file = File::open(path)?;
    let candles: Vec<Candle> = serde_json::from_reader(BufReader::new(file))?;
    for (index, candle) in candles.iter().enumerate() {
        candle.check(index)?;
    }
    Ok(candles)
}

#[cfg(feature = "cli")]
pub use self::csv_io::*;

#[cfg(feature = "cli")]
mod csv_io {
    use super::*;

    use chrono::NaiveDateTime;
    use serde::{Deserialize, Serialize};

    use crate::engine::{CandleBuilder, Side, TradeOutcome};
    use crate::errors::Error;

    // date, time, open, high, low, close, volume
    #[derive(Debug, Deserialize)]
    struct CandleRow(String, String, f64, f64, f64, f64, Option<f64>);

    /// Reads headerless `date,time,open,high,low,close,volume` rows, dated `YYYY.MM.DD` and `HH:MM` in UTC.
    pub fn read_candles_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let mut candles = Vec::new();
        for (index, row) in reader.deserialize::<CandleRow>().enumerate() {
            let CandleRow(date, time, open, high, low, close, _volume) = row?;
            let open_time = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y.%m.%d %H:%M")?.and_utc();
            let candle = CandleBuilder::builder()
                .open_time(open_time)
                .open(open)
                .high(high)
                .low(low)
                .close(close)
                .build()
                .map_err(|e| match e {
                    Error::MalformedCandle { reason, .. } => Error::MalformedCandle { index, reason },
                    e => e,
                })?;
            candles.push(candle);
        }
        Ok(candles)
    }

    fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }

    #[derive(Debug, Serialize)]
    struct TradeRow {
        date: String,
        time: String,
        day_of_week: String,
        #[serde(rename = "type")]
        side: Side,
        entry: f64,
        stop_loss: f64,
        distance: f64,
        money_used: f64,
        profit: f64,
        reward_risk: String,
        exit_reason: String,
    }

    impl From<&TradeOutcome> for TradeRow {
        fn from(outcome: &TradeOutcome) -> Self {
            Self {
                date: outcome.date().format("%Y.%m.%d").to_string(),
                time: outcome.time().format("%H:%M").to_string(),
                day_of_week: outcome.open_time.format("%A").to_string(),
                side: outcome.side,
                entry: round2(outcome.entry),
                stop_loss: round2(outcome.stop_loss),
                distance: round2(outcome.distance),
                money_used: round2(outcome.money_used()),
                profit: round2(outcome.profit),
                reward_risk: match outcome.reward_multiple.multiple() {
                    Some(multiple) => format!("{multiple:.2}"),
                    None => "SL".to_string(),
                },
                exit_reason: format!("{:?}", outcome.exit_reason),
            }
        }
    }

    /// Writes the trade table, one row per outcome in open order. Losses read `SL`.
    pub fn write_trades_csv(path: impl AsRef<Path>, outcomes: &[TradeOutcome]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for outcome in outcomes {
            writer.serialize(TradeRow::from(outcome))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes any serializable records with a header row.
    pub fn write_records_csv<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

}
