use chrono::{DateTime, NaiveTime, Utc};

use crate::errors::{Error, Result};

/// One OHLC price bar of a fixed timeframe.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    open_time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl Candle {
    /// Returns the timestamp the bar opens at.
    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// Returns the wall-clock time of day of the bar.
    pub fn time_of_day(&self) -> NaiveTime {
        self.open_time.time()
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns `true` when close equals open.
    pub fn is_doji(&self) -> bool {
        self.close == self.open
    }

    /// Checks the price shape of the bar.
    pub(crate) fn check(&self, index: usize) -> Result<()> {
        let malformed = |reason: String| Error::MalformedCandle { index, reason };

        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(malformed(format!("{name} must be finite and positive (got: {value})")));
            }
        }
        if self.high < self.low {
            return Err(malformed(format!("high {} is below low {}", self.high, self.low)));
        }
        if self.open < self.low || self.open > self.high {
            return Err(malformed(format!("open {} is outside [{}, {}]", self.open, self.low, self.high)));
        }
        if self.close < self.low || self.close > self.high {
            return Err(malformed(format!("close {} is outside [{}, {}]", self.close, self.low, self.high)));
        }
        Ok(())
    }
}

/// Builder for [`Candle`], validating prices on `build`.
///
/// ### Example
/// ```rust
/// use bts_drawdown::prelude::*;
/// use chrono::DateTime;
///
/// let candle = CandleBuilder::builder()
///     .open(100.0)
///     .high(110.0)
///     .low(95.0)
///     .close(105.0)
///     .open_time(DateTime::default())
///     .build()
///     .unwrap();
/// assert!(!candle.is_doji());
/// ```
#[derive(Debug, Default)]
pub struct CandleBuilder {
    open_time: Option<DateTime<Utc>>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
}

impl CandleBuilder {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn open_time(mut self, open_time: DateTime<Utc>) -> Self {
        self.open_time = Some(open_time);
        self
    }

    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Builds the candle.
    ///
    /// ### Returns
    /// The candle, or `MissingField`/`MalformedCandle` when a field is absent or the prices are inconsistent.
    pub fn build(self) -> Result<Candle> {
        let candle = Candle {
            open_time: self.open_time.ok_or(Error::MissingField("open_time"))?,
            open: self.open.ok_or(Error::MissingField("open"))?,
            high: self.high.ok_or(Error::MissingField("high"))?,
            low: self.low.ok_or(Error::MissingField("low"))?,
            close: self.close.ok_or(Error::MissingField("close"))?,
        };
        candle.check(0)?;
        Ok(candle)
    }
}
