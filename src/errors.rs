/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the simulator, the drawdown analyzer and the loaders.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The candle data provided is empty. Backtesting requires at least one candle.
    #[error("Candle data is empty: backtesting requires at least one candle")]
    CandleDataEmpty,

    /// A candle timestamp is earlier than the one before it.
    #[error("Candles are not ordered by time (first offending index: {index})")]
    InvalidInputOrder {
        /// Index of the first candle that goes back in time.
        index: usize,
    },

    /// A candle has inconsistent or non-finite prices.
    #[error("Malformed candle at index {index}: {reason}")]
    MalformedCandle {
        /// Index of the candle in the series (0 when built standalone).
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A field is missing when building a candle.
    #[error("Missing candle field: {0}")]
    MissingField(&'static str),

    /// The initial or current balance is not positive. Trading requires a positive balance.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// The position size percentage is outside `(0, 100]`.
    #[error("Position percent must be in (0, 100] (got: {0})")]
    InvalidPercent(f64),

    /// An entry or stop offset is negative or not finite.
    #[error("Price offset must be finite and non-negative (got: {0})")]
    InvalidOffset(f64),

    /// A distance range has its bounds inverted.
    #[error("Invalid distance range: {0} > {1}")]
    InvalidRange(i64, i64),

    /// The wallet cannot release more capital than it has committed.
    #[error("Cannot release {1} from committed capital {0}")]
    ReleaseCapital(f64, f64),

    /// The outcome sequence handed to the drawdown analyzer is empty.
    #[error("No trade outcomes to analyze")]
    NoData,

    /// Reward thresholds start at 1.
    #[error("Reward threshold must be at least 1 (got: {0})")]
    InvalidThreshold(u32),

    /// The position was not found.
    #[error("Position not found")]
    PositionNotFound,

    /// An unreachable context was encountered. This is likely a bug.
    #[error("Unreachable context (internal error): {0}")]
    Unreachable(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// CSV reading/writing error occurred.
    #[cfg(feature = "cli")]
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// A date or time column could not be parsed.
    #[cfg(feature = "cli")]
    #[error("Failed to parse date: {0}")]
    Parse(#[from] chrono::ParseError),
}
