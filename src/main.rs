use std::path::PathBuf;

use anyhow::{Context, Result};
use bts_drawdown::prelude::*;
use bts_drawdown::utils::{read_candles_csv, read_candles_json, write_records_csv, write_trades_csv};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Candidates {
    /// Every loss position
    Loss,
    /// Start of data plus the loss after every return to zero
    Zero,
}

impl From<Candidates> for CandidateStarts {
    fn from(value: Candidates) -> Self {
        match value {
            Candidates::Loss => CandidateStarts::LossPositions,
            Candidates::Zero => CandidateStarts::ZeroCrossings,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Candle file: headerless `date,time,open,high,low,close,volume` CSV, or a JSON array
    #[arg(short, long, env = "BTS_CANDLES")]
    candles: PathBuf,
    /// Simulator configuration (JSON); missing fields take the default strategy values
    #[arg(long, env = "BTS_CONFIG")]
    config: Option<PathBuf>,
    /// Reward threshold to analyze, repeatable; defaults to every threshold up to the largest win
    #[arg(short, long = "threshold")]
    thresholds: Vec<u32>,
    /// How drawdown start points are chosen
    #[arg(long, value_enum, default_value_t = Candidates::Loss)]
    candidates: Candidates,
    /// Where to write the trade table
    #[arg(long)]
    trades_out: Option<PathBuf>,
    /// Where to write the per-threshold drawdown table
    #[arg(long)]
    drawdown_out: Option<PathBuf>,
    /// Score every threshold on the trades kept by the distance, hour and weekday filter
    #[arg(long)]
    filter: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SimulatorConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimulatorConfig::default(),
    };

    let is_json = args.candles.extension().is_some_and(|ext| ext == "json");
    let candles = if is_json {
        read_candles_json(&args.candles)
    } else {
        read_candles_csv(&args.candles)
    }
    .with_context(|| format!("loading candles {}", args.candles.display()))?;
    info!(candles = candles.len(), path = %args.candles.display(), "candles loaded");

    let simulator = TradeSimulator::new(config)?;
    let report = simulator.run(&candles)?;
    info!("\n{}", Metrics::from(&report));

    if let Some(path) = &args.trades_out {
        write_trades_csv(path, &report.outcomes)?;
        info!(path = %path.display(), trades = report.outcomes.len(), "trades written");
    }

    let multiples = report.reward_multiples();
    let analyzer = DrawdownAnalyzer::new(multiples.clone())?.with_candidates(args.candidates.into());
    let drawdowns = if args.thresholds.is_empty() {
        analyzer.analyze_all()?
    } else {
        analyzer.analyze(&args.thresholds)?
    };

    let scores = if args.filter {
        let thresholds: Vec<u32> = drawdowns.iter().map(|d| d.threshold).collect();
        let rounding = simulator.config().distance_filter.rounding;
        score_filtered(&report.outcomes, &thresholds, rounding, args.candidates.into())?
    } else {
        score_thresholds(&multiples, &drawdowns)
    };
    for score in &scores {
        info!(
            threshold = score.threshold,
            trades = score.trades,
            lowest = score.lowest,
            start = score.worst_start_index,
            net_score = score.net_score,
            quality = ?score.quality,
            "drawdown"
        );
    }
    info!(
        passes = passes_profitability(&multiples),
        longest_losing_streak = longest_losing_streak(&multiples),
        "profitability"
    );

    if let Some(path) = &args.drawdown_out {
        write_records_csv(path, &scores)?;
        info!(path = %path.display(), thresholds = scores.len(), "drawdown table written");
    }

    Ok(())
}
