use chrono::{DateTime, Duration, NaiveTime, Utc};

use super::*;

// 2024-01-01 00:00 UTC, a Monday
fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap()
}

fn candle(minutes: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    CandleBuilder::builder()
        .open(open)
        .high(high)
        .low(low)
        .close(close)
        .open_time(start() + Duration::minutes(minutes))
        .build()
        .unwrap()
}

fn simulator() -> TradeSimulator {
    TradeSimulator::new(SimulatorConfig::unfiltered(1_000.0, 10.0)).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn take_profit_closes_at_one_to_one() {
    // buy at 105, stop 99, target 111
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 113.0, 104.0, 112.0),
    ];
    let report = simulator().run(&candles).unwrap();

    let first = &report.outcomes[0];
    assert_eq!(first.side, Side::Buy);
    assert_eq!(first.entry, 105.0);
    assert_eq!(first.stop_loss, 99.0);
    assert_eq!(first.take_profit, 111.0);
    assert_eq!(first.exit_reason, ExitReason::TakeProfit);
    assert_eq!(first.exit_price, 111.0);
    assert_eq!(first.reward_multiple, RewardMultiple::Win(1.0));
    assert!(approx(first.profit, 6.0 * 100.0 / 105.0));
    assert!(approx(report.capital, 1_000.0 + first.profit));
}

#[test]
fn stop_loss_takes_precedence_on_same_candle() {
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 120.0, 90.0, 100.0),
    ];
    let report = simulator().run(&candles).unwrap();

    let first = &report.outcomes[0];
    assert_eq!(first.exit_reason, ExitReason::StopLoss);
    assert_eq!(first.exit_price, 99.0);
    assert!(first.is_loss());
    assert!(first.profit < 0.0);

    // the second candle is bearish and opens a sell after the close
    let second = &report.outcomes[1];
    assert_eq!(second.side, Side::Sell);
    assert_eq!(second.entry, 100.0);
    assert_eq!(second.stop_loss, 120.0);
    assert_eq!(second.take_profit, 80.0);
}

#[test]
fn sell_profit_sign() {
    // sell at 95, stop 101, target 89
    let candles = [
        candle(0, 100.0, 101.0, 94.0, 95.0),
        candle(240, 95.0, 96.0, 88.0, 90.0),
    ];
    let report = simulator().run(&candles).unwrap();
    let first = &report.outcomes[0];
    assert_eq!(first.side, Side::Sell);
    assert_eq!(first.exit_reason, ExitReason::TakeProfit);
    assert_eq!(first.exit_price, 89.0);
    assert!(first.profit > 0.0);
}

#[test]
fn offsets_move_entry_and_stop() {
    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_offsets(0.5, 1.0);
    let simulator = TradeSimulator::new(config).unwrap();
    let report = simulator
        .run(&[
            candle(0, 100.0, 106.0, 99.0, 105.0),
            candle(240, 105.0, 106.0, 95.0, 96.0),
        ])
        .unwrap();

    let buy = &report.outcomes[0];
    assert_eq!(buy.entry, 105.5);
    assert_eq!(buy.stop_loss, 98.0);
    assert_eq!(buy.distance, 7.5);

    let sell = &report.outcomes[1];
    assert_eq!(sell.entry, 95.5);
    assert_eq!(sell.stop_loss, 107.0);
}

#[test]
fn outcomes_keep_open_order() {
    // position 0 (stop 99) outlives position 1 (stop 103.5, target 108.5)
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 107.0, 103.5, 106.0),
        candle(480, 106.0, 107.0, 102.0, 102.5),
    ];
    let report = simulator().run(&candles).unwrap();

    assert_eq!(report.outcomes[0].open_time, start());
    assert_eq!(report.outcomes[0].exit_reason, ExitReason::EndOfData);
    assert_eq!(report.outcomes[1].open_time, start() + Duration::minutes(240));
    assert_eq!(report.outcomes[1].exit_reason, ExitReason::StopLoss);
    assert_eq!(report.outcomes.len(), 3);
}

#[test]
fn ledger_invariant() {
    let mut candles = Vec::new();
    let mut price = 100.0;
    for i in 0..200 {
        let swing = ((i * 37) % 11) as f64 - 5.0;
        let open = price;
        let close = (price + swing).max(10.0);
        let high = open.max(close) + ((i * 13) % 5) as f64 + 0.5;
        let low = open.min(close) - ((i * 7) % 4) as f64 - 0.5;
        candles.push(candle(i * 240, open, high, low, close));
        price = close;
    }

    let report = simulator().run(&candles).unwrap();
    let realized: f64 = report
        .outcomes
        .iter()
        .filter(|o| o.exit_reason != ExitReason::EndOfData)
        .map(|o| o.profit)
        .sum();
    let unrealized: f64 = report
        .outcomes
        .iter()
        .filter(|o| o.exit_reason == ExitReason::EndOfData)
        .map(|o| o.profit)
        .sum();

    assert!(!report.outcomes.is_empty());
    assert!((report.capital - (1_000.0 + realized)).abs() < 1e-6);
    assert!((report.unrealized_pnl - unrealized).abs() < 1e-6);
    assert!((report.final_capital() - (report.capital + unrealized)).abs() < 1e-6);
    assert_eq!(
        report.outcomes.len() + report.skipped.total(),
        candles.len(),
        "every candle either opens or is skipped"
    );

    for outcome in &report.outcomes {
        assert!(outcome.distance > 0.0);
        match outcome.exit_reason {
            ExitReason::TakeProfit => assert!(outcome.profit > 0.0),
            ExitReason::StopLoss => assert!(outcome.profit < 0.0),
            ExitReason::EndOfData => {}
        }
    }
}

#[test]
fn free_capital_policy_sizes_from_uncommitted() {
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 107.0, 103.0, 106.0),
    ];

    let free = simulator().run(&candles).unwrap();
    assert!(approx(free.outcomes[0].money_used(), 100.0));
    assert!(approx(free.outcomes[1].money_used(), 90.0));

    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_capital_policy(CapitalPolicy::Total);
    let total = TradeSimulator::new(config).unwrap().run(&candles).unwrap();
    assert!(approx(total.outcomes[0].money_used(), 100.0));
    assert!(approx(total.outcomes[1].money_used(), 100.0));
}

#[test]
fn capital_exhaustion_skips_open() {
    // the whole capital goes into the first position: 1000 / 125 = 8
    let config = SimulatorConfig::unfiltered(1_000.0, 100.0);
    let simulator = TradeSimulator::new(config).unwrap();
    let report = simulator
        .run(&[
            candle(0, 100.0, 126.0, 99.0, 125.0),
            candle(240, 125.0, 130.0, 120.0, 128.0),
        ])
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].size, 8.0);
    assert_eq!(report.skipped.no_capital, 1);
}

#[test]
fn distance_filter_respects_rounding() {
    // distance 5.6: floors to 5, rounds to 6
    let candles = [candle(0, 100.0, 106.0, 99.4, 105.0)];
    let filter = |rounding| DistanceFilter {
        mode: FilterMode::Deny,
        rounding,
        buy: vec![DistanceRule::Exact(6)],
        sell: vec![],
    };

    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_distance_filter(filter(RoundingRule::Nearest));
    let report = TradeSimulator::new(config).unwrap().run(&candles).unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.skipped.filtered_distance, 1);

    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_distance_filter(filter(RoundingRule::Floor));
    let report = TradeSimulator::new(config).unwrap().run(&candles).unwrap();
    assert_eq!(report.outcomes.len(), 1);
}

#[test]
fn allow_filter_only_opens_listed_distances() {
    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_distance_filter(DistanceFilter {
        mode: FilterMode::Allow,
        rounding: RoundingRule::Nearest,
        buy: vec![DistanceRule::Range(5, 7)],
        sell: vec![],
    });
    let report = TradeSimulator::new(config)
        .unwrap()
        .run(&[
            // buy, distance 6
            candle(0, 100.0, 106.0, 99.0, 105.0),
            // sell, no sell distance is allowed
            candle(240, 105.0, 105.5, 104.0, 104.5),
        ])
        .unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].side, Side::Buy);
    assert_eq!(report.skipped.filtered_distance, 1);
}

#[test]
fn excluded_time_still_closes_positions() {
    let half_past_one = NaiveTime::from_hms_opt(1, 30, 0).unwrap();
    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_excluded_time(TimeWindow::at(half_past_one));
    let simulator = TradeSimulator::new(config).unwrap();

    let mut ctx = simulator.context().unwrap();
    let opened = simulator.step(&mut ctx, &candle(0, 100.0, 106.0, 99.0, 105.0)).unwrap();
    assert_eq!(opened.opened, Some(0));

    let excluded = simulator.step(&mut ctx, &candle(90, 105.0, 113.0, 104.0, 112.0)).unwrap();
    assert_eq!(excluded.closed, vec![0]);
    assert_eq!(excluded.opened, None);
    assert_eq!(excluded.skipped, Some(SkipReason::ExcludedTime));
    assert_eq!(ctx.outcome(0).map(|o| o.exit_reason), Some(ExitReason::TakeProfit));
    assert_eq!(ctx.positions().count(), 0);
}

#[test]
fn doji_opens_nothing() {
    let simulator = simulator();
    let mut ctx = simulator.context().unwrap();
    let report = simulator.step(&mut ctx, &candle(0, 100.0, 101.0, 99.0, 100.0)).unwrap();
    assert_eq!(report.skipped, Some(SkipReason::Doji));
    assert_eq!(ctx.opened(), 0);
    assert_eq!(ctx.skipped().doji, 1);
}

#[test]
fn context_tracks_capital_between_steps() {
    let simulator = simulator();
    let mut ctx = simulator.context().unwrap();

    simulator.step(&mut ctx, &candle(0, 100.0, 106.0, 99.0, 105.0)).unwrap();
    assert_eq!(ctx.balance(), 1_000.0);
    assert!(approx(ctx.committed(), 100.0));
    assert!(approx(ctx.free_balance(), 900.0));
    assert!(ctx.outcome(0).is_none());

    // marked at 108: 3 points on 100/105 units
    simulator.step(&mut ctx, &candle(240, 105.0, 110.0, 104.0, 108.0)).unwrap();
    assert!(approx(ctx.unrealized_pnl(), 3.0 * 100.0 / 105.0));
    assert_eq!(ctx.candles_seen(), 2);
}

#[test]
fn end_of_data_as_loss() {
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 110.0, 104.0, 108.0),
    ];
    let report = simulator().run(&candles).unwrap();

    assert_eq!(report.open_at_end, 2);
    assert!(report.outcomes.iter().all(|o| o.exit_reason == ExitReason::EndOfData));
    assert!(report.outcomes.iter().all(|o| o.is_loss()));
    assert_eq!(report.outcomes[0].exit_price, 108.0);
    // a loss by classification, a gain in money
    assert!(report.outcomes[0].profit > 0.0);
    assert_eq!(report.capital, 1_000.0);
    assert!(approx(report.unrealized_pnl, 3.0 * 100.0 / 105.0));
    assert!(approx(report.final_capital(), 1_000.0 + 3.0 * 100.0 / 105.0));
}

#[test]
fn end_of_data_mark_to_market() {
    let config = SimulatorConfig::unfiltered(1_000.0, 10.0).with_end_of_data(EndOfDataPolicy::MarkToMarket);
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 110.0, 104.0, 108.0),
    ];
    let report = TradeSimulator::new(config).unwrap().run(&candles).unwrap();

    // 3 points on a 6 point risk
    assert_eq!(report.outcomes[0].reward_multiple, RewardMultiple::Win(0.5));
    // opened on the last close: nothing gained
    assert_eq!(report.outcomes[1].reward_multiple, RewardMultiple::Loss);
}

#[test]
fn reward_multiples_in_open_order() {
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(240, 105.0, 113.0, 104.0, 112.0),
    ];
    let report = simulator().run(&candles).unwrap();
    assert_eq!(
        report.reward_multiples(),
        vec![RewardMultiple::Win(1.0), RewardMultiple::Loss]
    );
}

#[test]
fn yearly_capital_snapshots() {
    let candles = [
        candle(0, 100.0, 106.0, 99.0, 105.0),
        candle(60 * 24 * 366, 105.0, 113.0, 104.0, 112.0),
    ];
    let report = simulator().run(&candles).unwrap();
    assert_eq!(report.yearly_capital.get(&2024), Some(&1_000.0));
    assert!(approx(report.yearly_capital[&2025], report.capital_history[0].1));
}

#[test]
fn empty_series() {
    assert!(matches!(simulator().run(&[]), Err(Error::CandleDataEmpty)));
}

#[test]
fn unordered_series() {
    let candles = [
        candle(240, 100.0, 106.0, 99.0, 105.0),
        candle(0, 105.0, 113.0, 104.0, 112.0),
    ];
    assert!(matches!(
        simulator().run(&candles),
        Err(Error::InvalidInputOrder { index: 1 })
    ));

    let simulator = simulator();
    let mut ctx = simulator.context().unwrap();
    simulator.step(&mut ctx, &candles[0]).unwrap();
    assert!(matches!(
        simulator.step(&mut ctx, &candles[1]),
        Err(Error::InvalidInputOrder { index: 1 })
    ));
}

#[test]
fn finish_without_candles() {
    let simulator = simulator();
    let ctx = simulator.context().unwrap();
    assert!(matches!(simulator.finish(ctx), Err(Error::CandleDataEmpty)));
}

#[test]
fn invalid_config_rejected() {
    let config = SimulatorConfig::unfiltered(-5.0, 10.0);
    assert!(matches!(TradeSimulator::new(config), Err(Error::NegZeroBalance(_))));
}
