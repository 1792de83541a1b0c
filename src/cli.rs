//! CLI definition and dispatch.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::candle_cache::CandleCache;
use crate::adapters::csv_adapter::{CsvCandleAdapter, CsvPositionAdapter};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::csv_weight_adapter::{self, CsvWeightTable};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::algorithm_input::{AlgorithmSettings, HourScore, algorithm_input};
use crate::domain::backtest::{HourComparison, RunResult, per_hour_breakdown, run_what_if};
use crate::domain::config::{
    BreakevenMove, FeeSchedule, MAX_TAKE_PROFIT_TIERS, RsiScaleOut, SimulationConfig, TakeProfitTier,
    TrailingStop,
};
use crate::domain::config_validation::require_days;
use crate::domain::error::LiqsimError;
use crate::domain::filter::PositionFilter;
use crate::domain::metrics::{
    RMultipleWeights, Summary, equity_curve, hourly_breakdown, rolling_windows, strategy_breakdown,
    weekday_breakdown,
};
use crate::domain::position::{CandidatePosition, StrategyTag};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{CandleSource, PositionSource};
use crate::ports::report_port::{ReportPort, RunReport};
use crate::ports::weight_port::{UniformWeight, WeightLookup};

#[derive(Parser, Debug)]
#[command(name = "liqsim", about = "What-if backtester for liquidation-triggered positions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay every matching position and report the portfolio outcome
    WhatIf {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for the CSV report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare live and fully reversed trading per start hour
    PerHour {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Score each hour of day and write a weight table
    AlgorithmInput {
        #[arg(short, long)]
        config: PathBuf,
        /// YYYY-MM-DD
        #[arg(long)]
        as_of: NaiveDate,
        #[arg(long, default_value = "live")]
        strategy: StrategyTag,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::WhatIf { config, output } => run_what_if_command(&config, output.as_deref()),
        Command::PerHour { config, output } => run_per_hour(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::AlgorithmInput {
            config,
            as_of,
            strategy,
            output,
        } => run_algorithm_input(&config, as_of, strategy, output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, LiqsimError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn parse_value<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, LiqsimError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    config
        .get_string(section, key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| LiqsimError::invalid(section, key, e.to_string()))
        })
        .transpose()
}

fn parse_list<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Vec<T>, LiqsimError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    config
        .get_list(section, key)
        .iter()
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| LiqsimError::invalid(section, key, format!("'{raw}': {e}")))
        })
        .collect()
}

/// Accepts `YYYY-MM-DD` (midnight) or `YYYY-MM-DD HH:MM:SS`.
fn parse_instant(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDateTime>, LiqsimError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map(Some)
        .map_err(|_| LiqsimError::invalid(section, key, "expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"))
}

fn build_tiers(config: &dyn ConfigPort) -> Result<Vec<TakeProfitTier>, LiqsimError> {
    const SECTION: &str = "take_profit_tiers";
    if !config.get_bool(SECTION, "enabled", true)? {
        return Ok(Vec::new());
    }

    let overflow = format!("tp{}", MAX_TAKE_PROFIT_TIERS + 1);
    if config.get_string(SECTION, &overflow).is_some() {
        return Err(LiqsimError::invalid(
            SECTION,
            &overflow,
            format!("at most {MAX_TAKE_PROFIT_TIERS} tiers"),
        ));
    }

    let mut tiers = Vec::new();
    let mut any_configured = false;
    for n in 1..=MAX_TAKE_PROFIT_TIERS {
        let key = format!("tp{n}");
        let Some(trigger_pct) = parse_value::<f64>(config, SECTION, &key)? else {
            continue;
        };
        any_configured = true;
        if !config.get_bool(SECTION, &format!("use_tp{n}"), true)? {
            continue;
        }
        let amount_key = format!("tp{n}_amount");
        let amount_pct = parse_value::<f64>(config, SECTION, &amount_key)?.ok_or_else(|| {
            LiqsimError::ConfigMissing {
                section: SECTION.into(),
                key: amount_key.clone(),
            }
        })?;
        tiers.push(TakeProfitTier {
            trigger_pct,
            amount_pct,
        });
    }

    if any_configured {
        Ok(tiers)
    } else {
        Ok(SimulationConfig::default().take_profit_tiers)
    }
}

pub fn build_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, LiqsimError> {
    let defaults = SimulationConfig::default();
    const SIM: &str = "simulation";

    let trailing_stop = if config.get_bool("trailing_stop", "enabled", false)? {
        Some(TrailingStop {
            pct: config.get_double("trailing_stop", "pct", 1.0)?,
        })
    } else {
        None
    };
    let breakeven = if config.get_bool("breakeven", "enabled", false)? {
        Some(BreakevenMove {
            trigger_pct: config.get_double("breakeven", "trigger_pct", 50.0)?,
        })
    } else {
        None
    };

    let rsi = if config.get_bool("rsi", "enabled", false)? {
        let d = RsiScaleOut::default();
        Some(RsiScaleOut {
            lower: config.get_double("rsi", "lower", d.lower)?,
            upper: config.get_double("rsi", "upper", d.upper)?,
            sell_pct: config.get_double("rsi", "sell_pct", d.sell_pct)?,
            period: parse_value(config, "rsi", "period")?.unwrap_or(d.period),
            activation_pct: config.get_double("rsi", "activation_pct", d.activation_pct)?,
        })
    } else {
        None
    };

    let fee_defaults = FeeSchedule::default();

    Ok(SimulationConfig {
        stop_loss_pct: config.get_double(SIM, "stop_loss", defaults.stop_loss_pct)?,
        take_profit_pct: config.get_double(SIM, "take_profit", defaults.take_profit_pct)?,
        take_profit_tiers: build_tiers(config)?,
        trailing_stop,
        breakeven,
        rsi,
        compound: config.get_bool(SIM, "compound", defaults.compound)?,
        percentage_per_trade: config.get_double(SIM, "percentage_per_trade", defaults.percentage_per_trade)?,
        no_overlap: config.get_bool(SIM, "no_overlap", defaults.no_overlap)?,
        reversal: parse_value(config, SIM, "reversal")?.unwrap_or(defaults.reversal),
        horizon_days: config.get_int(SIM, "horizon_days", defaults.horizon_days)?,
        slippage_pct: config.get_double(SIM, "slippage_pct", defaults.slippage_pct)?,
        take_profit_trigger: parse_value(config, SIM, "take_profit_trigger")?.unwrap_or(defaults.take_profit_trigger),
        fees: FeeSchedule {
            limit_rate: config.get_double("fees", "limit_rate", fee_defaults.limit_rate)?,
            market_rate: config.get_double("fees", "market_rate", fee_defaults.market_rate)?,
        },
        initial_capital: config.get_double(SIM, "initial_capital", defaults.initial_capital)?,
    })
}

pub fn build_filter(config: &dyn ConfigPort) -> Result<PositionFilter, LiqsimError> {
    const F: &str = "filter";

    let hours: Vec<u32> = parse_list(config, F, "hours")?;
    if let Some(bad) = hours.iter().find(|h| **h > 23) {
        return Err(LiqsimError::invalid(F, "hours", format!("hour {bad} out of range 0..=23")));
    }

    Ok(PositionFilter {
        side: parse_value(config, F, "side")?,
        timeframe: config.get_string(F, "timeframe"),
        strategies: parse_list(config, F, "strategies")?,
        start_from: parse_instant(config, F, "start_from")?,
        start_before: parse_instant(config, F, "start_before")?,
        hours,
        weekdays: parse_list::<Weekday>(config, F, "weekdays")?,
        min_liquidation_amount: parse_value(config, F, "min_liquidation_amount")?,
        max_liquidation_amount: parse_value(config, F, "max_liquidation_amount")?,
        min_candles_before_entry: parse_value(config, F, "min_candles_before_entry")?,
        max_candles_before_entry: parse_value(config, F, "max_candles_before_entry")?,
    })
}

pub fn build_fee_drag(config: &dyn ConfigPort) -> Result<RMultipleWeights, LiqsimError> {
    let d = RMultipleWeights::default();
    Ok(RMultipleWeights {
        win_fee_drag: config.get_double("statistics", "win_fee_drag", d.win_fee_drag)?,
        loss_fee_drag: config.get_double("statistics", "loss_fee_drag", d.loss_fee_drag)?,
    })
}

/// Window lengths in days for the rolling statistics.
pub fn build_rolling_windows(config: &dyn ConfigPort) -> Result<Vec<i64>, LiqsimError> {
    const S: &str = "statistics";
    if config.get_list(S, "rolling_windows").is_empty() {
        return Ok(vec![90, 180]);
    }
    let windows: Vec<i64> = parse_list(config, S, "rolling_windows")?;
    for days in &windows {
        require_days(S, "rolling_windows", *days)?;
    }
    Ok(windows)
}

pub fn build_algorithm_settings(config: &dyn ConfigPort) -> Result<AlgorithmSettings, LiqsimError> {
    const A: &str = "algorithm";
    let d = AlgorithmSettings::default();
    let settings = AlgorithmSettings {
        lookback_days: config.get_int(A, "lookback_days", d.lookback_days)?,
        short_window_days: config.get_int(A, "short_window_days", d.short_window_days)?,
        horizon_days: config.get_int(A, "horizon_days", d.horizon_days)?,
        slippage_pct: config.get_double("simulation", "slippage_pct", d.slippage_pct)?,
        fee_drag: build_fee_drag(config)?,
        min_score: config.get_double(A, "min_score", d.min_score)?,
        ..d
    };
    settings.validate()?;
    Ok(settings)
}

type Sources = (Box<dyn CandleSource + Sync>, Box<dyn PositionSource>);

fn open_sources(config: &dyn ConfigPort) -> Result<Sources, LiqsimError> {
    let backend = config.get_string("data", "source").unwrap_or_else(|| "csv".into());
    match backend.as_str() {
        "csv" => {
            let candles_dir = config
                .get_string("data", "candles_dir")
                .ok_or_else(|| LiqsimError::ConfigMissing {
                    section: "data".into(),
                    key: "candles_dir".into(),
                })?;
            let positions_file = config
                .get_string("data", "positions_file")
                .ok_or_else(|| LiqsimError::ConfigMissing {
                    section: "data".into(),
                    key: "positions_file".into(),
                })?;
            Ok((
                Box::new(CsvCandleAdapter::new(PathBuf::from(candles_dir))),
                Box::new(CsvPositionAdapter::new(PathBuf::from(positions_file))),
            ))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            let adapter = SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok((Box::new(adapter.clone()), Box::new(adapter)))
        }
        other => Err(LiqsimError::invalid("data", "source", format!("unsupported source '{other}'"))),
    }
}

fn open_weights(config: &dyn ConfigPort) -> Result<Box<dyn WeightLookup + Sync>, LiqsimError> {
    match config.get_string("data", "weights_dir") {
        Some(dir) => {
            let table = CsvWeightTable::load(&dir)?;
            if table.is_empty() {
                eprintln!("warning: no weight tables in {dir}, every hour is skipped");
            }
            Ok(Box::new(table))
        }
        None => Ok(Box::new(UniformWeight)),
    }
}

/// Loads positions and wraps the candle source in a prefetched cache.
fn load_inputs(
    config: &dyn ConfigPort,
    filter: &PositionFilter,
    horizon_days: i64,
) -> Result<(Vec<CandidatePosition>, CandleCache<Box<dyn CandleSource + Sync>>), LiqsimError> {
    let (candles, positions) = open_sources(config)?;
    let candidates = positions.fetch_positions(filter)?;
    eprintln!("Loaded {} candidate positions", candidates.len());

    let mut cache = CandleCache::new(candles);
    if config.get_bool("data", "prefetch", true)? {
        cache.prefetch_positions(&candidates, horizon_days)?;
    }
    Ok((candidates, cache))
}

fn output_dir(config: &dyn ConfigPort, flag: Option<&Path>) -> Option<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| config.get_string("data", "output_dir").map(PathBuf::from))
}

fn print_summary(summary: &Summary, result: &RunResult) {
    eprintln!("\n=== What-if Results ===");
    eprintln!("Trades:           {}", summary.trades);
    eprintln!("Wins / Losses:    {} / {}", summary.wins, summary.losses);
    eprintln!("Win Ratio:        {:.2}%", summary.ratio * 100.0);
    eprintln!("Final Capital:    {:.2}", summary.final_capital);
    eprintln!("Total Return:     {:.2}", summary.total_return);
    eprintln!("Avg Return:       {:.2}", summary.average_return);
    eprintln!("Reward/Trade:     {:.2}%", summary.reward_per_trade);
    eprintln!("Longest Win Run:  {}", summary.longest_win_streak);
    eprintln!("Longest Loss Run: {}", summary.longest_loss_streak);
    eprintln!("R Multiple:       {:.2}", summary.r_multiple);
    if !result.skipped.is_empty() || !result.unclosed.is_empty() {
        eprintln!(
            "Skipped:          {} (still open: {})",
            result.skipped.len(),
            result.unclosed.len()
        );
    }
}

fn run_what_if_command(config_path: &Path, output: Option<&Path>) -> Result<(), LiqsimError> {
    let adapter = load_config(config_path)?;
    let sim = build_simulation_config(&adapter)?;
    sim.validate()?;
    let filter = build_filter(&adapter)?;
    let weights = open_weights(&adapter)?;
    let fee_drag = build_fee_drag(&adapter)?;
    let windows = build_rolling_windows(&adapter)?;

    let (candidates, cache) = load_inputs(&adapter, &filter, sim.horizon_days)?;
    let result = run_what_if(&candidates, &cache, &sim, weights.as_ref())?;

    let ratio = sim.reward_ratio();
    let summary = Summary::compute(&result.run, &result.results, ratio, fee_drag);
    print_summary(&summary, &result);
    for (tag, stats) in strategy_breakdown(&result.results, ratio, fee_drag) {
        if stats.trades > 0 {
            eprintln!(
                "  {:<10} {} trades, {:.2}% won, R {:.2}",
                tag.as_str(),
                stats.trades,
                stats.ratio * 100.0,
                stats.r_multiple
            );
        }
    }

    let Some(dir) = output_dir(&adapter, output) else {
        return Ok(());
    };

    let curve = equity_curve(&result.equity, sim.initial_capital);
    let hourly = hourly_breakdown(&result.results, ratio, fee_drag);
    let weekdays = weekday_breakdown(&result.results, ratio, fee_drag);

    let as_of = match parse_value::<NaiveDate>(&adapter, "statistics", "as_of")? {
        Some(date) => Some(date),
        None => result
            .results
            .iter()
            .map(|r| r.start.date())
            .max()
            .and_then(|d| d.checked_add_days(Days::new(1))),
    };
    let rolling = as_of
        .map(|d| rolling_windows(&result.results, d, &windows, ratio, fee_drag))
        .transpose()?
        .unwrap_or_default();

    let report = RunReport {
        result: &result,
        summary: &summary,
        equity_curve: &curve,
        hourly: &hourly,
        weekdays: &weekdays,
        rolling: &rolling,
    };
    CsvReportAdapter.write_run(&report, &dir)?;
    eprintln!("\nReport written to: {}", dir.display());
    Ok(())
}

fn print_per_hour(rows: &[HourComparison]) {
    eprintln!("\nhour  live(n)  live%   liveR   rev(n)  rev%    revR");
    for r in rows {
        eprintln!(
            "{:>4}  {:>7}  {:>5.1}  {:>6.2}  {:>6}  {:>5.1}  {:>6.2}",
            r.hour,
            r.live.trades,
            r.live.ratio * 100.0,
            r.live.r_multiple,
            r.reversed.trades,
            r.reversed.ratio * 100.0,
            r.reversed.r_multiple,
        );
    }
}

fn run_per_hour(config_path: &Path, output: Option<&Path>) -> Result<(), LiqsimError> {
    let adapter = load_config(config_path)?;
    let sim = build_simulation_config(&adapter)?;
    sim.validate()?;
    let filter = build_filter(&adapter)?;
    let weights = open_weights(&adapter)?;

    let (candidates, cache) = load_inputs(&adapter, &filter, sim.horizon_days)?;
    let rows = per_hour_breakdown(&candidates, &cache, &sim, weights.as_ref())?;
    print_per_hour(&rows);

    if let Some(path) = output {
        CsvReportAdapter.write_per_hour(&rows, path)?;
        eprintln!("\nPer-hour table written to: {}", path.display());
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), LiqsimError> {
    let adapter = load_config(config_path)?;
    let sim = build_simulation_config(&adapter)?;
    sim.validate()?;
    let filter = build_filter(&adapter)?;
    build_rolling_windows(&adapter)?;
    build_algorithm_settings(&adapter)?;

    eprintln!("\nSimulation:");
    eprintln!("  stop loss / take profit: {}% / {}%", sim.stop_loss_pct, sim.take_profit_pct);
    for (i, tier) in sim.take_profit_tiers.iter().enumerate() {
        eprintln!("  tp{}: {}% of distance, close {}%", i + 1, tier.trigger_pct, tier.amount_pct);
    }
    if let Some(t) = sim.trailing_stop {
        eprintln!("  trailing stop: {}%", t.pct);
    }
    if let Some(b) = sim.breakeven {
        eprintln!("  breakeven at {}% of distance", b.trigger_pct);
    }
    if let Some(r) = sim.rsi {
        eprintln!("  rsi({}) {}/{} sell {}%", r.period, r.lower, r.upper, r.sell_pct);
    }
    eprintln!("  reversal: {:?}, horizon {} days", sim.reversal, sim.horizon_days);
    if filter != PositionFilter::default() {
        eprintln!("\nFilter: {filter:?}");
    }
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn print_algorithm_input(rows: &[HourScore]) {
    eprintln!("\nhour  trades  trade  weight  tp    sl");
    for r in rows {
        let (tp, sl) = r.best.map_or((String::new(), String::new()), |(tp, sl)| {
            (tp.to_string(), sl.to_string())
        });
        eprintln!(
            "{:>4}  {:>6}  {:>5}  {:>6}  {:<4}  {}",
            r.hour,
            r.trades,
            r.trade,
            r.weight.map(|w| format!("{w:.2}")).unwrap_or_default(),
            tp,
            sl,
        );
    }
}

fn run_algorithm_input(
    config_path: &Path,
    as_of: NaiveDate,
    strategy: StrategyTag,
    output: Option<&Path>,
) -> Result<(), LiqsimError> {
    let adapter = load_config(config_path)?;
    let settings = build_algorithm_settings(&adapter)?;
    let filter = PositionFilter {
        strategies: vec![strategy],
        ..build_filter(&adapter)?
    };

    let (candidates, cache) = load_inputs(&adapter, &filter, settings.horizon_days)?;
    eprintln!("Scoring {} positions as of {as_of} ({strategy})", candidates.len());
    let rows = algorithm_input(&candidates, &cache, as_of, &settings)?;
    print_algorithm_input(&rows);

    let file_name = csv_weight_adapter::file_name(as_of, strategy);
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => adapter
            .get_string("data", "weights_dir")
            .map_or_else(|| PathBuf::from(&file_name), |dir| Path::new(&dir).join(&file_name)),
    };
    CsvReportAdapter.write_algorithm_input(&rows, &path)?;
    eprintln!("\nAlgorithm input written to: {}", path.display());
    Ok(())
}
