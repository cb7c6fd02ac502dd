//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, CsvReportAdapter, CsvTradeLog};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult};
use crate::domain::config::EngineConfig;
use crate::domain::engine::scan;
use crate::domain::error::TrendpilotError;
use crate::domain::lifecycle::{ExitPolicy, TrailMode};
use crate::domain::ohlcv::Bar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::BarSource;
use crate::ports::report_port::ReportPort;
use crate::runner::run_backtest;

#[derive(Parser, Debug)]
#[command(name = "trendpilot", about = "Momentum and trend signal engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and write the trade log and summary
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar CSV, overrides [backtest] data_file
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Directory for the trade log and summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the bars where the entry rule fires
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Only print the most recent N signals
        #[arg(long)]
        last: Option<usize>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            output,
        } => run_backtest_command(&config, data.as_deref(), output.as_deref()),
        Command::Scan { config, data, last } => run_scan(&config, data.as_deref(), last),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &TrendpilotError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// `--data` wins over `[backtest] data_file`.
pub fn resolve_data_path(
    override_path: Option<&Path>,
    config: &dyn ConfigPort,
) -> Result<PathBuf, TrendpilotError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    config
        .get_string("backtest", "data_file")
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| TrendpilotError::ConfigMissing {
            section: "backtest".into(),
            key: "data_file".into(),
        })
}

/// Relative configured paths land inside `output_dir` when one is given.
pub fn resolve_output(output_dir: Option<&Path>, configured: Option<&str>, default_name: &str) -> PathBuf {
    let file = PathBuf::from(configured.unwrap_or(default_name));
    match output_dir {
        Some(dir) if file.is_relative() => dir.join(file),
        _ => file,
    }
}

fn load_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>, ExitCode> {
    eprintln!("Loading bars from {}", path.display());
    let bars = CsvAdapter::new(path).fetch_bars(symbol).map_err(|e| fail(&e))?;
    if bars.is_empty() {
        eprintln!("error: no bars in {}", path.display());
        return Err(ExitCode::from(3));
    }
    Ok(bars)
}

fn run_backtest_command(config_path: &Path, data: Option<&Path>, output: Option<&Path>) -> ExitCode {
    // Stage 1: config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let engine_config = match EngineConfig::from_port(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let bt_config = match BacktestConfig::from_port(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Strategy: {} ({}, exit {})",
        engine_config.name,
        engine_config.profile.name(),
        engine_config.exit.name()
    );

    // Stage 2: data
    let data_path = match resolve_data_path(data, &adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let bars = match load_bars(&data_path, &bt_config.symbol) {
        Ok(b) => b,
        Err(code) => return code,
    };

    // Stage 3: outputs
    if let Some(dir) = output {
        if let Err(e) = fs::create_dir_all(dir) {
            return fail(&TrendpilotError::Io(e));
        }
    }
    let trade_log_path = resolve_output(output, bt_config.trade_log.as_deref(), "trades.csv");
    let summary_path = resolve_output(output, bt_config.summary_report.as_deref(), "summary.csv");

    // Stage 4: run
    eprintln!(
        "Running backtest: {} bars of {}, {} to {}",
        bars.len(),
        bt_config.symbol,
        bars[0].timestamp,
        bars[bars.len() - 1].timestamp
    );
    let mut sink = CsvTradeLog::new(&trade_log_path);
    let result = run_backtest(&bars, &engine_config, &bt_config, &mut sink);
    print_summary(&result);

    // Stage 5: report
    let Some(summary) = summary_path.to_str() else {
        eprintln!("error: summary path is not valid UTF-8");
        return ExitCode::from(1);
    };
    if let Err(e) = CsvReportAdapter.write(&result, &engine_config, summary) {
        return fail(&e);
    }
    eprintln!("\nTrade log: {}", trade_log_path.display());
    eprintln!("Summary:   {}", summary_path.display());
    ExitCode::SUCCESS
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== Results ===");
    eprintln!("Gross PnL:        {:.2}", m.gross_pnl);
    eprintln!("Commission:       {:.2}", m.commission);
    eprintln!("Net PnL:          {:.2}", m.net_pnl);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Final Equity:     {:.2}", m.final_equity);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0);
    eprintln!("Sharpe (per bar): {:.4}", m.sharpe_ratio);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    if !result.failures.is_empty() {
        eprintln!("\n{} bar(s) failed:", result.failures.len());
        for f in &result.failures {
            eprintln!("  {}: {}", f.timestamp, f.error);
        }
    }
}

fn run_scan(config_path: &Path, data: Option<&Path>, last: Option<usize>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let engine_config = match EngineConfig::from_port(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let data_path = match resolve_data_path(data, &adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let symbol = adapter
        .get_string("backtest", "symbol")
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let bars = match load_bars(&data_path, &symbol) {
        Ok(b) => b,
        Err(code) => return code,
    };

    let hits = scan(&bars, &engine_config);
    eprintln!(
        "{} signal(s) for {} with {}",
        hits.len(),
        symbol,
        engine_config.profile.name()
    );
    let skip = last.map_or(0, |n| hits.len().saturating_sub(n));

    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
    println!("timestamp,close,volume_ratio,short_ma,mid_ma,pattern");
    for hit in &hits[skip..] {
        println!(
            "{},{:.4},{},{},{},{}",
            hit.timestamp.format("%Y-%m-%d %H:%M:%S"),
            hit.close,
            fmt(hit.volume_ratio),
            fmt(hit.short_ma),
            fmt(hit.mid_ma),
            hit.pattern
        );
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let engine_config = match EngineConfig::from_port(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let p = &engine_config.indicators;
    eprintln!("\nStrategy: {}", engine_config.name);
    eprintln!("  Profile:   {}", engine_config.profile.name());
    eprintln!(
        "  Averages:  {} {}/{}{}",
        p.ma_kind,
        p.short_ma_period,
        p.mid_ma_period,
        p.long_ma_period.map(|l| format!("/{l}")).unwrap_or_default()
    );
    eprintln!("  Volume:    {} bars", p.volume_period);
    eprintln!("  ATR:       {} bars ({:?})", p.atr_period, p.atr_mode);
    eprintln!("  Exit:      {}", describe_exit(&engine_config.exit));
    eprintln!("  Risk:      {:.0}% of capital", engine_config.risk_fraction * 100.0);

    if adapter.get_string("backtest", "symbol").is_some() {
        match BacktestConfig::from_port(&adapter) {
            Ok(bt) => {
                eprintln!("\nBacktest: {}", bt.symbol);
                eprintln!("  Capital:    {:.2}", bt.initial_capital);
                eprintln!("  Commission: {:.4}%", bt.commission_pct * 100.0);
            }
            Err(e) => return fail(&e),
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

pub fn describe_exit(exit: &ExitPolicy) -> String {
    match exit {
        ExitPolicy::PercentBand {
            take_profit_pct,
            stop_loss_pct,
        } => format!(
            "market exit at +{:.2}% / -{:.2}%",
            take_profit_pct * 100.0,
            stop_loss_pct * 100.0
        ),
        ExitPolicy::AtrBracket {
            stop_multiplier,
            take_profit_multiplier,
        } => format!("bracket: stop {stop_multiplier}x ATR, target {take_profit_multiplier}x ATR"),
        ExitPolicy::Staged {
            stop_multiplier,
            risk_reward_ratio,
            trail,
        } => {
            let stage_two = match trail {
                TrailMode::Atr { multiplier } => format!("trailing {multiplier}x ATR"),
                TrailMode::Breakeven => "breakeven stop".to_string(),
            };
            format!(
                "staged: stop {stop_multiplier}x ATR, half off at {risk_reward_ratio}R, then {stage_two}"
            )
        }
    }
}
