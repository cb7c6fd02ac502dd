//! CLI integration tests with real INI and CSV files on disk.
//!
//! Tests cover:
//! - Config parsing into engine and backtest configuration
//! - Data path resolution
//! - Full backtest command writing the trade log and summary
//! - Validation and scan exit codes

mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use trendpilot::adapters::file_config_adapter::FileConfigAdapter;
use trendpilot::cli::{self, Cli};
use trendpilot::domain::backtest::BacktestConfig;
use trendpilot::domain::lifecycle::{ExitPolicy, TrailMode};

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn staged_ini(data_file: &Path) -> String {
    format!(
        r#"
[strategy]
name = Spike Staged
profile = volume_momentum
short_ma_period = 2
mid_ma_period = 3
volume_period = 4
atr_period = 2
risk_fraction = 0.5
use_staged_exit = true
atr_stop_multiplier = 1.5
risk_reward_ratio = 1.5
use_trailing_stop = true
atr_trail_multiplier = 3.0

[backtest]
symbol = TEST
initial_capital = 10000
commission_pct = 0
data_file = {}
"#,
        data_file.display()
    )
}

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["trendpilot"];
    argv.extend_from_slice(args);
    cli::run(Cli::parse_from(argv))
}

mod config_loading {
    use super::*;

    #[test]
    fn staged_ini_builds_matching_config() {
        let adapter = FileConfigAdapter::from_string(&staged_ini(Path::new("bars.csv"))).unwrap();
        let engine = EngineConfig::from_port(&adapter).unwrap();
        assert_eq!(engine.name, "Spike Staged");
        assert_eq!(engine.indicators.short_ma_period, 2);
        assert_eq!(engine.indicators.mid_ma_period, 3);
        assert_eq!(
            engine.exit,
            ExitPolicy::Staged {
                stop_multiplier: 1.5,
                risk_reward_ratio: 1.5,
                trail: TrailMode::Atr { multiplier: 3.0 },
            }
        );
        assert_eq!(engine.profile, staged_config().profile);

        let bt = BacktestConfig::from_port(&adapter).unwrap();
        assert_eq!(bt.symbol, "TEST");
        assert!((bt.initial_capital - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(bt.commission_pct, 0.0);
    }

    #[test]
    fn data_file_comes_from_config_unless_overridden() {
        let adapter = FileConfigAdapter::from_string(&staged_ini(Path::new("bars.csv"))).unwrap();
        assert_eq!(
            cli::resolve_data_path(None, &adapter).unwrap(),
            Path::new("bars.csv")
        );
        assert_eq!(
            cli::resolve_data_path(Some(Path::new("other.csv")), &adapter).unwrap(),
            Path::new("other.csv")
        );

        let bare = FileConfigAdapter::from_string("[backtest]\nsymbol = TEST\n").unwrap();
        assert!(matches!(
            cli::resolve_data_path(None, &bare),
            Err(TrendpilotError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn bad_ma_order_is_rejected() {
        let ini = "[strategy]\nshort_ma_period = 10\nmid_ma_period = 5\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        assert!(matches!(
            EngineConfig::from_port(&adapter),
            Err(TrendpilotError::ConfigInvalid { .. })
        ));
    }
}

mod backtest_command {
    use super::*;

    #[test]
    fn writes_trade_log_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_bars(dir.path(), &staged_round_trip_bars());
        let ini = write_temp_ini(&staged_ini(&data));
        let out = dir.path().join("out");

        let code = run(&[
            "backtest",
            "--config",
            ini.path().to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);

        let trades = fs::read_to_string(out.join("trades.csv")).unwrap();
        let lines: Vec<&str> = trades.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("symbol,entry_time"));
        assert!(lines[1].starts_with("TEST,2024-03-04 09:37:00,11.0000,454,"));
        assert!(lines[1].ends_with(",408.60,8.18,trailing_stop"));

        let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
        assert!(summary.contains("strategy,Spike Staged\n"));
        assert!(summary.contains("exit_policy,staged\n"));
        assert!(summary.contains("total_trades,1\n"));
        assert!(summary.contains("final_equity,10408.60\n"));
        assert!(summary.contains("commission,0.00\n"));
        assert!(summary.contains("net_pnl,408.60\n"));
    }

    #[test]
    fn missing_data_file_exits_with_data_code() {
        let dir = tempfile::tempdir().unwrap();
        let ini = write_temp_ini(&staged_ini(&dir.path().join("absent.csv")));
        let code = run(&["backtest", "--config", ini.path().to_str().unwrap()]);
        assert_eq!(code, ExitCode::from(3));
    }

    #[test]
    fn missing_config_exits_with_config_code() {
        let code = run(&["backtest", "--config", "/nonexistent/trendpilot.ini"]);
        assert_eq!(code, ExitCode::from(2));
    }
}

mod other_commands {
    use super::*;

    #[test]
    fn validate_accepts_good_and_rejects_bad() {
        let good = write_temp_ini(&staged_ini(Path::new("bars.csv")));
        assert_eq!(
            run(&["validate", "--config", good.path().to_str().unwrap()]),
            ExitCode::SUCCESS
        );

        let bad = write_temp_ini("[strategy]\nrisk_fraction = 1.5\n");
        assert_eq!(
            run(&["validate", "--config", bad.path().to_str().unwrap()]),
            ExitCode::from(2)
        );

        let malformed = write_temp_ini(
            &staged_ini(Path::new("bars.csv")).replace("risk_fraction = 0.5", "risk_fraction = 0,5"),
        );
        assert_eq!(
            run(&["validate", "--config", malformed.path().to_str().unwrap()]),
            ExitCode::from(2)
        );
    }

    #[test]
    fn scan_reads_data_override() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_bars(dir.path(), &spike_bars());
        let ini = write_temp_ini(&staged_ini(Path::new("unused.csv")));
        let code = run(&[
            "scan",
            "--config",
            ini.path().to_str().unwrap(),
            "--data",
            data.to_str().unwrap(),
            "--last",
            "1",
        ]);
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
