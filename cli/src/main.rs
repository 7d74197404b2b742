mod commands;
mod config;
mod data;
mod logging;
mod poller;
mod presenter;
mod prompt;
mod theme;
mod ui;

use std::future::Future;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use color_eyre::Section;

use commands::monitor::MonitorOptions;
use config::{ConfigError, LogLevel, SourceKind, UserConfig};
use logging::LogMode;

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommands {
    /// Print the current configuration (default)
    Show,

    /// Set up Home Assistant and test the connection
    #[command(alias = "homeassistant")]
    Ha,

    /// Set up a Kasa smart plug, optionally picking one from a network scan
    Kasa,

    /// Restrict the config directory to your user (0700 dir, 0600 files)
    FixPermissions,

    /// Print the config file path
    Path,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

/// Watch smart-plug power usage from the terminal
///
/// Reads a TP-Link Kasa plug directly or any power sensor through Home Assistant.
#[derive(Debug, Parser)]
#[command(name = "wattwise", version, verbatim_doc_comment)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Keep polling and show a live chart
    #[arg(short, long)]
    watch: bool,

    /// Seconds between polls when watching
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=60))]
    interval: u64,

    /// Also show current (amperes) when the source reports it
    #[arg(short, long)]
    current: bool,

    /// Print only the watt value, one line per reading
    #[arg(long)]
    raw: bool,

    /// Force a data source instead of the configured one
    #[arg(short, long, value_enum)]
    source: Option<SourceKind>,

    /// Minutes of history used for chart trends
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=60))]
    minutes: Option<u64>,

    /// Scan the local network for Kasa plugs and exit
    #[arg(long)]
    discover: bool,

    /// Show synthetic readings instead of contacting a device
    #[arg(long)]
    mock: bool,

    /// Seconds to wait for discovery replies
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=60))]
    discover_timeout: u64,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    block_on_and_exit(run(cli))?
}

/// Runs `future` on a current-thread runtime, then drops the runtime without
/// waiting for blocking tasks. A cancelled Home Assistant request can still be
/// parked on the blocking pool and must not hold up exit.
fn block_on_and_exit<F: Future>(future: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn run(cli: Cli) -> Result<()> {
    let loaded = UserConfig::load();
    let level = loaded
        .as_ref()
        .map(|config| config.log_level)
        .unwrap_or_default();

    if let Some(Commands::Config { command }) = cli.command {
        let _guard = logging::init(level, LogMode::Stderr, cli.log_level);
        return match command.unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::Ha => commands::config::setup_home_assistant().await,
            ConfigCommands::Kasa => commands::config::setup_kasa().await,
            ConfigCommands::FixPermissions => commands::config::fix_permissions(),
            ConfigCommands::Path => commands::config::path(),
        };
    }

    if cli.discover {
        let _guard = logging::init(level, LogMode::Stderr, cli.log_level);
        let timeout = Duration::from_secs(cli.discover_timeout);
        return commands::discover::run(timeout).await;
    }

    let chart = cli.watch && !cli.raw && io::stdout().is_terminal();
    let mode = if chart { LogMode::File } else { LogMode::Stderr };
    let _guard = logging::init(level, mode, cli.log_level);

    let config = match startup(loaded, cli.raw, prompt::is_interactive(), cli.mock)? {
        Startup::Ready(config) => config,
        Startup::FirstRun(path) => commands::config::first_run(&path).await?,
    };

    let options = MonitorOptions {
        watch: cli.watch,
        interval: Duration::from_secs(cli.interval),
        show_current: cli.current,
        raw: cli.raw,
        chart,
        source: cli.source,
        trend_minutes: cli.minutes,
        mock: cli.mock,
    };
    commands::monitor::run(&config, &options).await
}

#[derive(Debug)]
enum Startup {
    Ready(UserConfig),
    /// No config yet and someone at the keyboard to set one up.
    FirstRun(PathBuf),
}

fn startup(
    loaded: Result<UserConfig, ConfigError>,
    raw: bool,
    interactive: bool,
    mock: bool,
) -> Result<Startup> {
    match loaded {
        Ok(config) => Ok(Startup::Ready(config)),
        Err(ConfigError::Missing(_)) if mock => Ok(Startup::Ready(UserConfig::default())),
        Err(ConfigError::Missing(path)) if !raw && interactive => Ok(Startup::FirstRun(path)),
        Err(e @ ConfigError::Missing(_)) => Err(e).suggestion(
            "Run `wattwise config ha` or `wattwise config kasa` to create a configuration",
        ),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Instant;

    use clap::CommandFactory;
    use wattwise_sources::homeassistant::{HomeAssistantConfig, HomeAssistantSource};

    use super::*;
    use crate::data::Backend;
    use crate::poller::{self, Mode};
    use crate::presenter::RawPresenter;

    fn missing() -> Result<UserConfig, ConfigError> {
        Err(ConfigError::Missing(PathBuf::from("/nonexistent/wattwise/config.toml")))
    }

    fn is_missing(report: &color_eyre::eyre::Report) -> bool {
        matches!(report.downcast_ref::<ConfigError>(), Some(ConfigError::Missing(_)))
    }

    #[test]
    fn test_missing_config_without_terminal_is_an_error() {
        let err = startup(missing(), false, false, false).unwrap_err();
        assert!(is_missing(&err), "{err:?}");
    }

    #[test]
    fn test_missing_config_in_raw_mode_is_an_error() {
        let err = startup(missing(), true, true, false).unwrap_err();
        assert!(is_missing(&err), "{err:?}");
    }

    #[test]
    fn test_missing_config_on_terminal_starts_setup() {
        assert!(matches!(
            startup(missing(), false, true, false).unwrap(),
            Startup::FirstRun(_)
        ));
    }

    #[test]
    fn test_mock_runs_without_config() {
        let Startup::Ready(config) = startup(missing(), true, false, true).unwrap() else {
            panic!("expected defaults");
        };
        assert_eq!(config, UserConfig::default());
    }

    #[test]
    fn test_invalid_config_is_never_replaced() {
        let err = startup(Err(ConfigError::Invalid("bad".into())), false, true, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_cancel_during_stalled_request_exits_promptly() {
        // Accepts connections through the backlog but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let config = HomeAssistantConfig {
            timeout: Duration::from_secs(10),
            ..HomeAssistantConfig::new(format!("http://{addr}"), "token", "sensor.desk_power")
        };
        let mut backend = Backend::HomeAssistant(HomeAssistantSource::new(config).unwrap());
        let mut presenter = RawPresenter::new(Vec::new());

        let started = Instant::now();
        let summary = block_on_and_exit(poller::run(
            &mut backend,
            &mut presenter,
            Mode::Continuous {
                interval: Duration::from_secs(1),
            },
            async { tokio::time::sleep(Duration::from_millis(200)).await },
        ))
        .unwrap()
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.readings, 0);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
        drop(listener);
    }

    #[test]
    fn test_mock_flag() {
        let cli = Cli::try_parse_from(["wattwise", "--mock", "-w"]).unwrap();
        assert!(cli.mock);
        assert!(cli.watch);
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_interval_bounds() {
        assert!(Cli::try_parse_from(["wattwise", "-w", "-i", "60"]).is_ok());
        assert!(Cli::try_parse_from(["wattwise", "-w", "-i", "0"]).is_err());
        assert!(Cli::try_parse_from(["wattwise", "-w", "-i", "61"]).is_err());
    }

    #[test]
    fn test_source_values() {
        let cli = Cli::try_parse_from(["wattwise", "--source", "ha", "--raw"]).unwrap();
        assert_eq!(cli.source, Some(SourceKind::HomeAssistant));
        assert!(cli.raw);

        let cli = Cli::try_parse_from(["wattwise", "-s", "kasa"]).unwrap();
        assert_eq!(cli.source, Some(SourceKind::Kasa));
    }

    #[test]
    fn test_config_subcommand_defaults_to_show() {
        let cli = Cli::try_parse_from(["wattwise", "config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config { command: None })));

        let cli = Cli::try_parse_from(["wattwise", "config", "fix-permissions"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                command: Some(ConfigCommands::FixPermissions)
            })
        ));
    }
}
