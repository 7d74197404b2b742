use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use color_eyre::eyre::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use tracing::{info, warn};

use crate::config::{self, SourceKind, UserConfig};
use crate::data::{Backend, History};
use crate::poller::{self, Mode, PollError, Summary};
use crate::presenter::{
    ChartPresenter, ChartState, Presenter, RawPresenter, TextPresenter, Thresholds,
};
use crate::theme::ThemeColors;

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub watch: bool,
    pub interval: Duration,
    pub show_current: bool,
    pub raw: bool,
    /// Full-screen chart; only when watching on a terminal without `--raw`.
    pub chart: bool,
    pub source: Option<SourceKind>,
    pub trend_minutes: Option<u64>,
    /// Synthetic readings instead of a real backend.
    pub mock: bool,
}

impl MonitorOptions {
    fn mode(&self) -> Mode {
        if self.watch {
            Mode::Continuous {
                interval: self.interval,
            }
        } else {
            Mode::Single
        }
    }
}

pub async fn run(config: &UserConfig, options: &MonitorOptions) -> Result<()> {
    let mut backend = if options.mock {
        Backend::mock()
    } else {
        let token = config::load_token()?;
        Backend::select(
            config,
            options.source,
            token.as_deref(),
            options.show_current,
        )?
    };
    let label = backend.label(config);
    let theme = ThemeColors::for_display(&config.display)?;
    let thresholds = Thresholds::from(&config.display);
    let mode = options.mode();

    info!(source = %label, kind = ?backend.kind(), ?mode, raw = options.raw, "Monitoring");

    let summary = if options.raw {
        let mut presenter = RawPresenter::new(io::stdout());
        present(&mut backend, &mut presenter, mode, interrupted()).await?
    } else if options.chart {
        let trend_minutes = options
            .trend_minutes
            .unwrap_or(config.display.trend_minutes)
            .max(1);
        let state = ChartState {
            history: History::new(config.display.history_size),
            theme,
            thresholds,
            source: label,
            show_current: options.show_current,
            trend_window: Duration::from_secs(trend_minutes.saturating_mul(60)),
            interval: options.interval,
            started: Instant::now(),
            last_update: None,
            last_error: None,
        };
        let mut presenter = ChartPresenter::new(state)?;
        present(&mut backend, &mut presenter, mode, chart_shutdown()).await?
    } else {
        let mut presenter =
            TextPresenter::new(io::stdout(), theme, thresholds, label, options.show_current);
        present(&mut backend, &mut presenter, mode, interrupted()).await?
    };

    if summary.cancelled && !options.raw {
        println!("Monitoring stopped.");
    }
    Ok(())
}

/// Runs the poller and always lets the presenter clean up, so the terminal
/// is restored before any error is reported.
async fn present<P, F>(
    backend: &mut Backend,
    presenter: &mut P,
    mode: Mode,
    shutdown: F,
) -> Result<Summary, PollError>
where
    P: Presenter,
    F: Future<Output = ()>,
{
    let outcome = poller::run(backend, presenter, mode, shutdown).await;
    let finished = presenter.finish();
    let summary = outcome?;
    finished?;
    Ok(summary)
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Raw mode swallows SIGINT, so the chart also watches for quit keys.
async fn chart_shutdown() {
    tokio::select! {
        _ = interrupted() => {}
        _ = quit_key() => {}
    }
}

async fn quit_key() {
    let mut events = EventStream::new();
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Key(key)) if is_quit(&key) => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Terminal event stream failed");
                break;
            }
        }
    }
    std::future::pending::<()>().await
}

fn is_quit(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
