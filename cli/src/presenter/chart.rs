//! Full-screen live chart.

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tracing::{debug, trace};
use wattwise_sources::{Reading, SourceError};

use super::{Presenter, Thresholds};
use crate::data::History;
use crate::theme::ThemeColors;
use crate::ui;

/// Everything the chart view draws from.
pub struct ChartState {
    pub history: History,
    pub theme: ThemeColors,
    pub thresholds: Thresholds,
    pub source: String,
    pub show_current: bool,
    pub trend_window: Duration,
    pub interval: Duration,
    pub started: Instant,
    pub last_update: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

impl ChartState {
    pub fn latest(&self) -> Option<&Reading> {
        self.history.latest()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs(self.started.elapsed().as_secs())
    }
}

pub struct ChartPresenter {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: ChartState,
    restored: bool,
}

impl ChartPresenter {
    pub fn new(state: ChartState) -> io::Result<Self> {
        let terminal = setup_terminal()?;
        let mut presenter = Self {
            terminal,
            state,
            restored: false,
        };
        presenter.draw()?;
        Ok(presenter)
    }

    fn draw(&mut self) -> io::Result<()> {
        let state = &self.state;
        self.terminal.draw(|frame| ui::render(frame, state))?;
        trace!(points = state.history.len(), "Chart redrawn");
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        restore_terminal(&mut self.terminal)
    }
}

impl Presenter for ChartPresenter {
    fn reading(&mut self, reading: &Reading) -> io::Result<()> {
        self.state.history.record(*reading);
        self.state.last_update = Some(reading.timestamp);
        self.state.last_error = None;
        self.draw()
    }

    fn transient(&mut self, error: &SourceError) -> io::Result<()> {
        self.state.last_error = Some(error.to_string());
        self.draw()
    }

    fn finish(&mut self) -> io::Result<()> {
        debug!(points = self.state.history.len(), "Leaving chart view");
        self.restore()
    }
}

impl Drop for ChartPresenter {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
