use std::io::{self, Write};

use crossterm::style::Stylize;
use wattwise_sources::{Reading, SourceError};

use super::{PowerLevel, Presenter, Thresholds};
use crate::theme::{to_crossterm, ThemeColors};

/// Human-readable lines, colored by power level.
pub struct TextPresenter<W: Write> {
    out: W,
    theme: ThemeColors,
    thresholds: Thresholds,
    source: String,
    show_current: bool,
}

impl<W: Write> TextPresenter<W> {
    pub fn new(
        out: W,
        theme: ThemeColors,
        thresholds: Thresholds,
        source: impl Into<String>,
        show_current: bool,
    ) -> Self {
        Self {
            out,
            theme,
            thresholds,
            source: source.into(),
            show_current,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for TextPresenter<W> {
    fn reading(&mut self, reading: &Reading) -> io::Result<()> {
        let level = PowerLevel::classify(reading.watts, &self.thresholds);
        let color = to_crossterm(self.theme.level(level));

        writeln!(
            self.out,
            "Power Usage: {}",
            format!("{:.2} W", reading.watts).with(color).bold()
        )?;

        if self.show_current {
            match reading.amperes {
                Some(amps) => writeln!(self.out, "Current: {amps:.2} A")?,
                None => writeln!(self.out, "{}", "Current: not reported by source".dim())?,
            }
        }

        writeln!(
            self.out,
            "{}",
            format!(
                "{} · {}",
                self.source,
                reading.timestamp.format("%Y-%m-%d %H:%M:%S")
            )
            .dim()
        )?;
        self.out.flush()
    }

    fn transient(&mut self, error: &SourceError) -> io::Result<()> {
        writeln!(self.out, "{}", format!("— {error}").dim())?;
        self.out.flush()
    }
}
