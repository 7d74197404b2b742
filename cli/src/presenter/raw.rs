use std::io::{self, Write};

use wattwise_sources::{Reading, SourceError};

use super::Presenter;

/// One bare number per line, for scripts.
pub struct RawPresenter<W: Write> {
    out: W,
}

impl<W: Write> RawPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_watts(watts: f64) -> String {
    format!("{watts:.1}")
}

impl<W: Write> Presenter for RawPresenter<W> {
    fn reading(&mut self, reading: &Reading) -> io::Result<()> {
        writeln!(self.out, "{}", format_watts(reading.watts))?;
        self.out.flush()
    }

    fn transient(&mut self, _error: &SourceError) -> io::Result<()> {
        writeln!(self.out, "-")?;
        self.out.flush()
    }
}
