//! Drives a [`ReadingSource`] and feeds each outcome to a [`Presenter`].
//!
//! Only one fetch is ever in flight. Cancellation is honoured while a fetch
//! is pending and while waiting for the next tick, and the source session is
//! closed before [`run`] returns on every path.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info, warn};
use wattwise_sources::{ReadingSource, SourceError};

use crate::presenter::Presenter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One fetch, then done. Every error is fatal.
    Single,
    /// Fetch, present, sleep `interval`, repeat until cancelled.
    Continuous { interval: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub polls: u64,
    pub readings: u64,
    pub transient_errors: u64,
    pub cancelled: bool,
}

pub async fn run<S, P, F>(
    source: &mut S,
    presenter: &mut P,
    mode: Mode,
    shutdown: F,
) -> Result<Summary, PollError>
where
    S: ReadingSource,
    P: Presenter,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    debug!(source = source.name(), ?mode, "Polling started");
    let outcome = drive(source, presenter, mode, shutdown.as_mut()).await;
    source.close().await;

    match &outcome {
        Ok(summary) => info!(
            polls = summary.polls,
            transient_errors = summary.transient_errors,
            cancelled = summary.cancelled,
            "Polling stopped"
        ),
        Err(e) => warn!(error = %e, "Polling aborted"),
    }
    outcome
}

async fn drive<S, P, F>(
    source: &mut S,
    presenter: &mut P,
    mode: Mode,
    mut shutdown: Pin<&mut F>,
) -> Result<Summary, PollError>
where
    S: ReadingSource,
    P: Presenter,
    F: Future<Output = ()>,
{
    let mut summary = Summary::default();

    loop {
        let fetched = tokio::select! {
            biased;
            _ = shutdown.as_mut() => {
                summary.cancelled = true;
                return Ok(summary);
            }
            result = source.fetch_reading() => result,
        };
        summary.polls += 1;

        match fetched {
            Ok(reading) => {
                summary.readings += 1;
                presenter.reading(&reading)?;
            }
            Err(e) if e.is_transient() && matches!(mode, Mode::Continuous { .. }) => {
                warn!(kind = e.kind(), error = %e, "Poll failed, retrying next tick");
                summary.transient_errors += 1;
                presenter.transient(&e)?;
            }
            Err(e) => return Err(e.into()),
        }

        let Mode::Continuous { interval } = mode else {
            return Ok(summary);
        };

        tokio::select! {
            biased;
            _ = shutdown.as_mut() => {
                summary.cancelled = true;
                return Ok(summary);
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
