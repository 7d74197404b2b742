//! Reading source trait.

use wattwise_protocol::Reading;

use crate::SourceError;

/// A backend that can be polled for power readings.
///
/// Implementations keep their session (socket, HTTP agent) open between
/// calls to [`fetch_reading`](ReadingSource::fetch_reading) and release it in
/// [`close`](ReadingSource::close). Callers must not issue overlapping
/// requests; `&mut self` enforces one request in flight per session.
#[allow(async_fn_in_trait)]
pub trait ReadingSource {
    /// Short human-readable name, e.g. "Kasa Smart Plug".
    fn name(&self) -> &str;

    /// Poll the backend once.
    async fn fetch_reading(&mut self) -> Result<Reading, SourceError>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self);

    /// Connection test used by the configuration flows.
    async fn validate(&mut self) -> Result<Reading, SourceError> {
        self.fetch_reading().await
    }
}
