//! Home Assistant REST source.
//!
//! Each poll reads `GET <host>/api/states/<entity_id>` for every configured
//! power entity and folds the values according to the configured
//! [`Aggregation`]. An optional current entity supplies amperes.

use std::time::Duration;

use chrono::Local;
use tracing::{debug, warn};
use ureq::Agent;
use wattwise_protocol::homeassistant::{self, Aggregation};
use wattwise_protocol::Reading;

use crate::{ReadingSource, SourceError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`.
    pub host: String,
    /// Long-lived access token.
    pub token: String,
    pub power_entities: Vec<String>,
    pub current_entity: Option<String>,
    /// Required when more than one power entity is configured.
    pub aggregate: Option<Aggregation>,
    pub timeout: Duration,
}

impl HomeAssistantConfig {
    pub fn new(host: impl Into<String>, token: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            power_entities: vec![entity.into()],
            current_entity: None,
            aggregate: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Checks the settings and resolves the effective aggregation.
    pub fn validate(&self) -> Result<Aggregation, SourceError> {
        if self.host.trim().is_empty() {
            return Err(SourceError::Configuration(
                "Home Assistant host is not configured".into(),
            ));
        }
        if !self.host.starts_with("http://") && !self.host.starts_with("https://") {
            return Err(SourceError::Configuration(format!(
                "Home Assistant host must start with http:// or https:// (got '{}')",
                self.host
            )));
        }
        if self.token.trim().is_empty() {
            return Err(SourceError::Configuration(
                "Home Assistant access token is not configured".into(),
            ));
        }
        if self.power_entities.iter().all(|e| e.trim().is_empty()) {
            return Err(SourceError::Configuration(
                "no Home Assistant power entity configured".into(),
            ));
        }

        match (self.power_entities.len(), self.aggregate) {
            (1, aggregate) => Ok(aggregate.unwrap_or(Aggregation::First)),
            (_, Some(aggregate)) => Ok(aggregate),
            (n, None) => Err(SourceError::Configuration(format!(
                "{n} power entities configured; set aggregate to \"sum\" or \"first\""
            ))),
        }
    }
}

pub struct HomeAssistantSource {
    config: HomeAssistantConfig,
    aggregate: Aggregation,
    agent: Option<Agent>,
}

impl HomeAssistantSource {
    pub fn new(config: HomeAssistantConfig) -> Result<Self, SourceError> {
        let aggregate = config.validate()?;
        Ok(Self {
            config,
            aggregate,
            agent: None,
        })
    }

    pub fn aggregate(&self) -> Aggregation {
        self.aggregate
    }

    fn agent(&mut self) -> Agent {
        let timeout = self.config.timeout;
        self.agent
            .get_or_insert_with(|| {
                let config = Agent::config_builder()
                    .timeout_global(Some(timeout))
                    .http_status_as_error(false)
                    .build();
                Agent::new_with_config(config)
            })
            .clone()
    }

    async fn entity_value(&mut self, entity_id: &str) -> Result<f64, SourceError> {
        let agent = self.agent();
        let url = format!(
            "{}/api/states/{}",
            self.config.host.trim_end_matches('/'),
            entity_id
        );
        let auth = format!("Bearer {}", self.config.token);
        let timeout = self.config.timeout;

        let request = tokio::task::spawn_blocking(move || get_state(&agent, &url, &auth, timeout));
        // The agent enforces its own timeout; this guards against a stuck worker.
        let deadline = timeout.saturating_add(Duration::from_secs(1));
        let body = match tokio::time::timeout(deadline, request).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => return Err(SourceError::Connection(format!("request task failed: {join}"))),
            Err(_) => return Err(SourceError::Timeout(timeout)),
        };

        let state = homeassistant::parse_state(&body)?;
        Ok(state.value()?)
    }

    async fn power(&mut self) -> Result<f64, SourceError> {
        let entities = self.config.power_entities.clone();
        match self.aggregate {
            Aggregation::Sum => {
                let mut total = 0.0;
                for entity in &entities {
                    total += self.entity_value(entity).await?;
                }
                Ok(total)
            }
            Aggregation::First => {
                let mut last_err = None;
                for entity in &entities {
                    match self.entity_value(entity).await {
                        Ok(watts) => return Ok(watts),
                        Err(e) if e.is_transient() => {
                            debug!(entity = %entity, error = %e, "Entity has no value, trying next");
                            last_err = Some(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    SourceError::Configuration("no Home Assistant power entity configured".into())
                }))
            }
        }
    }
}

fn get_state(agent: &Agent, url: &str, auth: &str, timeout: Duration) -> Result<String, SourceError> {
    let mut response = agent
        .get(url)
        .header("Authorization", auth)
        .header("Content-Type", "application/json")
        .call()
        .map_err(|e| transport_error(e, timeout))?;

    let status = response.status().as_u16();
    match status {
        200..=299 => response
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_error(e, timeout)),
        401 | 403 => Err(SourceError::Connection(format!(
            "Home Assistant rejected the access token (HTTP {status})"
        ))),
        404 => Err(SourceError::Configuration(format!(
            "entity not found: {}",
            url.rsplit('/').next().unwrap_or(url)
        ))),
        _ => Err(SourceError::Connection(format!(
            "Home Assistant returned HTTP {status}"
        ))),
    }
}

fn transport_error(err: ureq::Error, timeout: Duration) -> SourceError {
    match err {
        ureq::Error::Timeout(_) => SourceError::Timeout(timeout),
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            SourceError::Timeout(timeout)
        }
        other => SourceError::Connection(other.to_string()),
    }
}

impl ReadingSource for HomeAssistantSource {
    fn name(&self) -> &str {
        "Home Assistant"
    }

    async fn fetch_reading(&mut self) -> Result<Reading, SourceError> {
        let watts = self.power().await?;

        let amperes = match self.config.current_entity.clone() {
            Some(entity) => match self.entity_value(&entity).await {
                Ok(amps) => Some(amps),
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Current entity unreadable");
                    None
                }
            },
            None => None,
        };

        Ok(Reading::at(watts, amperes, Local::now())?)
    }

    async fn close(&mut self) {
        if self.agent.take().is_some() {
            debug!(host = %self.config.host, "Home Assistant session closed");
        }
    }
}
