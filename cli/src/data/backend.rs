use std::time::Duration;

use tracing::debug;
use wattwise_sources::homeassistant::{HomeAssistantConfig, HomeAssistantSource};
use wattwise_sources::kasa::{KasaConfig, KasaSource};
use wattwise_sources::mock::MockSource;
use wattwise_sources::{Reading, ReadingSource, SourceError};

use crate::config::{HomeAssistantSettings, KasaSettings, SourceKind, UserConfig};

/// The configured reading source.
pub enum Backend {
    Kasa(KasaSource),
    HomeAssistant(HomeAssistantSource),
    /// Synthetic readings from `--mock`; needs no configuration.
    Mock(MockSource),
}

/// Picks a backend: explicit flag, then config `source`, then Home Assistant
/// if host and token are set, then Kasa if a device address is set.
pub fn resolve_kind(
    config: &UserConfig,
    requested: Option<SourceKind>,
    token: Option<&str>,
) -> Result<SourceKind, SourceError> {
    if let Some(kind) = requested.or(config.source) {
        return Ok(kind);
    }

    let ha = &config.homeassistant;
    if !ha.host.trim().is_empty() && token.is_some_and(|t| !t.trim().is_empty()) {
        return Ok(SourceKind::HomeAssistant);
    }
    if !config.kasa.device_ip.trim().is_empty() {
        return Ok(SourceKind::Kasa);
    }

    Err(SourceError::Configuration(
        "no data source configured; run `wattwise config ha` or `wattwise config kasa`".into(),
    ))
}

pub fn kasa_config(settings: &KasaSettings) -> KasaConfig {
    KasaConfig::new(settings.device_ip.trim())
        .with_port(settings.port)
        .with_timeout(Duration::from_secs(settings.timeout_secs))
}

/// `show_current` drops the current entity when amperes are not displayed.
pub fn home_assistant_config(
    settings: &HomeAssistantSettings,
    token: &str,
    show_current: bool,
) -> HomeAssistantConfig {
    HomeAssistantConfig {
        host: settings.host.trim().trim_end_matches('/').to_string(),
        token: token.trim().to_string(),
        power_entities: settings
            .entity_ids
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect(),
        current_entity: settings
            .current_entity_id
            .clone()
            .filter(|e| show_current && !e.trim().is_empty()),
        aggregate: settings.aggregate,
        timeout: Duration::from_secs(settings.timeout_secs),
    }
}

impl Backend {
    pub fn select(
        config: &UserConfig,
        requested: Option<SourceKind>,
        token: Option<&str>,
        show_current: bool,
    ) -> Result<Self, SourceError> {
        let kind = resolve_kind(config, requested, token)?;
        debug!(source = kind.label(), "Selected backend");

        match kind {
            SourceKind::Kasa => Ok(Backend::Kasa(KasaSource::new(kasa_config(&config.kasa))?)),
            SourceKind::HomeAssistant => {
                let token = token.ok_or_else(|| {
                    SourceError::Configuration(
                        "Home Assistant access token is not configured".into(),
                    )
                })?;
                let ha = home_assistant_config(&config.homeassistant, token, show_current);
                let source = HomeAssistantSource::new(ha)?;
                debug!(
                    entities = config.homeassistant.entity_ids.len(),
                    aggregate = source.aggregate().label(),
                    "Home Assistant backend ready"
                );
                Ok(Backend::HomeAssistant(source))
            }
        }
    }

    pub fn mock() -> Self {
        Backend::Mock(MockSource::new())
    }

    /// The configured source kind; `None` for mock data.
    pub fn kind(&self) -> Option<SourceKind> {
        match self {
            Backend::Kasa(_) => Some(SourceKind::Kasa),
            Backend::HomeAssistant(_) => Some(SourceKind::HomeAssistant),
            Backend::Mock(_) => None,
        }
    }

    /// Source name plus the device alias when one is configured.
    pub fn label(&self, config: &UserConfig) -> String {
        match (self, config.kasa.alias.as_deref()) {
            (Backend::Kasa(_), Some(alias)) if !alias.is_empty() => {
                format!("{} ({alias})", self.name())
            }
            _ => self.name().to_string(),
        }
    }
}

impl ReadingSource for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::Kasa(source) => source.name(),
            Backend::HomeAssistant(source) => source.name(),
            Backend::Mock(source) => source.name(),
        }
    }

    async fn fetch_reading(&mut self) -> Result<Reading, SourceError> {
        match self {
            Backend::Kasa(source) => source.fetch_reading().await,
            Backend::HomeAssistant(source) => source.fetch_reading().await,
            Backend::Mock(source) => source.fetch_reading().await,
        }
    }

    async fn close(&mut self) {
        match self {
            Backend::Kasa(source) => source.close().await,
            Backend::HomeAssistant(source) => source.close().await,
            Backend::Mock(source) => source.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use wattwise_protocol::homeassistant::Aggregation;

    use super::*;

    fn configured() -> UserConfig {
        let mut config = UserConfig::default();
        config.homeassistant.host = "http://ha.local:8123".into();
        config.homeassistant.entity_ids = vec!["sensor.desk_power".into()];
        config.kasa.device_ip = "192.168.1.40".into();
        config
    }

    #[test]
    fn test_flag_wins() {
        let config = configured();
        assert_eq!(
            resolve_kind(&config, Some(SourceKind::Kasa), Some("token")).unwrap(),
            SourceKind::Kasa
        );
    }

    #[test]
    fn test_config_source_wins_over_inference() {
        let mut config = configured();
        config.source = Some(SourceKind::Kasa);
        assert_eq!(
            resolve_kind(&config, None, Some("token")).unwrap(),
            SourceKind::Kasa
        );
    }

    #[test]
    fn test_inference_prefers_home_assistant_with_token() {
        let config = configured();
        assert_eq!(
            resolve_kind(&config, None, Some("token")).unwrap(),
            SourceKind::HomeAssistant
        );
        assert_eq!(resolve_kind(&config, None, None).unwrap(), SourceKind::Kasa);
    }

    #[test]
    fn test_nothing_configured() {
        let err = resolve_kind(&UserConfig::default(), None, None).unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
    }

    #[test]
    fn test_select_home_assistant_without_token() {
        let config = configured();
        let err = Backend::select(&config, Some(SourceKind::HomeAssistant), None, false)
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Configuration(_)));
    }

    #[test]
    fn test_select_multi_entity_needs_aggregate() {
        let mut config = configured();
        config.homeassistant.entity_ids.push("sensor.monitor_power".into());
        assert!(Backend::select(&config, None, Some("token"), false).is_err());

        config.homeassistant.aggregate = Some(Aggregation::Sum);
        let backend = Backend::select(&config, None, Some("token"), false).unwrap();
        assert_eq!(backend.kind(), Some(SourceKind::HomeAssistant));
    }

    #[test]
    fn test_current_entity_only_when_shown() {
        let mut settings = configured().homeassistant;
        settings.current_entity_id = Some("sensor.desk_current".into());

        assert_eq!(home_assistant_config(&settings, "t", false).current_entity, None);
        assert_eq!(
            home_assistant_config(&settings, "t", true).current_entity.as_deref(),
            Some("sensor.desk_current")
        );
    }

    #[test]
    fn test_kasa_label_uses_alias() {
        let mut config = configured();
        config.kasa.alias = Some("Workstation".into());
        let backend = Backend::select(&config, Some(SourceKind::Kasa), None, false).unwrap();
        assert_eq!(backend.label(&config), "Kasa Smart Plug (Workstation)");
    }

    #[tokio::test]
    async fn test_mock_backend_needs_no_config() {
        let mut backend = Backend::mock();
        assert_eq!(backend.kind(), None);
        assert_eq!(backend.label(&UserConfig::default()), "Mock data");

        let reading = backend.fetch_reading().await.unwrap();
        assert!(reading.watts >= 50.0 && reading.watts <= 400.0);
        assert!(reading.amperes.is_some());
        backend.close().await;
    }
}
