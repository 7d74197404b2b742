use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::Level;
use wattwise_protocol::homeassistant::Aggregation;
use wattwise_sources::SourceError;

const TOKEN_FILE: &str = "token.secret";

pub const MAX_HISTORY_SIZE: usize = 10_000;
pub const MAX_TREND_MINUTES: u64 = 24 * 60;
pub const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration found at {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ConfigError> for SourceError {
    fn from(err: ConfigError) -> Self {
        SourceError::Configuration(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum SourceKind {
    #[serde(rename = "kasa")]
    #[value(name = "kasa")]
    Kasa,
    #[serde(rename = "homeassistant")]
    #[value(name = "homeassistant", alias = "ha")]
    HomeAssistant,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Kasa => "Kasa Smart Plug",
            SourceKind::HomeAssistant => "Home Assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantSettings {
    pub host: String,
    pub entity_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregation>,
    pub timeout_secs: u64,
}

impl Default for HomeAssistantSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            entity_ids: Vec::new(),
            current_entity_id: None,
            aggregate: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KasaSettings {
    pub device_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for KasaSettings {
    fn default() -> Self {
        Self {
            device_ip: String::new(),
            alias: None,
            port: wattwise_protocol::kasa::DEFAULT_PORT,
            timeout_secs: 10,
        }
    }
}

/// Named terminal colors, e.g. `green`, `lightred` or `#ff8800`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub normal: String,
    pub warning: String,
    pub critical: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            normal: "green".to_string(),
            warning: "yellow".to_string(),
            critical: "red".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub warning_watts: f64,
    pub critical_watts: f64,
    /// Readings kept for the chart.
    pub history_size: usize,
    pub trend_minutes: u64,
    pub colors: ColorConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            warning_watts: 300.0,
            critical_watts: 1200.0,
            history_size: 100,
            trend_minutes: 5,
            colors: ColorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
    pub log_level: LogLevel,
    pub homeassistant: HomeAssistantSettings,
    pub kasa: KasaSettings,
    pub display: DisplayConfig,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("wattwise")
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wattwise")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn token_path() -> PathBuf {
    config_dir().join(TOKEN_FILE)
}

pub fn ensure_dirs() -> Result<(), ConfigError> {
    let dir = config_dir();
    fs::create_dir_all(&dir).map_err(|e| ConfigError::io(&dir, e))?;
    set_mode(&dir, 0o700)
}

impl UserConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::io(path, e)),
        };

        let config: UserConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        ensure_dirs()?;
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let content = toml::to_string_pretty(self)?;
        write_private(path, content.as_bytes())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        if !display.warning_watts.is_finite() || display.warning_watts < 0.0 {
            return Err(ConfigError::Invalid(
                "display.warning_watts must be a non-negative number".into(),
            ));
        }
        if !display.critical_watts.is_finite() || display.critical_watts < display.warning_watts {
            return Err(ConfigError::Invalid(format!(
                "display.critical_watts ({}) must not be below display.warning_watts ({})",
                display.critical_watts, display.warning_watts
            )));
        }
        if !(2..=MAX_HISTORY_SIZE).contains(&display.history_size) {
            return Err(ConfigError::Invalid(format!(
                "display.history_size must be between 2 and {MAX_HISTORY_SIZE}"
            )));
        }
        if !(1..=MAX_TREND_MINUTES).contains(&display.trend_minutes) {
            return Err(ConfigError::Invalid(format!(
                "display.trend_minutes must be between 1 and {MAX_TREND_MINUTES}"
            )));
        }
        for (section, secs) in [
            ("homeassistant", self.homeassistant.timeout_secs),
            ("kasa", self.kasa.timeout_secs),
        ] {
            if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "{section}.timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
                )));
            }
        }
        Ok(())
    }
}

/// Reads the Home Assistant token, if one has been stored.
pub fn load_token() -> Result<Option<String>, ConfigError> {
    load_token_from(&token_path())
}

pub fn load_token_from(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(token) => {
            let token = token.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

pub fn save_token(token: &str) -> Result<(), ConfigError> {
    ensure_dirs()?;
    write_private(&token_path(), token.trim().as_bytes())
}

/// `abcd...wxyz` for long tokens, `****` otherwise.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

/// Tightens permissions on the config directory and the files in it.
/// Returns the paths that were changed.
pub fn fix_permissions() -> Result<Vec<PathBuf>, ConfigError> {
    let dir = config_dir();
    let mut fixed = Vec::new();
    if !dir.exists() {
        return Ok(fixed);
    }

    set_mode(&dir, 0o700)?;
    fixed.push(dir);
    for path in [config_path(), token_path()] {
        if path.exists() {
            set_mode(&path, 0o600)?;
            fixed.push(path);
        }
    }
    Ok(fixed)
}

fn write_private(path: &Path, content: &[u8]) -> Result<(), ConfigError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| ConfigError::io(path, e))?;
    file.write_all(content)
        .map_err(|e| ConfigError::io(path, e))?;
    // `mode` only applies on creation.
    set_mode(path, 0o600)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| ConfigError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wattwise-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file() {
        let dir = scratch_dir("missing");
        let path = dir.join("config.toml");
        assert!(matches!(
            UserConfig::load_from(&path),
            Err(ConfigError::Missing(p)) if p == path
        ));
    }

    #[test]
    fn test_defaults_fill_partial_file() {
        let dir = scratch_dir("partial");
        let path = dir.join("config.toml");
        fs::write(
            &path,
            "source = \"kasa\"\n[kasa]\ndevice_ip = \"192.168.1.40\"\n",
        )
        .unwrap();

        let config = UserConfig::load_from(&path).unwrap();
        assert_eq!(config.source, Some(SourceKind::Kasa));
        assert_eq!(config.kasa.device_ip, "192.168.1.40");
        assert_eq!(config.kasa.port, 9999);
        assert_eq!(config.display, DisplayConfig::default());
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save");
        let path = dir.join("config.toml");
        let mut config = UserConfig::default();
        config.source = Some(SourceKind::HomeAssistant);
        config.homeassistant.host = "http://ha.local:8123".into();
        config.homeassistant.entity_ids = vec!["sensor.a".into(), "sensor.b".into()];
        config.homeassistant.aggregate = Some(Aggregation::Sum);

        config.save_to(&path).unwrap();
        let loaded = UserConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("source = \"homeassistant\""));
        assert!(written.contains("aggregate = \"sum\""));
        assert!(!written.contains("token"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_parse_error() {
        let dir = scratch_dir("parse");
        let path = dir.join("config.toml");
        fs::write(&path, "source = [").unwrap();
        assert!(matches!(
            UserConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = UserConfig::default();
        config.display.warning_watts = 2000.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_oversized_limits() {
        let mut config = UserConfig::default();
        config.display.history_size = usize::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = UserConfig::default();
        config.display.trend_minutes = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = UserConfig::default();
        config.homeassistant.timeout_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("homeassistant")));

        let mut config = UserConfig::default();
        config.display.history_size = MAX_HISTORY_SIZE;
        config.display.trend_minutes = MAX_TREND_MINUTES;
        config.kasa.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_history_in_file_is_rejected() {
        let dir = scratch_dir("oversized");
        let path = dir.join("config.toml");
        fs::write(&path, "[display]\nhistory_size = 1000000000\n").unwrap();
        assert!(matches!(
            UserConfig::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_token_file() {
        let dir = scratch_dir("token");
        let path = dir.join(TOKEN_FILE);
        assert_eq!(load_token_from(&path).unwrap(), None);

        write_private(&path, b"  abc.def.ghi\n").unwrap();
        assert_eq!(load_token_from(&path).unwrap().as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.xyz"), "eyJh....xyz");
        assert_eq!(mask_token("short"), "****");
    }
}
