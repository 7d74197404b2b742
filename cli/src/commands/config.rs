use std::path::Path;

use color_eyre::eyre::{bail, eyre, Result};
use wattwise_protocol::homeassistant::Aggregation;
use wattwise_sources::homeassistant::HomeAssistantSource;
use wattwise_sources::kasa::{self, KasaSource, DEFAULT_DISCOVERY_TIMEOUT};
use wattwise_sources::{ReadingSource, SourceError};

use crate::commands::discover;
use crate::config::{
    self, config_path, mask_token, token_path, ConfigError, SourceKind, UserConfig,
};
use crate::data::backend::{home_assistant_config, kasa_config};
use crate::prompt;

const POWER_SUFFIX: &str = "_current_consumption";
const CURRENT_SUFFIX: &str = "_current";

pub fn show() -> Result<()> {
    let path = config_path();
    let config = match UserConfig::load() {
        Ok(config) => config,
        Err(ConfigError::Missing(path)) => {
            println!("No configuration at {}", path.display());
            println!("Run `wattwise config ha` or `wattwise config kasa` to create one.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Config file: {}", path.display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    match config::load_token()? {
        Some(token) => println!(
            "Home Assistant token: {} ({})",
            mask_token(&token),
            token_path().display()
        ),
        None => println!("Home Assistant token: not configured"),
    }
    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", config_path().display());
    Ok(())
}

pub fn fix_permissions() -> Result<()> {
    let fixed = config::fix_permissions()?;
    if fixed.is_empty() {
        println!("Nothing to fix: {} does not exist", config::config_dir().display());
        return Ok(());
    }
    for path in fixed {
        println!("Secured {}", path.display());
    }
    Ok(())
}

/// Existing settings, or defaults when no file exists yet.
fn load_or_default() -> Result<UserConfig, ConfigError> {
    match UserConfig::load() {
        Ok(config) => Ok(config),
        Err(ConfigError::Missing(_)) => Ok(UserConfig::default()),
        Err(e) => Err(e),
    }
}

pub async fn setup_home_assistant() -> Result<()> {
    require_terminal()?;
    if home_assistant_flow(load_or_default()?).await?.is_some() {
        print_next_steps(SourceKind::HomeAssistant);
    }
    Ok(())
}

pub async fn setup_kasa() -> Result<()> {
    require_terminal()?;
    if kasa_flow(load_or_default()?).await?.is_some() {
        print_next_steps(SourceKind::Kasa);
    }
    Ok(())
}

/// Guided setup when monitoring starts without a config file.
pub async fn first_run(path: &Path) -> Result<UserConfig> {
    println!("No configuration found at {}.", path.display());
    println!("Choose a data source to set up:");

    let options = vec![
        "Home Assistant".to_string(),
        "Kasa smart plug (direct)".to_string(),
    ];
    let saved = match prompt::choose("Data source", &options)? {
        Some(0) => home_assistant_flow(UserConfig::default()).await?,
        Some(_) => kasa_flow(UserConfig::default()).await?,
        None => None,
    };
    saved.ok_or_else(|| eyre!("setup cancelled; nothing was saved"))
}

fn require_terminal() -> Result<()> {
    if !prompt::is_interactive() {
        bail!("interactive setup needs a terminal; edit {} instead", config_path().display());
    }
    Ok(())
}

async fn home_assistant_flow(mut config: UserConfig) -> Result<Option<UserConfig>> {
    println!("wattwise: Home Assistant setup");
    println!();

    let mut settings = config.homeassistant.clone();
    settings.host = prompt::ask(
        "Home Assistant URL (e.g. http://homeassistant.local:8123)",
        Some(settings.host.as_str()),
    )?
    .trim_end_matches('/')
    .to_string();

    let existing_token = config::load_token()?;
    let entered = if existing_token.is_some() {
        prompt::ask_secret("Long-lived access token (leave empty to keep the current one)")?
    } else {
        prompt::ask_secret("Long-lived access token")?
    };
    let token = match (entered.trim(), existing_token) {
        ("", Some(existing)) => existing,
        ("", None) => bail!("an access token is required"),
        (entered, _) => entered.to_string(),
    };

    let device = prompt::ask(
        "Device name (e.g. epyc_workstation)",
        Some(device_name_from(&settings.entity_ids).as_str()),
    )?;
    let (mut power, mut current) = entities_for(&device);
    println!("Power sensor:   {power}");
    println!("Current sensor: {current}");

    let mut entity_ids = vec![power.clone()];
    if prompt::confirm("Customize sensor entity IDs?", false)? {
        power = prompt::ask("Power entity IDs, comma-separated", Some(power.as_str()))?;
        entity_ids = split_entities(&power);
        current = prompt::ask("Current entity ID (\"none\" to skip)", Some(current.as_str()))?;
    }
    if entity_ids.is_empty() {
        bail!("at least one power entity is required");
    }

    settings.aggregate = if entity_ids.len() > 1 {
        let options = vec![
            "sum: add the sensors together".to_string(),
            "first: use the first sensor that reports".to_string(),
        ];
        match prompt::choose("Combine the sensors how", &options)? {
            Some(1) => Some(Aggregation::First),
            _ => Some(Aggregation::Sum),
        }
    } else {
        None
    };
    settings.entity_ids = entity_ids;
    settings.current_entity_id =
        (!current.is_empty() && !current.eq_ignore_ascii_case("none")).then_some(current);

    println!();
    println!("Testing Home Assistant connection...");
    let source = HomeAssistantSource::new(home_assistant_config(&settings, &token, true));
    let tested = match source {
        Ok(source) => report_test(source).await,
        Err(e) => Err(e),
    };
    if !accept_test(tested)? {
        return Ok(None);
    }

    config.homeassistant = settings;
    config.source = Some(SourceKind::HomeAssistant);
    config::save_token(&token)?;
    config.save()?;
    println!("Home Assistant settings saved to {}", config_path().display());
    Ok(Some(config))
}

async fn kasa_flow(mut config: UserConfig) -> Result<Option<UserConfig>> {
    println!("wattwise: Kasa smart plug setup");
    println!();

    let mut settings = config.kasa.clone();
    let mut alias = settings.alias.clone().unwrap_or_else(|| "PC".to_string());

    if prompt::confirm("Scan the local network for plugs?", true)? {
        println!(
            "Scanning ({})...",
            humantime::format_duration(DEFAULT_DISCOVERY_TIMEOUT)
        );
        let devices = kasa::discover(DEFAULT_DISCOVERY_TIMEOUT).await?;
        if devices.is_empty() {
            println!("No plugs answered.");
        } else {
            let options: Vec<String> = devices.iter().map(discover::describe).collect();
            if let Some(index) =
                prompt::choose("Pick a plug (empty to type an address)", &options)?
            {
                let device = &devices[index];
                settings.device_ip = device.ip.to_string();
                if !device.alias.is_empty() {
                    alias = device.alias.clone();
                }
            }
        }
    }

    settings.device_ip = prompt::ask("Plug IP address", Some(settings.device_ip.as_str()))?;
    if settings.device_ip.trim().is_empty() {
        bail!("a device address is required");
    }
    let alias = prompt::ask("Plug alias", Some(alias.as_str()))?;
    settings.alias = (!alias.is_empty()).then_some(alias);

    println!();
    println!("Testing connection to {}...", settings.device_ip);
    let tested = match KasaSource::new(kasa_config(&settings)) {
        Ok(source) => report_test(source).await,
        Err(e) => Err(e),
    };
    if !accept_test(tested)? {
        return Ok(None);
    }

    config.kasa = settings;
    config.source = Some(SourceKind::Kasa);
    config.save()?;
    println!("Kasa settings saved to {}", config_path().display());
    Ok(Some(config))
}

async fn report_test<S: ReadingSource>(mut source: S) -> Result<(), SourceError> {
    let result = source.validate().await;
    source.close().await;
    let reading = result?;
    println!("Connection successful: {:.1} W", reading.watts);
    Ok(())
}

/// On a failed test, asks whether to keep the settings anyway.
fn accept_test(result: Result<(), SourceError>) -> Result<bool> {
    let Err(e) = result else {
        return Ok(true);
    };
    println!("Connection failed: {e}");
    if prompt::confirm("Save these settings anyway?", false)? {
        return Ok(true);
    }
    println!("Nothing was saved.");
    Ok(false)
}

fn print_next_steps(kind: SourceKind) {
    println!();
    println!("Next steps:");
    println!("- Run `wattwise` to see your current power usage");
    if kind == SourceKind::HomeAssistant {
        println!("- Run `wattwise --current` to see both power and current");
    }
    println!("- Run `wattwise --watch` to monitor continuously");
}

/// `sensor.desk_current_consumption` -> `desk`.
fn device_name_from(entity_ids: &[String]) -> String {
    entity_ids
        .first()
        .map(|entity| {
            let name = entity.strip_prefix("sensor.").unwrap_or(entity);
            name.strip_suffix(POWER_SUFFIX).unwrap_or(name).to_string()
        })
        .unwrap_or_default()
}

fn entities_for(device: &str) -> (String, String) {
    (
        format!("sensor.{device}{POWER_SUFFIX}"),
        format!("sensor.{device}{CURRENT_SUFFIX}"),
    )
}

fn split_entities(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect()
}
