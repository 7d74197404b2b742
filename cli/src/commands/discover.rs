use std::time::Duration;

use color_eyre::eyre::Result;
use wattwise_sources::kasa::{self, DeviceDescriptor};

pub async fn run(timeout: Duration) -> Result<()> {
    println!(
        "Scanning for Kasa plugs ({})...",
        humantime::format_duration(timeout)
    );
    let devices = kasa::discover(timeout).await?;

    if devices.is_empty() {
        println!("No Kasa devices found.");
        println!("Plugs must be on the same network segment and accept UDP broadcasts on port 9999.");
        return Ok(());
    }

    println!();
    println!(
        "{:<16} {:<24} {:<14} {:<6} {}",
        "IP", "ALIAS", "MODEL", "METER", "STATE"
    );
    for device in &devices {
        println!("{}", table_row(device));
    }
    println!();
    println!("Run `wattwise config kasa` to use one of these.");
    Ok(())
}

fn table_row(device: &DeviceDescriptor) -> String {
    let state = match device.is_on {
        Some(true) => "on",
        Some(false) => "off",
        None => "?",
    };
    format!(
        "{:<16} {:<24} {:<14} {:<6} {}",
        device.ip.to_string(),
        device.alias,
        device.model,
        if device.has_emeter { "yes" } else { "no" },
        state
    )
}

/// One-line summary used in the setup picker.
pub fn describe(device: &DeviceDescriptor) -> String {
    let mut line = format!("{}  {} ({})", device.ip, device.alias, device.model);
    if !device.has_emeter {
        line.push_str("  [no energy meter]");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(has_emeter: bool) -> DeviceDescriptor {
        DeviceDescriptor {
            id: "ABC123".into(),
            ip: "192.168.1.40".parse().unwrap(),
            alias: "Desk".into(),
            model: "HS110(US)".into(),
            mac: "50:C7:BF:00:00:01".into(),
            has_emeter,
            is_on: Some(true),
        }
    }

    #[test]
    fn test_describe_flags_missing_meter() {
        assert_eq!(describe(&device(true)), "192.168.1.40  Desk (HS110(US))");
        assert!(describe(&device(false)).ends_with("[no energy meter]"));
    }

    #[test]
    fn test_table_row_columns() {
        let row = table_row(&device(true));
        assert!(row.starts_with("192.168.1.40     Desk"));
        assert!(row.ends_with("yes    on"));
    }
}
