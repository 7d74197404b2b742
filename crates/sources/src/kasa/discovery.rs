use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};
use wattwise_protocol::kasa::{self, SysInfo};

use crate::SourceError;

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

const PROBE_ATTEMPTS: usize = 3;
const PROBE_SPACING: Duration = Duration::from_millis(250);

/// A plug that answered a discovery probe.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub ip: IpAddr,
    pub alias: String,
    pub model: String,
    pub mac: String,
    pub has_emeter: bool,
    pub is_on: Option<bool>,
}

impl DeviceDescriptor {
    fn from_sysinfo(ip: IpAddr, info: SysInfo) -> Self {
        let id = if !info.device_id.is_empty() {
            info.device_id.clone()
        } else if !info.mac.is_empty() {
            info.mac.clone()
        } else {
            ip.to_string()
        };
        Self {
            id,
            ip,
            has_emeter: info.has_emeter(),
            is_on: info.is_on(),
            alias: info.alias,
            model: info.model,
            mac: info.mac,
        }
    }
}

/// Broadcasts a sysinfo probe on the local network and collects replies.
pub async fn discover(timeout: Duration) -> Result<Vec<DeviceDescriptor>, SourceError> {
    let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), kasa::DEFAULT_PORT);
    discover_on(target, timeout).await
}

/// Sends probes to `target` and listens until `timeout` elapses.
///
/// Devices answering more than once are reported once, keyed by device id
/// (falling back to MAC, then address). Results are ordered by address.
pub async fn discover_on(
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<DeviceDescriptor>, SourceError> {
    let bind_addr = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| SourceError::Connection(format!("cannot open discovery socket: {e}")))?;
    socket
        .set_broadcast(true)
        .map_err(|e| SourceError::Connection(format!("cannot enable broadcast: {e}")))?;

    let probe = kasa::encrypt(kasa::SYSINFO_QUERY.as_bytes());
    let deadline = Instant::now() + timeout;
    let mut next_probe = Instant::now();
    let mut probes_sent = 0;
    let mut found: HashMap<String, DeviceDescriptor> = HashMap::new();
    let mut buf = vec![0u8; kasa::MAX_FRAME_LEN];

    debug!(%target, ?timeout, "Starting Kasa discovery");

    loop {
        if probes_sent < PROBE_ATTEMPTS && Instant::now() >= next_probe {
            socket
                .send_to(&probe, target)
                .await
                .map_err(|e| SourceError::Connection(format!("discovery probe failed: {e}")))?;
            probes_sent += 1;
            next_probe = Instant::now() + PROBE_SPACING;
        }

        let wake = if probes_sent < PROBE_ATTEMPTS {
            next_probe.min(deadline)
        } else {
            deadline
        };
        if Instant::now() >= deadline {
            break;
        }

        match tokio::time::timeout_at(wake, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => {
                let Some(device) = parse_reply(&buf[..len], from.ip()) else {
                    continue;
                };
                trace!(ip = %device.ip, alias = %device.alias, "Discovery reply");
                found.entry(device.id.clone()).or_insert(device);
            }
            Ok(Err(e)) => {
                trace!(error = %e, "Discovery receive failed");
            }
            Err(_) => {}
        }
    }

    let mut devices: Vec<_> = found.into_values().collect();
    devices.sort_by(|a, b| a.ip.cmp(&b.ip).then_with(|| a.id.cmp(&b.id)));
    debug!(count = devices.len(), "Kasa discovery finished");
    Ok(devices)
}

fn parse_reply(datagram: &[u8], ip: IpAddr) -> Option<DeviceDescriptor> {
    let json = kasa::decode_body(datagram).ok()?;
    match kasa::parse_sysinfo(&json) {
        Ok(info) => Some(DeviceDescriptor::from_sysinfo(ip, info)),
        Err(e) => {
            trace!(%ip, error = %e, "Ignoring unrecognised discovery reply");
            None
        }
    }
}
