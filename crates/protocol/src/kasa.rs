//! TP-Link Kasa legacy local protocol.
//!
//! Requests and responses are JSON documents obfuscated with an XOR
//! "autokey" cipher seeded with 171. Over TCP each message is prefixed with
//! its length as a 4-byte big-endian integer; UDP discovery datagrams carry
//! the ciphertext alone.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{DecodeError, Reading};

/// TCP and UDP port the plugs listen on.
pub const DEFAULT_PORT: u16 = 9999;

/// Upper bound on an accepted TCP frame. Real sysinfo payloads are ~1 KiB.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

pub const SYSINFO_QUERY: &str = r#"{"system":{"get_sysinfo":{}}}"#;
pub const REALTIME_QUERY: &str = r#"{"emeter":{"get_realtime":{}}}"#;

const INITIAL_KEY: u8 = 171;

pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plain
        .iter()
        .map(|&byte| {
            key ^= byte;
            key
        })
        .collect()
}

pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|&byte| {
            let plain = key ^ byte;
            key = byte;
            plain
        })
        .collect()
}

/// Encrypts `payload` and prepends the big-endian length header.
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let body = encrypt(payload.as_bytes());
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Reads the body length announced by a frame header.
pub fn frame_len(header: [u8; 4]) -> Result<usize, DecodeError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::Malformed(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }
    Ok(len)
}

/// Decrypts a frame body (without header) into its JSON text.
pub fn decode_body(body: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(decrypt(body))
        .map_err(|e| DecodeError::Malformed(format!("response is not UTF-8: {e}")))
}

/// Identity and capability block returned by `system.get_sysinfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SysInfo {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "deviceId", default)]
    pub device_id: String,
    #[serde(default, alias = "mic_mac")]
    pub mac: String,
    /// Colon-separated feature flags, e.g. `TIM:ENE`.
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub relay_state: Option<u8>,
    #[serde(default)]
    pub sw_ver: String,
}

impl SysInfo {
    pub fn has_emeter(&self) -> bool {
        self.feature.split(':').any(|f| f == "ENE")
    }

    pub fn is_on(&self) -> Option<bool> {
        self.relay_state.map(|state| state == 1)
    }
}

#[derive(Deserialize)]
struct SystemEnvelope {
    system: SystemSection,
}

#[derive(Deserialize)]
struct SystemSection {
    get_sysinfo: SysInfo,
}

pub fn parse_sysinfo(json: &str) -> Result<SysInfo, DecodeError> {
    let envelope: SystemEnvelope = serde_json::from_str(json)?;
    Ok(envelope.system.get_sysinfo)
}

/// `emeter.get_realtime` payload.
///
/// Newer firmware reports integer milli-units (`power_mw`, `current_ma`),
/// older firmware reports floating-point base units (`power`, `current`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EmeterRealtime {
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: Option<String>,
    pub power_mw: Option<f64>,
    pub power: Option<f64>,
    pub current_ma: Option<f64>,
    pub current: Option<f64>,
    pub voltage_mv: Option<f64>,
    pub voltage: Option<f64>,
    pub total_wh: Option<f64>,
    pub total: Option<f64>,
}

impl EmeterRealtime {
    pub fn watts(&self) -> Option<f64> {
        self.power_mw.map(|mw| mw / 1000.0).or(self.power)
    }

    pub fn amperes(&self) -> Option<f64> {
        self.current_ma.map(|ma| ma / 1000.0).or(self.current)
    }

    pub fn volts(&self) -> Option<f64> {
        self.voltage_mv.map(|mv| mv / 1000.0).or(self.voltage)
    }

    /// Lifetime energy counter in kWh.
    pub fn total_kwh(&self) -> Option<f64> {
        self.total_wh.map(|wh| wh / 1000.0).or(self.total)
    }

    pub fn to_reading(&self, timestamp: DateTime<Local>) -> Result<Reading, DecodeError> {
        if self.err_code != 0 {
            return Err(DecodeError::Device {
                code: self.err_code,
                message: self.err_msg.clone().unwrap_or_default(),
            });
        }
        let watts = self
            .watts()
            .ok_or_else(|| DecodeError::Malformed("realtime reply has no power field".into()))?;
        Reading::at(watts, self.amperes(), timestamp)
    }
}

#[derive(Deserialize)]
struct EmeterEnvelope {
    emeter: EmeterSection,
}

#[derive(Deserialize)]
struct EmeterSection {
    #[serde(default)]
    err_code: i64,
    #[serde(default)]
    err_msg: Option<String>,
    get_realtime: Option<EmeterRealtime>,
}

pub fn parse_realtime(json: &str) -> Result<EmeterRealtime, DecodeError> {
    let envelope: EmeterEnvelope = serde_json::from_str(json)?;
    let section = envelope.emeter;
    if section.err_code != 0 {
        return Err(DecodeError::Unsupported(
            section
                .err_msg
                .unwrap_or_else(|| format!("emeter error {}", section.err_code)),
        ));
    }
    section
        .get_realtime
        .ok_or_else(|| DecodeError::Malformed("emeter reply has no get_realtime block".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_matches_known_prefix() {
        let cipher = encrypt(SYSINFO_QUERY.as_bytes());
        assert_eq!(&cipher[..4], &[0xd0, 0xf2, 0x81, 0xf8]);
    }

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let cipher = encrypt(REALTIME_QUERY.as_bytes());
        assert_eq!(decrypt(&cipher), REALTIME_QUERY.as_bytes());
    }

    #[test]
    fn test_encode_frame_header() {
        let frame = encode_frame(REALTIME_QUERY);
        let header = [frame[0], frame[1], frame[2], frame[3]];
        assert_eq!(frame_len(header).unwrap(), REALTIME_QUERY.len());
        assert_eq!(decode_body(&frame[4..]).unwrap(), REALTIME_QUERY);
    }

    #[test]
    fn test_frame_len_rejects_oversized() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(frame_len(header).is_err());
    }

    #[test]
    fn test_has_emeter_flag() {
        let plug = SysInfo {
            feature: "TIM:ENE".into(),
            ..Default::default()
        };
        let bare = SysInfo {
            feature: "TIM".into(),
            ..Default::default()
        };
        assert!(plug.has_emeter());
        assert!(!bare.has_emeter());
    }

    #[test]
    fn test_device_error_code() {
        let rt = EmeterRealtime {
            err_code: -3,
            err_msg: Some("invalid argument".into()),
            ..Default::default()
        };
        let err = rt.to_reading(Local::now()).unwrap_err();
        assert!(matches!(err, DecodeError::Device { code: -3, .. }));
    }
}
