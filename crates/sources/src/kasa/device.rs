use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};
use wattwise_protocol::kasa::{self, SysInfo};
use wattwise_protocol::Reading;

use crate::{ReadingSource, SourceError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct KasaConfig {
    pub host: String,
    pub port: u16,
    /// Bound on connect plus one request/response exchange.
    pub timeout: Duration,
}

impl KasaConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: kasa::DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Session with a single plug.
///
/// The TCP connection is opened on the first poll and reused afterwards.
/// Any failed exchange drops it so the next poll reconnects.
pub struct KasaSource {
    config: KasaConfig,
    stream: Option<TcpStream>,
    sysinfo: Option<SysInfo>,
}

impl KasaSource {
    pub fn new(config: KasaConfig) -> Result<Self, SourceError> {
        if config.host.trim().is_empty() {
            return Err(SourceError::Configuration(
                "Kasa device address is not configured".into(),
            ));
        }
        Ok(Self {
            config,
            stream: None,
            sysinfo: None,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Device identity, fetched once per session.
    pub async fn sysinfo(&mut self) -> Result<&SysInfo, SourceError> {
        if self.sysinfo.is_none() {
            let body = self.query(kasa::SYSINFO_QUERY).await?;
            let info = kasa::parse_sysinfo(&body)?;
            debug!(
                endpoint = %self.endpoint(),
                alias = %info.alias,
                model = %info.model,
                has_emeter = info.has_emeter(),
                "Kasa device identified"
            );
            self.sysinfo = Some(info);
        }
        self.sysinfo
            .as_ref()
            .ok_or_else(|| SourceError::Protocol("device identity unavailable".into()))
    }

    /// Sends one request, retrying once on a fresh connection when a reused
    /// connection turns out to have been closed by the plug.
    async fn query(&mut self, request: &str) -> Result<String, SourceError> {
        let reused = self.stream.is_some();
        match self.exchange(request).await {
            Err(SourceError::Connection(reason)) if reused => {
                debug!(endpoint = %self.endpoint(), %reason, "Reused connection failed, reconnecting");
                self.exchange(request).await
            }
            other => other,
        }
    }

    async fn exchange(&mut self, request: &str) -> Result<String, SourceError> {
        let timeout = self.config.timeout;
        let result = match tokio::time::timeout(timeout, self.round_trip(request)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    async fn round_trip(&mut self, request: &str) -> Result<String, SourceError> {
        let endpoint = self.endpoint();
        let io_err = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                SourceError::Connection(format!("{endpoint}: device closed the connection"))
            }
            _ => SourceError::Connection(format!("{endpoint}: {e}")),
        };

        if self.stream.is_none() {
            let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
                .await
                .map_err(io_err)?;
            stream.set_nodelay(true).map_err(io_err)?;
            debug!(%endpoint, "Connected to Kasa device");
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(SourceError::Connection(format!("{endpoint}: not connected")));
        };

        stream
            .write_all(&kasa::encode_frame(request))
            .await
            .map_err(io_err)?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.map_err(io_err)?;
        let len = kasa::frame_len(header)?;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.map_err(io_err)?;

        let json = kasa::decode_body(&body)?;
        trace!(%endpoint, bytes = len, "Kasa response received");
        Ok(json)
    }
}

impl ReadingSource for KasaSource {
    fn name(&self) -> &str {
        "Kasa Smart Plug"
    }

    async fn fetch_reading(&mut self) -> Result<Reading, SourceError> {
        let info = self.sysinfo().await?;
        if !info.has_emeter() {
            return Err(SourceError::Configuration(format!(
                "{} ({}) does not support energy monitoring",
                info.alias, info.model
            )));
        }

        let body = self.query(kasa::REALTIME_QUERY).await?;
        let realtime = kasa::parse_realtime(&body)?;
        trace!(
            volts = ?realtime.volts(),
            total_kwh = ?realtime.total_kwh(),
            "Kasa meter read"
        );
        Ok(realtime.to_reading(Local::now())?)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                trace!(error = %e, "Kasa socket shutdown failed");
            }
            debug!(endpoint = %self.endpoint(), "Kasa session closed");
        }
        self.sysinfo = None;
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::net::TcpListener;

    use super::*;

    const SYSINFO: &str = r#"{"system":{"get_sysinfo":{"alias":"Desk","model":"HS110(US)","deviceId":"ABC123","mac":"50:C7:BF:00:00:01","feature":"TIM:ENE","relay_state":1}}}"#;
    const SYSINFO_NO_METER: &str = r#"{"system":{"get_sysinfo":{"alias":"Lamp","model":"HS100(US)","deviceId":"DEF456","feature":"TIM","relay_state":0}}}"#;
    const REALTIME: &str = r#"{"emeter":{"get_realtime":{"voltage_mv":120100,"current_ma":3770,"power_mw":452000,"total_wh":1200,"err_code":0}}}"#;

    /// Minimal plug: answers every framed request on every accepted
    /// connection and counts the connections it accepted.
    async fn fake_plug(sysinfo: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        spawn_plug(sysinfo, false).await
    }

    /// Like real firmware: hangs up after each reply.
    async fn hangup_plug(sysinfo: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        spawn_plug(sysinfo, true).await
    }

    async fn spawn_plug(
        sysinfo: &'static str,
        close_after_reply: bool,
    ) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    loop {
                        let mut header = [0u8; 4];
                        if socket.read_exact(&mut header).await.is_err() {
                            return;
                        }
                        let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
                        if socket.read_exact(&mut body).await.is_err() {
                            return;
                        }
                        let request = kasa::decode_body(&body).unwrap();
                        let reply = if request.contains("get_sysinfo") {
                            sysinfo
                        } else {
                            REALTIME
                        };
                        if socket.write_all(&kasa::encode_frame(reply)).await.is_err()
                            || close_after_reply
                        {
                            return;
                        }
                    }
                });
            }
        });

        (addr, connections)
    }

    fn source_for(addr: SocketAddr) -> KasaSource {
        let config = KasaConfig::new(addr.ip().to_string())
            .with_port(addr.port())
            .with_timeout(Duration::from_secs(2));
        KasaSource::new(config).unwrap()
    }

    #[test]
    fn test_requires_host() {
        let err = KasaSource::new(KasaConfig::new("  ")).err().unwrap();
        assert!(matches!(err, SourceError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_fetch_reuses_session() {
        let (addr, connections) = fake_plug(SYSINFO).await;
        let mut source = source_for(addr);

        let first = source.fetch_reading().await.unwrap();
        let second = source.fetch_reading().await.unwrap();

        assert!((first.watts - 452.0).abs() < 1e-9);
        assert!((second.amperes.unwrap() - 3.77).abs() < 1e-9);
        assert_eq!(connections.load(Ordering::SeqCst), 1);
        assert!(source.is_connected());

        source.close().await;
        assert!(!source.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_when_plug_hangs_up() {
        let (addr, connections) = hangup_plug(SYSINFO).await;
        let mut source = source_for(addr);

        for _ in 0..3 {
            let reading = source.fetch_reading().await.unwrap();
            assert!((reading.watts - 452.0).abs() < 1e-9);
        }

        // sysinfo on the first socket, then one fresh socket per meter read.
        assert_eq!(connections.load(Ordering::SeqCst), 4);
        source.close().await;
    }

    #[tokio::test]
    async fn test_plug_without_meter_is_configuration_error() {
        let (addr, _) = fake_plug(SYSINFO_NO_METER).await;
        let mut source = source_for(addr);

        let err = source.fetch_reading().await.unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = KasaConfig::new(addr.ip().to_string())
            .with_port(addr.port())
            .with_timeout(Duration::from_millis(200));
        let mut source = KasaSource::new(config).unwrap();

        let err = source.fetch_reading().await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)), "{err:?}");
        assert!(err.is_transient());
        assert!(!source.is_connected());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut source = source_for(addr);
        let err = source.fetch_reading().await.unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)), "{err:?}");
    }
}
