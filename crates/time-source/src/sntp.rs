//! Minimal SNTPv4 client over UDP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::TimeSource;
use crate::error::{Error, Result};

/// Public pool queried when no servers are given.
pub const DEFAULT_NTP_SERVERS: [&str; 7] = [
    "ntp0.ntp-servers.net",
    "ntp1.ntp-servers.net",
    "ntp2.ntp-servers.net",
    "ntp3.ntp-servers.net",
    "ntp4.ntp-servers.net",
    "ntp5.ntp-servers.net",
    "ntp6.ntp-servers.net",
];

/// Per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const NTP_PORT: u16 = 123;
const PACKET_LEN: usize = 48;
const NTP_UNIX_OFFSET_SECS: i64 = 2_208_988_800;
const LI_VN_MODE_CLIENT: u8 = 0b0010_0011;
const MODE_SERVER: u8 = 4;

/// SNTP client that rotates to the next server after a failed query.
#[derive(Debug)]
pub struct SntpTimeSource {
    cursor: AtomicUsize,
    servers: Vec<String>,
    timeout: Duration,
}

impl SntpTimeSource {
    /// Creates a client for the given servers, each `host` or `host:port`.
    pub fn new(servers: Vec<String>, timeout: Duration) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            servers,
            timeout,
        }
    }

    async fn query(&self, server: &str) -> Result<DateTime<Utc>> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(split_host_port(server)).await?;

        let mut request = [0u8; PACKET_LEN];
        request[0] = LI_VN_MODE_CLIENT;
        let sent_at = Utc::now();
        request[40..48].copy_from_slice(&encode_timestamp(sent_at));
        socket.send(&request).await?;

        let mut response = [0u8; PACKET_LEN];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut response))
            .await
            .map_err(|_| Error::Timeout(server.to_string()))??;
        let received_at = Utc::now();

        let (server_received, server_sent) = parse_response(server, &response[..len])?;

        // Standard SNTP offset: mean of the two one-way differences.
        let offset = ((server_received - sent_at) + (server_sent - received_at)) / 2;
        let now = received_at + offset;

        debug!(%server, offset_ms = offset.num_milliseconds(), "queried time server");

        Ok(truncate_millis(now))
    }
}

impl Default for SntpTimeSource {
    fn default() -> Self {
        Self::new(
            DEFAULT_NTP_SERVERS.iter().map(ToString::to_string).collect(),
            DEFAULT_QUERY_TIMEOUT,
        )
    }
}

#[async_trait]
impl TimeSource for SntpTimeSource {
    async fn now_utc(&self) -> Result<DateTime<Utc>> {
        if self.servers.is_empty() {
            return Err(Error::NoServers);
        }

        let position = self.cursor.load(Ordering::Relaxed) % self.servers.len();
        let server = &self.servers[position];

        match self.query(server).await {
            Ok(now) => Ok(now),
            Err(e) => {
                warn!(%server, error = %e, "time server query failed");
                self.cursor
                    .store((position + 1) % self.servers.len(), Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

fn split_host_port(server: &str) -> (&str, u16) {
    server
        .rsplit_once(':')
        .and_then(|(host, port)| port.parse().ok().map(|port| (host, port)))
        .unwrap_or((server, NTP_PORT))
}

fn parse_response(server: &str, packet: &[u8]) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid = |reason| Error::InvalidResponse {
        server: server.to_string(),
        reason,
    };

    if packet.len() < PACKET_LEN {
        return Err(invalid("short packet"));
    }
    if packet[0] & 0b111 != MODE_SERVER {
        return Err(invalid("not a server reply"));
    }
    // Stratum 0 is a kiss-o'-death.
    if packet[1] == 0 {
        return Err(invalid("kiss-o'-death"));
    }

    let received = decode_timestamp(&packet[32..40]).ok_or_else(|| invalid("bad receive timestamp"))?;
    let transmitted =
        decode_timestamp(&packet[40..48]).ok_or_else(|| invalid("bad transmit timestamp"))?;

    Ok((received, transmitted))
}

fn encode_timestamp(instant: DateTime<Utc>) -> [u8; 8] {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let seconds = (instant.timestamp() + NTP_UNIX_OFFSET_SECS) as u32;
    let fraction = (u64::from(instant.timestamp_subsec_nanos()) << 32) / 1_000_000_000;

    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    #[allow(clippy::cast_possible_truncation)]
    bytes[4..].copy_from_slice(&(fraction as u32).to_be_bytes());
    bytes
}

fn decode_timestamp(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let seconds = u32::from_be_bytes(bytes[..4].try_into().ok()?);
    let fraction = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
    if seconds == 0 && fraction == 0 {
        return None;
    }

    // Era 1 starts in 2036; values with the top bit clear belong to it.
    let mut seconds = i64::from(seconds);
    if seconds < 0x8000_0000 {
        seconds += 1 << 32;
    }

    #[allow(clippy::cast_possible_truncation)]
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;

    DateTime::from_timestamp(seconds - NTP_UNIX_OFFSET_SECS, nanos)
}

fn truncate_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}
