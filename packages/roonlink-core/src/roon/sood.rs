//! SOOD-based Roon Core discovery.
//!
//! A query datagram is sent to the SOOD multicast group and to each
//! interface's broadcast address. Cores reply unicast to the sending socket,
//! so every socket is used for both send and receive.
//!
//! # Wire format
//!
//! ```text
//! "SOOD" 0x02 <type: 'Q' | 'R'> { <key len: u8> <key> <value len: u16 BE> <value> }*
//! ```
//!
//! A value length of `0xFFFF` encodes a null value.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use get_if_addrs::{get_if_addrs, IfAddr};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::{SessionError, SessionResult};
use crate::protocol_constants::{
    MOO_WS_PATH, SOOD_MAGIC, SOOD_MAX_DATAGRAM, SOOD_MULTICAST_ADDR, SOOD_MULTICAST_TTL,
    SOOD_PORT, SOOD_QUERY_INTERVAL_MS, SOOD_QUERY_ROUNDS, SOOD_SERVICE_ID,
};
use crate::utils::is_virtual_interface;

const NULL_VALUE_LEN: u16 = 0xFFFF;

/// Where to reach a Roon Core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreEndpoint {
    pub host: String,
    pub port: u16,
    /// Core's `unique_id`, when learned from discovery.
    pub core_id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl CoreEndpoint {
    /// Endpoint from a configured host/port, bypassing discovery.
    pub fn fixed(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            core_id: None,
            name: None,
            version: None,
        }
    }

    /// WebSocket URL of the Core's MOO endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, MOO_WS_PATH)
    }
}

impl std::fmt::Display for CoreEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} at {}:{}", name, self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message Encoding
// ─────────────────────────────────────────────────────────────────────────────

fn write_property(buf: &mut Vec<u8>, key: &str, value: Option<&str>) {
    buf.push(key.len() as u8);
    buf.extend_from_slice(key.as_bytes());
    match value {
        Some(v) => {
            buf.extend_from_slice(&(v.len() as u16).to_be_bytes());
            buf.extend_from_slice(v.as_bytes());
        }
        None => buf.extend_from_slice(&NULL_VALUE_LEN.to_be_bytes()),
    }
}

/// Builds a query datagram for Roon Cores, tagged with transaction id `tid`.
pub fn build_query(tid: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(SOOD_MAGIC);
    buf.push(b'Q');
    write_property(&mut buf, "query_service_id", Some(SOOD_SERVICE_ID));
    write_property(&mut buf, "_tid", Some(tid));
    buf
}

/// Decodes a SOOD datagram into its type byte and properties.
///
/// Returns `None` for anything that is not a well-formed SOOD message.
fn parse_message(buf: &[u8]) -> Option<(u8, HashMap<String, Option<String>>)> {
    if buf.len() < SOOD_MAGIC.len() + 1 || &buf[..SOOD_MAGIC.len()] != SOOD_MAGIC {
        return None;
    }
    let msg_type = buf[SOOD_MAGIC.len()];
    let mut props = HashMap::new();
    let mut pos = SOOD_MAGIC.len() + 1;

    while pos < buf.len() {
        let key_len = buf[pos] as usize;
        pos += 1;
        if key_len == 0 || pos + key_len + 2 > buf.len() {
            return None;
        }
        let key = std::str::from_utf8(&buf[pos..pos + key_len]).ok()?.to_string();
        pos += key_len;

        let value_len = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
        pos += 2;
        let value = if value_len == NULL_VALUE_LEN {
            None
        } else {
            let end = pos + value_len as usize;
            if end > buf.len() {
                return None;
            }
            let value = String::from_utf8_lossy(&buf[pos..end]).into_owned();
            pos = end;
            Some(value)
        };
        props.insert(key, value);
    }

    Some((msg_type, props))
}

/// Parses a Core's reply. `src` is the datagram's source address, used when
/// the reply carries no `_replyaddr`.
pub fn parse_reply(buf: &[u8], src: SocketAddr) -> Option<CoreEndpoint> {
    let (msg_type, mut props) = parse_message(buf)?;
    if msg_type != b'R' {
        return None;
    }
    let mut take = |key: &str| props.remove(key).flatten();

    if let Some(service_id) = take("service_id") {
        if service_id != SOOD_SERVICE_ID {
            log::debug!("[Sood] Ignoring reply for service {}", service_id);
            return None;
        }
    }
    let port = take("http_port")?.parse::<u16>().ok()?;
    let host = take("_replyaddr").unwrap_or_else(|| src.ip().to_string());

    Some(CoreEndpoint {
        host,
        port,
        core_id: take("unique_id"),
        name: take("name"),
        version: take("display_version"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Sockets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct InterfaceInfo {
    name: String,
    ip: Ipv4Addr,
    broadcast: Ipv4Addr,
}

/// Usable IPv4 interfaces, skipping loopback and virtual/container interfaces.
fn get_interfaces() -> Vec<InterfaceInfo> {
    get_if_addrs()
        .unwrap_or_else(|e| {
            log::warn!("[Sood] Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|iface| {
            if iface.is_loopback() || is_virtual_interface(&iface.name) {
                return None;
            }
            match iface.addr {
                IfAddr::V4(addr) => Some(InterfaceInfo {
                    broadcast: addr
                        .broadcast
                        .unwrap_or_else(|| broadcast_address(addr.ip, addr.netmask)),
                    ip: addr.ip,
                    name: iface.name,
                }),
                IfAddr::V6(_) => None,
            }
        })
        .collect()
}

/// Directed broadcast address of the subnet `ip` lives in.
fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

fn create_socket(iface_ip: Ipv4Addr) -> SessionResult<UdpSocket> {
    let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SessionError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[Sood] Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }
    if let Err(e) = socket.set_multicast_ttl_v4(SOOD_MULTICAST_TTL) {
        log::warn!("[Sood] Failed to set multicast TTL on {}: {}", iface_ip, e);
    }
    if let Err(e) = socket.set_multicast_if_v4(&iface_ip) {
        log::warn!("[Sood] Failed to set multicast interface {}: {}", iface_ip, e);
    }
    if let Err(e) = socket.set_broadcast(true) {
        log::warn!("[Sood] Failed to set SO_BROADCAST on {}: {}", iface_ip, e);
    }

    socket
        .set_nonblocking(true)
        .map_err(SessionError::SocketBind)?;
    socket
        .bind(&bind_addr.into())
        .map_err(SessionError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(SessionError::SocketBind)
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Finds a Roon Core on the local network. The first valid reply wins.
pub async fn discover(timeout: Duration) -> SessionResult<CoreEndpoint> {
    let interfaces = get_interfaces();
    if interfaces.is_empty() {
        return Err(SessionError::NoInterfaces);
    }

    let tid = uuid::Uuid::new_v4().to_string();
    let query = Arc::new(build_query(&tid));
    let (found_tx, mut found_rx) = mpsc::channel::<CoreEndpoint>(4);
    let mut tasks = JoinSet::new();
    let mut last_bind_error = None;

    for iface in interfaces {
        let socket = match create_socket(iface.ip) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                log::warn!("[Sood] Skipping interface {} ({}): {}", iface.name, iface.ip, e);
                last_bind_error = Some(e);
                continue;
            }
        };
        log::debug!("[Sood] Querying on {} ({})", iface.name, iface.ip);
        let InterfaceInfo { ip, broadcast, .. } = iface;

        let recv_socket = Arc::clone(&socket);
        let tx = found_tx.clone();
        tasks.spawn(async move {
            let mut buf = [0u8; SOOD_MAX_DATAGRAM];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, src)) => {
                        if let Some(endpoint) = parse_reply(&buf[..len], src) {
                            if tx.send(endpoint).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        log::debug!("[Sood] Receive failed on {}: {}", ip, e);
                        break;
                    }
                }
            }
        });

        let query = Arc::clone(&query);
        tasks.spawn(async move {
            let multicast = SocketAddr::from((SOOD_MULTICAST_ADDR, SOOD_PORT));
            let broadcast = SocketAddr::new(IpAddr::V4(broadcast), SOOD_PORT);
            for round in 0..SOOD_QUERY_ROUNDS {
                if round > 0 {
                    tokio::time::sleep(Duration::from_millis(SOOD_QUERY_INTERVAL_MS)).await;
                }
                for target in [multicast, broadcast] {
                    if let Err(e) = socket.send_to(&query, target).await {
                        log::debug!("[Sood] Send to {} via {} failed: {}", target, ip, e);
                    }
                }
            }
        });
    }
    drop(found_tx);

    if tasks.is_empty() {
        return Err(last_bind_error.unwrap_or(SessionError::NoInterfaces));
    }

    let result = tokio::time::timeout(timeout, found_rx.recv()).await;
    tasks.abort_all();

    match result {
        Ok(Some(endpoint)) => {
            log::info!("[Sood] Found Roon Core {}", endpoint);
            Ok(endpoint)
        }
        _ => Err(SessionError::DiscoveryTimeout {
            configured_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(props: &[(&str, Option<&str>)]) -> Vec<u8> {
        let mut buf = SOOD_MAGIC.to_vec();
        buf.push(b'R');
        for (key, value) in props {
            write_property(&mut buf, key, *value);
        }
        buf
    }

    fn src() -> SocketAddr {
        "192.168.1.20:9003".parse().unwrap()
    }

    #[test]
    fn broadcast_follows_the_netmask() {
        let ip = Ipv4Addr::new(172, 16, 4, 20);
        assert_eq!(
            broadcast_address(ip, Ipv4Addr::new(255, 255, 0, 0)),
            Ipv4Addr::new(172, 16, 255, 255)
        );
        assert_eq!(
            broadcast_address(ip, Ipv4Addr::new(255, 255, 254, 0)),
            Ipv4Addr::new(172, 16, 5, 255)
        );
        assert_eq!(
            broadcast_address(Ipv4Addr::new(192, 168, 1, 7), Ipv4Addr::new(255, 255, 255, 0)),
            Ipv4Addr::new(192, 168, 1, 255)
        );
    }

    #[test]
    fn query_layout() {
        let query = build_query("tid-1");

        assert_eq!(&query[..6], b"SOOD\x02Q");
        assert_eq!(query[6] as usize, "query_service_id".len());
        assert_eq!(&query[7..23], b"query_service_id");
        assert_eq!(u16::from_be_bytes([query[23], query[24]]), 36);
        assert_eq!(&query[25..61], SOOD_SERVICE_ID.as_bytes());
        assert_eq!(&query[61..], b"\x04_tid\x00\x05tid-1");
    }

    #[test]
    fn parses_core_reply() {
        let buf = reply(&[
            ("service_id", Some(SOOD_SERVICE_ID)),
            ("unique_id", Some("core-123")),
            ("name", Some("Studio Core")),
            ("display_version", Some("2.0 (build 1470)")),
            ("http_port", Some("9330")),
        ]);
        let endpoint = parse_reply(&buf, src()).unwrap();

        assert_eq!(endpoint.host, "192.168.1.20");
        assert_eq!(endpoint.port, 9330);
        assert_eq!(endpoint.core_id.as_deref(), Some("core-123"));
        assert_eq!(endpoint.name.as_deref(), Some("Studio Core"));
        assert_eq!(endpoint.ws_url(), "ws://192.168.1.20:9330/api");
    }

    #[test]
    fn reply_address_overrides_source() {
        let buf = reply(&[
            ("http_port", Some("9100")),
            ("_replyaddr", Some("10.0.0.5")),
        ]);
        let endpoint = parse_reply(&buf, src()).unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 9100);
    }

    #[test]
    fn null_values_are_accepted() {
        let buf = reply(&[("name", None), ("http_port", Some("9330"))]);
        let endpoint = parse_reply(&buf, src()).unwrap();
        assert_eq!(endpoint.name, None);
    }

    #[test]
    fn rejects_non_replies() {
        assert!(parse_reply(&build_query("x"), src()).is_none());
        assert!(parse_reply(b"NOPE\x02R", src()).is_none());
        assert!(parse_reply(&reply(&[("name", Some("No Port"))]), src()).is_none());
        assert!(parse_reply(
            &reply(&[("service_id", Some("other")), ("http_port", Some("1"))]),
            src()
        )
        .is_none());
    }

    #[test]
    fn rejects_truncated_property() {
        let mut buf = reply(&[("http_port", Some("9330"))]);
        buf.truncate(buf.len() - 2);
        assert!(parse_reply(&buf, src()).is_none());
    }

    #[test]
    fn fixed_endpoint_display() {
        let endpoint = CoreEndpoint::fixed("roon.local", 9330);
        assert_eq!(endpoint.to_string(), "roon.local:9330");
        assert_eq!(endpoint.ws_url(), "ws://roon.local:9330/api");
    }
}
