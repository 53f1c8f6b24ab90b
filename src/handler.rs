//! Per-connection state machine.
//!
//! Parses the client's initial request, opens the origin socket, optionally
//! fragments the first CONNECT payload, registers the connection, and spawns
//! the two pipes that carry its traffic. Every failure here is caught,
//! logged, and closes the client socket silently — nothing propagates to
//! the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::blacklist::Blacklist;
use crate::error::{ProxyError, Result};
use crate::fragment::fragment;
use crate::logging::{AccessLog, ErrorLog};
use crate::pipe;
use crate::registry::{ConnectionInfo, Direction, Registry};

const INITIAL_READ_SIZE: usize = 1500;
const TLS_HEADER_SIZE: usize = 5;
const TLS_PAYLOAD_SAMPLE: usize = 2048;

/// Handles one accepted client socket end to end. Never returns an error:
/// failures are logged via `error_log` and the socket is simply dropped.
pub async fn handle_connection(
    client: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    blacklist: Arc<Blacklist>,
    no_blacklist: bool,
    access_log: Arc<AccessLog>,
    error_log: Arc<ErrorLog>,
) {
    if let Err(e) = handle_connection_inner(client, peer, registry, blacklist, no_blacklist, access_log, error_log.clone()).await {
        log::error!("connection from {peer}: {e}");
        error_log.record("ERROR", &format!("{peer}: {e:?}")).await;
    }
}

async fn handle_connection_inner(
    mut client: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    blacklist: Arc<Blacklist>,
    no_blacklist: bool,
    access_log: Arc<AccessLog>,
    error_log: Arc<ErrorLog>,
) -> Result<()> {
    let mut buf = vec![0u8; INITIAL_READ_SIZE];
    let n = client.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    buf.truncate(n);

    let (method, target) = parse_request_line(&buf)?;

    if method.eq_ignore_ascii_case("CONNECT") {
        handle_connect(client, peer, &target, registry, blacklist, no_blacklist, access_log, error_log).await
    } else {
        handle_plain_http(client, peer, &method, &buf, registry, access_log, error_log).await
    }
}

async fn handle_connect(
    mut client: TcpStream,
    peer: SocketAddr,
    target: &str,
    registry: Arc<Registry>,
    blacklist: Arc<Blacklist>,
    no_blacklist: bool,
    access_log: Arc<AccessLog>,
    error_log: Arc<ErrorLog>,
) -> Result<()> {
    let (host, port) = split_host_port(target, 443)?;

    client.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await?;

    let mut origin = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| ProxyError::OriginUnreachable(format!("{host}:{port}: {e}")))?;

    let mut header = [0u8; TLS_HEADER_SIZE];
    let header_n = client.read(&mut header).await?;
    let mut payload = vec![0u8; TLS_PAYLOAD_SAMPLE];
    let payload_n = client.read(&mut payload).await?;
    payload.truncate(payload_n);

    let key = (peer.ip().to_string(), peer.port());
    let blocked = no_blacklist || blacklist.contains_any(&payload);

    if blocked {
        let mut rng = StdRng::from_entropy();
        let fragmented = fragment(&payload, &mut rng);
        origin.write_all(&fragmented).await?;
    } else {
        origin.write_all(&header[..header_n]).await?;
        origin.write_all(&payload).await?;
    }

    registry
        .register(key.clone(), ConnectionInfo::new(peer.ip().to_string(), peer.port(), host.clone(), "CONNECT".to_string()))
        .await
        .map_err(|k| ProxyError::RegistryInconsistency(format!("{k:?}")))?;

    if blocked {
        registry.record_blocked().await;
    } else {
        registry.record_allowed().await;
    }
    registry.record_total().await;

    spawn_pipes(client, origin, key, registry, access_log, error_log).await;
    Ok(())
}

async fn handle_plain_http(
    client: TcpStream,
    peer: SocketAddr,
    method: &str,
    initial: &[u8],
    registry: Arc<Registry>,
    access_log: Arc<AccessLog>,
    error_log: Arc<ErrorLog>,
) -> Result<()> {
    let host_header = extract_http_host(initial).ok_or_else(|| ProxyError::BadRequest("missing Host header".to_string()))?;
    let (host, port) = split_host_port(&host_header, 80)?;

    let mut origin = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| ProxyError::OriginUnreachable(format!("{host}:{port}: {e}")))?;

    origin.write_all(initial).await?;

    let key = (peer.ip().to_string(), peer.port());
    registry
        .register(key.clone(), ConnectionInfo::new(peer.ip().to_string(), peer.port(), host.clone(), method.to_string()))
        .await
        .map_err(|k| ProxyError::RegistryInconsistency(format!("{k:?}")))?;

    registry.record_allowed().await;
    registry.record_total().await;

    spawn_pipes(client, origin, key, registry, access_log, error_log).await;
    Ok(())
}

/// Spawns the connection's two pipe tasks and waits for both to finish.
///
/// Each pipe owns one read half and the other direction's write half, so
/// they run as independent tasks rather than borrowing a shared socket.
/// Whichever finishes first removes the registry entry; the handler task
/// itself (not the pipes) is what the supervisor's reaper tracks.
async fn spawn_pipes(
    client: TcpStream,
    origin: TcpStream,
    key: crate::registry::ConnectionKey,
    registry: Arc<Registry>,
    access_log: Arc<AccessLog>,
    error_log: Arc<ErrorLog>,
) {
    let (client_read, client_write) = tokio::io::split(client);
    let (origin_read, origin_write) = tokio::io::split(origin);

    let out_task = tokio::spawn(pipe::run(
        client_read,
        origin_write,
        key.clone(),
        Direction::Out,
        registry.clone(),
        access_log.clone(),
        error_log.clone(),
    ));
    let in_task = tokio::spawn(pipe::run(origin_read, client_write, key, registry, access_log, error_log));

    let _ = tokio::join!(out_task, in_task);
}

/// Parses the first line of an HTTP request into `(method, target)`.
fn parse_request_line(buf: &[u8]) -> Result<(String, String)> {
    let line_end = buf.iter().position(|&b| b == b'\r' || b == b'\n').unwrap_or(buf.len());
    let line = std::str::from_utf8(&buf[..line_end]).map_err(|_| ProxyError::BadRequest("non-utf8 request line".to_string()))?;

    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or_else(|| ProxyError::BadRequest("empty request line".to_string()))?;
    let target = parts.next().ok_or_else(|| ProxyError::BadRequest("missing request target".to_string()))?;

    Ok((method.to_string(), target.to_string()))
}

/// Splits `host[:port]` into `(host, port)`, defaulting to `default_port`
/// when no port is given.
fn split_host_port(target: &str, default_port: u16) -> Result<(String, u16)> {
    match target.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| ProxyError::BadRequest(format!("non-numeric port in {target}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((target.to_string(), default_port)),
    }
}

/// Case-insensitive, byte-level scan for a `Host:` header line.
///
/// Mirrors a plain-HTTP proxy's usual approach of locating the Host header
/// without a full header-block parse: scan line by line, match the token
/// case-insensitively, and trim surrounding whitespace from the value.
fn extract_http_host(buf: &[u8]) -> Option<String> {
    for line in buf.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() < 5 {
            continue;
        }
        if line[..5].eq_ignore_ascii_case(b"host:") {
            let value = &line[5..];
            let value = std::str::from_utf8(value).ok()?.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_request_line() {
        let (method, target) = parse_request_line(b"CONNECT example.com:443 HTTP/1.1\r\n").unwrap();
        assert_eq!(method, "CONNECT");
        assert_eq!(target, "example.com:443");
    }

    #[test]
    fn rejects_malformed_request_line() {
        assert!(parse_request_line(b"CONNECT\r\n").is_err());
        assert!(parse_request_line(b"\r\n").is_err());
    }

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("example.com:8443", 443).unwrap(), ("example.com".to_string(), 8443));
        assert_eq!(split_host_port("example.com", 443).unwrap(), ("example.com".to_string(), 443));
        assert!(split_host_port("example.com:notaport", 443).is_err());
    }

    #[test]
    fn extracts_host_header_case_insensitively() {
        let req = b"GET / HTTP/1.1\r\nHOST: Example.com\r\nAccept: */*\r\n\r\n";
        assert_eq!(extract_http_host(req), Some("Example.com".to_string()));
    }

    #[test]
    fn missing_host_header_returns_none() {
        let req = b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n";
        assert_eq!(extract_http_host(req), None);
    }
}
