//! Half-duplex byte pipe with per-connection traffic accounting.
//!
//! Each connection runs two pipes, one per direction. Whichever pipe
//! terminates first removes the connection's registry entry and writes the
//! access-log line; the second pipe's removal is a no-op.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ProxyError;
use crate::logging::{AccessLog, ErrorLog};
use crate::registry::{ConnectionKey, Direction, Registry};

const CHUNK_SIZE: usize = 1500;

/// Copies bytes from `src` to `dst` until `src` is closed or an I/O error
/// occurs, recording every successful read against `registry` before the
/// corresponding write is issued.
///
/// On termination, removes `key` from `registry`; if this pipe is the first
/// of the connection's two to finish, it also emits the access-log line.
/// Errors are logged to both the ambient diagnostic logger and `error_log`
/// as a [`ProxyError::Transfer`], then swallowed — never propagated to the
/// listener.
pub async fn run<R, W>(
    mut src: R,
    mut dst: W,
    key: ConnectionKey,
    direction: Direction,
    registry: Arc<Registry>,
    access_log: Arc<AccessLog>,
    error_log: Arc<ErrorLog>,
) where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let err = ProxyError::Transfer(format!("{:?} read ({:?}): {e}", key, direction));
                log::error!("{err}");
                error_log.record("ERROR", &format!("{err:?}")).await;
                break;
            }
        };

        registry.add_traffic(&key, direction, n as u64).await;

        if let Err(e) = dst.write_all(&buf[..n]).await {
            let err = ProxyError::Transfer(format!("{:?} write ({:?}): {e}", key, direction));
            log::error!("{err}");
            error_log.record("ERROR", &format!("{err:?}")).await;
            break;
        }
    }

    let _ = dst.shutdown().await;

    if let Some(info) = registry.remove(&key).await {
        access_log.record(&info).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::AccessLog;
    use crate::registry::ConnectionInfo;
    use tokio::io::duplex;

    #[tokio::test]
    async fn copies_bytes_and_accounts_traffic() {
        let registry = Arc::new(Registry::new());
        let access_log = Arc::new(AccessLog::disabled());
        let error_log = Arc::new(ErrorLog::disabled());
        let key: ConnectionKey = ("127.0.0.1".to_string(), 4000);

        registry
            .register(
                key.clone(),
                ConnectionInfo::new("127.0.0.1".to_string(), 4000, "example.com".to_string(), "CONNECT".to_string()),
            )
            .await
            .unwrap();

        let (mut src_write, src_read) = duplex(64);
        src_write.write_all(b"hello world").await.unwrap();
        drop(src_write); // EOF after the write

        let (dst_write, mut dst_read) = duplex(64);

        run(src_read, dst_write, key.clone(), Direction::Out, registry.clone(), access_log, error_log).await;

        let mut received = Vec::new();
        dst_read.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");

        assert_eq!(registry.live_count().await, 0);
        assert_eq!(registry.snapshot_globals().await.bytes_out, 11);
    }

    #[tokio::test]
    async fn write_error_records_transfer_entry_to_error_log() {
        let registry = Arc::new(Registry::new());
        let access_log = Arc::new(AccessLog::disabled());
        let dir = std::env::temp_dir();
        let error_log_path = dir.join(format!("nodpi-proxy-test-pipe-error-{}.log", std::process::id()));
        let error_log = Arc::new(ErrorLog::new(Some(error_log_path.clone()), false));
        let key: ConnectionKey = ("127.0.0.1".to_string(), 4001);

        registry
            .register(
                key.clone(),
                ConnectionInfo::new("127.0.0.1".to_string(), 4001, "example.com".to_string(), "CONNECT".to_string()),
            )
            .await
            .unwrap();

        let (mut src_write, src_read) = duplex(64);
        src_write.write_all(b"doomed write").await.unwrap();
        drop(src_write);

        // Dropping the read half makes the paired write half return an error.
        let (dst_write, dst_read) = duplex(64);
        drop(dst_read);

        run(src_read, dst_write, key.clone(), Direction::Out, registry.clone(), access_log, error_log).await;

        let contents = tokio::fs::read_to_string(&error_log_path).await.unwrap();
        tokio::fs::remove_file(&error_log_path).await.ok();
        assert!(contents.contains("Transfer"));
        assert_eq!(registry.live_count().await, 0);
    }
}
