//! Byte-transparent TCP forwarder
//!
//! Accepts on the camera's address and relays each connection to the real
//! NVR. Payloads are never inspected.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Running forwarder
pub struct StreamProxy {
    label: &'static str,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

async fn relay(mut inbound: TcpStream, target: String, cancel: CancellationToken) {
    let mut outbound = match TcpStream::connect(&target).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Proxy cannot reach {}: {}", target, e);
            return;
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::io::copy_bidirectional(&mut inbound, &mut outbound) => match result {
            Ok((up, down)) => tracing::trace!("Proxy connection to {} closed ({} up, {} down)", target, up, down),
            Err(e) => tracing::debug!("Proxy connection to {} ended: {}", target, e),
        }
    }
}

impl StreamProxy {
    /// Bind `listen` and forward every accepted connection to
    /// `target_host:target_port`.
    pub async fn bind(
        label: &'static str,
        listen: SocketAddr,
        target_host: &str,
        target_port: u16,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        Self::serve(label, listener, format!("{}:{}", target_host, target_port))
    }

    pub fn serve(label: &'static str, listener: TcpListener, target: String) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tracing::info!("{} proxy started: {} -> {}", label, local_addr, target);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::trace!("{} proxy accepted {}", label, peer);
                            tokio::spawn(relay(stream, target.clone(), token.child_token()));
                        }
                        Err(e) => tracing::warn!("{} proxy accept error: {}", label, e),
                    }
                }
            }
        });

        Ok(Self {
            label,
            local_addr,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the listener and every relayed connection.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("{} proxy task failed: {}", self.label, e);
        }
        tracing::debug!("{} proxy stopped", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Echo server standing in for the NVR
    async fn echo_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut r, mut w) = stream.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_bytes_forwarded_unchanged() {
        let upstream = echo_upstream().await;
        let proxy = StreamProxy::bind("RTSP", "127.0.0.1:0".parse().unwrap(), "127.0.0.1", upstream.port())
            .await
            .unwrap();

        let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
        let payload = b"OPTIONS rtsp://cam/1 RTSP/1.0\r\nCSeq: 1\r\n\r\n\x00\xff";
        client.write_all(payload).await.unwrap();
        let mut buf = vec![0u8; payload.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, payload);

        proxy.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener_and_connections() {
        let upstream = echo_upstream().await;
        let proxy = StreamProxy::bind("RTSP", "127.0.0.1:0".parse().unwrap(), "127.0.0.1", upstream.port())
            .await
            .unwrap();
        let addr = proxy.local_addr();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();

        proxy.stop().await;

        // Relayed connection is torn down
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_drops_client() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let proxy = StreamProxy::bind("Snapshot", "127.0.0.1:0".parse().unwrap(), "127.0.0.1", dead_port)
            .await
            .unwrap();
        let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        proxy.stop().await;
    }
}
