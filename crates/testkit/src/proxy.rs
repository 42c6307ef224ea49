//! TCP relay that kills its first connections without answering.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Sits in front of `upstream`. The first `drop_first` accepted connections
/// are closed after the request bytes arrive; later ones are relayed.
pub struct FlakyProxy {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl FlakyProxy {
    pub async fn start(upstream: SocketAddr, drop_first: usize) -> std::io::Result<FlakyProxy> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let counter = accepted.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let (mut inbound, _) = tokio::select! {
                    _ = token.cancelled() => break,
                    conn = listener.accept() => match conn {
                        Ok(conn) => conn,
                        Err(_) => break,
                    },
                };
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    if seen < drop_first {
                        let mut buf = [0u8; 1024];
                        let _ = inbound.read(&mut buf).await;
                        return;
                    }
                    if let Ok(mut outbound) = TcpStream::connect(upstream).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
            }
        });

        Ok(FlakyProxy {
            addr,
            accepted,
            shutdown,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Connections accepted so far, dropped ones included.
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for FlakyProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
