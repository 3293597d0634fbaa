//! Accept loop shared by the protocol servers.

use crate::error::{ExchangeError, ExchangeResult};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Accept connections until `shutdown` flips, then close the listener and
/// wait for every open session to finish.
///
/// Sessions receive their own shutdown receiver and are expected to close
/// after the request in flight.
pub(crate) async fn serve_connections<H, Fut>(
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    protocol: &'static str,
    handler: H,
) -> ExchangeResult<()>
where
    H: Fn(TcpStream, SocketAddr, watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = ExchangeResult<()>> + Send + 'static,
{
    let mut sessions = JoinSet::new();

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(protocol, %peer, "connection accepted");
                    let session = handler(stream, peer, shutdown.clone());
                    sessions.spawn(async move {
                        match session.await {
                            Ok(()) => tracing::debug!(protocol, %peer, "connection closed"),
                            Err(err) => {
                                tracing::warn!(protocol, %peer, %err, "connection closed with error")
                            }
                        }
                    });
                }
                Err(err) => tracing::warn!(protocol, %err, "accept failed"),
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    drop(listener);
    tracing::info!(protocol, open = sessions.len(), "listener closed, draining sessions");
    while sessions.join_next().await.is_some() {}
    Ok(())
}

/// Bound one socket operation.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    io: impl Future<Output = std::io::Result<T>>,
) -> ExchangeResult<T> {
    match tokio::time::timeout(limit, io).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ExchangeError::Timeout(limit)),
    }
}
