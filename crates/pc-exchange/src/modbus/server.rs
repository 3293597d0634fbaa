//! Modbus TCP server.

use super::frame::{MBAP_HEADER_LEN, MbapHeader, encode_frame, handle_pdu};
use super::registers::{DeviceIdentity, RegisterMap};
use crate::error::ExchangeResult;
use crate::listener::{serve_connections, with_timeout};
use pc_runtime::ProcessState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct ModbusConfig {
    pub bind: SocketAddr,
    pub map: RegisterMap,
    /// Bound on receiving the rest of a request once its first byte arrived,
    /// and on sending the response.
    pub request_timeout: Duration,
    pub identity: DeviceIdentity,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5020)),
            map: RegisterMap::default(),
            request_timeout: Duration::from_secs(5),
            identity: DeviceIdentity::default(),
        }
    }
}

/// A bound Modbus TCP listener serving one [`ProcessState`].
pub struct ModbusServer {
    listener: TcpListener,
    session: Arc<Session>,
}

struct Session {
    map: RegisterMap,
    identity: DeviceIdentity,
    request_timeout: Duration,
    state: Arc<ProcessState>,
}

impl ModbusServer {
    /// Bind the listening socket. Port 0 picks a free port; see
    /// [`ModbusServer::local_addr`].
    pub async fn bind(config: ModbusConfig, state: Arc<ProcessState>) -> ExchangeResult<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        Ok(Self {
            listener,
            session: Arc::new(Session {
                map: config.map,
                identity: config.identity,
                request_timeout: config.request_timeout,
                state,
            }),
        })
    }

    pub fn local_addr(&self) -> ExchangeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` becomes `true`, then wait for open connections
    /// to finish their current request.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> ExchangeResult<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, base = self.session.map.base_address(), "modbus server listening");
        let session = self.session;
        serve_connections(self.listener, shutdown, "modbus", move |stream, peer, shutdown| {
            let session = session.clone();
            async move { session.run(stream, peer, shutdown).await }
        })
        .await
    }
}

impl Session {
    async fn run(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> ExchangeResult<()> {
        let mut header = [0u8; MBAP_HEADER_LEN];
        loop {
            // Idle between requests until the client speaks or we shut down
            let first = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                first = stream.read_u8() => first,
            };
            match first {
                Ok(byte) => header[0] = byte,
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }

            let timeout = self.request_timeout;
            with_timeout(timeout, stream.read_exact(&mut header[1..])).await?;
            let mbap = MbapHeader::parse(&header)?;
            let mut pdu = vec![0u8; mbap.pdu_len()];
            with_timeout(timeout, stream.read_exact(&mut pdu)).await?;

            let response = handle_pdu(&self.map, &self.identity, &self.state, &pdu);
            tracing::debug!(
                %peer,
                transaction = mbap.transaction_id,
                unit = mbap.unit_id,
                ?response,
                "modbus request"
            );
            let frame = encode_frame(&mbap, &response);
            with_timeout(timeout, stream.write_all(&frame)).await?;

            if *shutdown.borrow() {
                break;
            }
        }
        Ok(())
    }
}
