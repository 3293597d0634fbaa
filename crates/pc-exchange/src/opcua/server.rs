//! Session transport: one JSON message per line over TCP.
//!
//! On connect the server sends a `session` message carrying a fresh session
//! id. Each client request line gets exactly one reply line. After a
//! `subscribe`, `data_change` messages are interleaved with replies whenever a
//! monitored value changes.
//!
//! ```text
//! -> {"op":"read","nodes":["ns=2;s=Process.Measurement"]}
//! <- {"kind":"read","results":[{"value":{"type":"Double","value":49.7},"status":"Good",...}]}
//! ```
//!
//! A request line longer than [`MAX_REQUEST_LINE`] bytes gets a
//! `BadDecodingError` reply and the session is closed.

use super::address_space::{AddressSpace, DataValue, NodeDescription, NodeId, StatusCode, Variant};
use super::service::{DataChangeNotification, OpcUaService, Subscription};
use crate::error::ExchangeResult;
use crate::listener::{serve_connections, with_timeout};
use pc_runtime::ProcessState;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use uuid::Uuid;

/// Longest accepted request line in bytes, newline included.
pub const MAX_REQUEST_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct OpcUaConfig {
    pub bind: SocketAddr,
    pub namespace_uri: String,
    /// Idle time after which a session without subscriptions is closed.
    pub session_timeout: Duration,
    /// Bound on sending one reply.
    pub request_timeout: Duration,
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4841)),
            namespace_uri: "urn:pc:process-control".to_string(),
            session_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Client requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMessage {
    Browse,
    Namespaces,
    Read { nodes: Vec<NodeId> },
    Write { node: NodeId, value: Variant },
    Subscribe { nodes: Vec<NodeId> },
    CloseSession,
}

/// Server replies and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Session { session_id: Uuid, namespace_uri: String },
    Browse { nodes: Vec<NodeDescription> },
    Namespaces { uris: Vec<String> },
    Read { results: Vec<DataValue> },
    Write { status: StatusCode },
    Subscribed { monitored: usize },
    DataChange { items: Vec<DataChangeNotification> },
    Error { status: StatusCode, message: String },
    Closed,
}

/// A bound OPC UA listener.
pub struct OpcUaServer {
    listener: TcpListener,
    session: Arc<Session>,
}

struct Session {
    service: OpcUaService,
    session_timeout: Duration,
    request_timeout: Duration,
}

impl OpcUaServer {
    pub async fn bind(config: OpcUaConfig, state: Arc<ProcessState>) -> ExchangeResult<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let service = OpcUaService::new(AddressSpace::new(config.namespace_uri), state);
        Ok(Self {
            listener,
            session: Arc::new(Session {
                service,
                session_timeout: config.session_timeout,
                request_timeout: config.request_timeout,
            }),
        })
    }

    pub fn local_addr(&self) -> ExchangeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> &OpcUaService {
        &self.session.service
    }

    /// Serve sessions until `shutdown` becomes `true`.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> ExchangeResult<()> {
        let addr = self.local_addr()?;
        tracing::info!(
            %addr,
            namespace = self.session.service.address_space().namespace_uri(),
            "opc ua server listening"
        );
        let session = self.session;
        serve_connections(self.listener, shutdown, "opcua", move |stream, peer, shutdown| {
            let session = session.clone();
            async move { session.run(stream, peer, shutdown).await }
        })
        .await
    }
}

impl Session {
    async fn run(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> ExchangeResult<()> {
        let session_id = Uuid::new_v4();
        let (reader, mut writer) = stream.into_split();
        let mut lines = RequestLines::new(reader);
        tracing::info!(%peer, %session_id, "opc ua session opened");

        let hello = ServerMessage::Session {
            session_id,
            namespace_uri: self.service.address_space().namespace_uri().to_string(),
        };
        self.send(&mut writer, &hello).await?;

        let mut subscription: Option<Subscription> = None;
        loop {
            // Subscribed sessions may stay silent indefinitely
            let idle = if subscription.is_some() {
                Duration::MAX
            } else {
                self.session_timeout
            };
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                line = with_timeout(idle, lines.next_line()) => {
                    let line = match line? {
                        RequestLine::Complete(line) => line,
                        RequestLine::TooLong => {
                            tracing::warn!(%peer, %session_id, "request line too long, closing session");
                            let reply = ServerMessage::Error {
                                status: StatusCode::BadDecodingError,
                                message: format!("request line exceeds {MAX_REQUEST_LINE} bytes"),
                            };
                            self.send(&mut writer, &reply).await?;
                            break;
                        }
                        RequestLine::Eof => break,
                    };
                    let line = line.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    let reply = match serde_json::from_slice::<ClientMessage>(line) {
                        Ok(request) => {
                            tracing::debug!(%session_id, ?request, "opc ua request");
                            self.dispatch(request, &mut subscription)
                        }
                        Err(err) => ServerMessage::Error {
                            status: StatusCode::BadDecodingError,
                            message: err.to_string(),
                        },
                    };
                    self.send(&mut writer, &reply).await?;
                    if reply == ServerMessage::Closed || *shutdown.borrow() {
                        break;
                    }
                }
                changes = next_changes(&mut subscription) => match changes {
                    Some(items) => self.send(&mut writer, &ServerMessage::DataChange { items }).await?,
                    None => subscription = None,
                },
            }
        }

        tracing::info!(%peer, %session_id, "opc ua session closed");
        Ok(())
    }

    fn dispatch(
        &self,
        request: ClientMessage,
        subscription: &mut Option<Subscription>,
    ) -> ServerMessage {
        match request {
            ClientMessage::Browse => ServerMessage::Browse {
                nodes: self.service.browse(),
            },
            ClientMessage::Namespaces => ServerMessage::Namespaces {
                uris: self.service.address_space().namespace_array(),
            },
            ClientMessage::Read { nodes } => ServerMessage::Read {
                results: self.service.read(&nodes),
            },
            ClientMessage::Write { node, value } => ServerMessage::Write {
                status: self.service.write(&node, &value),
            },
            ClientMessage::Subscribe { nodes } => match self.service.subscribe(&nodes) {
                Ok(sub) => {
                    let monitored = sub.items().len();
                    *subscription = Some(sub);
                    ServerMessage::Subscribed { monitored }
                }
                Err(status) => ServerMessage::Error {
                    status,
                    message: "subscription references an unknown node".to_string(),
                },
            },
            ClientMessage::CloseSession => ServerMessage::Closed,
        }
    }

    async fn send(&self, writer: &mut OwnedWriteHalf, message: &ServerMessage) -> ExchangeResult<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        with_timeout(self.request_timeout, writer.write_all(&line)).await
    }
}

enum RequestLine {
    Complete(Vec<u8>),
    TooLong,
    Eof,
}

/// Newline-delimited reader that never buffers more than
/// [`MAX_REQUEST_LINE`] bytes of one line.
///
/// Cancel safe: a partially read line stays in `pending` until the next call.
struct RequestLines {
    reader: BufReader<OwnedReadHalf>,
    pending: Vec<u8>,
}

impl RequestLines {
    fn new(reader: OwnedReadHalf) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<RequestLine> {
        let room = (MAX_REQUEST_LINE - self.pending.len()) as u64;
        let read = (&mut self.reader)
            .take(room)
            .read_until(b'\n', &mut self.pending)
            .await?;

        if self.pending.last() == Some(&b'\n') {
            return Ok(RequestLine::Complete(std::mem::take(&mut self.pending)));
        }
        if self.pending.len() >= MAX_REQUEST_LINE {
            self.pending.clear();
            return Ok(RequestLine::TooLong);
        }
        // End of stream, possibly after an unterminated last line
        if read == 0 && self.pending.is_empty() {
            Ok(RequestLine::Eof)
        } else {
            Ok(RequestLine::Complete(std::mem::take(&mut self.pending)))
        }
    }
}

async fn next_changes(
    subscription: &mut Option<Subscription>,
) -> Option<Vec<DataChangeNotification>> {
    match subscription {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_json_lines() {
        let read: ClientMessage =
            serde_json::from_str(r#"{"op":"read","nodes":["ns=2;s=Process.Output"]}"#).unwrap();
        assert_eq!(
            read,
            ClientMessage::Read {
                nodes: vec![NodeId::new(2, "Process.Output")]
            }
        );

        let write: ClientMessage = serde_json::from_str(
            r#"{"op":"write","node":"ns=2;s=Process.Setpoint","value":{"type":"Double","value":42.0}}"#,
        )
        .unwrap();
        assert!(matches!(write, ClientMessage::Write { value: Variant::Double(v), .. } if v == 42.0));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"op":"read","nodes":["bogus"]}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"op":"delete"}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged_by_kind() {
        let json = serde_json::to_value(ServerMessage::Write {
            status: StatusCode::BadNotWritable,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"kind": "write", "status": "BadNotWritable"}));
    }
}
