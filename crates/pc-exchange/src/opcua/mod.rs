//! OPC UA front end.
//!
//! The address space is one object, `ns=2;s=Process`, whose variables mirror
//! the process state. Services follow OPC UA semantics (browse, read, write,
//! monitored-item subscriptions, standard status codes); the session
//! transport is one JSON message per line over TCP.

mod address_space;
mod server;
mod service;

pub use address_space::{
    AddressSpace, DataValue, NodeDescription, NodeId, ProcessVariable, StatusCode, Variant,
    PROCESS_NAMESPACE,
};
pub use server::{ClientMessage, MAX_REQUEST_LINE, OpcUaConfig, OpcUaServer, ServerMessage};
pub use service::{DataChangeNotification, OpcUaService, Subscription};
