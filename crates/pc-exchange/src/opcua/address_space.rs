//! Nodes, values and status codes of the process address space.

use crate::error::ExchangeError;
use chrono::{DateTime, Utc};
use pc_runtime::ProcessSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace index the process nodes live in.
pub const PROCESS_NAMESPACE: u16 = 2;

const OPC_UA_NAMESPACE: &str = "http://opcfoundation.org/UA/";
const PROCESS_OBJECT: &str = "Process";

/// String-identified node id, written `ns=<index>;s=<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: String,
}

impl NodeId {
    pub fn new(namespace: u16, identifier: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};s={}", self.namespace, self.identifier)
    }
}

impl FromStr for NodeId {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ExchangeError::NodeId(s.to_string());
        let (ns, id) = s.split_once(';').ok_or_else(invalid)?;
        let namespace = ns
            .strip_prefix("ns=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(invalid)?;
        let identifier = id.strip_prefix("s=").filter(|i| !i.is_empty()).ok_or_else(invalid)?;
        Ok(Self::new(namespace, identifier))
    }
}

impl TryFrom<String> for NodeId {
    type Error = ExchangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// Typed value of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    Double(f64),
    Boolean(bool),
    String(String),
}

impl Variant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "Double",
            Self::Boolean(_) => "Boolean",
            Self::String(_) => "String",
        }
    }
}

/// Subset of the standard OPC UA status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Good,
    BadDecodingError,
    BadNodeIdUnknown,
    BadNotWritable,
    BadOutOfRange,
    BadTypeMismatch,
}

impl StatusCode {
    /// Standard OPC UA numeric code.
    pub fn bits(self) -> u32 {
        match self {
            Self::Good => 0x0000_0000,
            Self::BadDecodingError => 0x8007_0000,
            Self::BadNodeIdUnknown => 0x8034_0000,
            Self::BadNotWritable => 0x803B_0000,
            Self::BadOutOfRange => 0x803C_0000,
            Self::BadTypeMismatch => 0x8074_0000,
        }
    }

    pub fn is_good(self) -> bool {
        self.bits() & 0x8000_0000 == 0
    }
}

/// Value plus quality, as returned by read and in notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Variant>,
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    pub fn good(value: Variant, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::Good,
            source_timestamp: Some(source_timestamp),
        }
    }

    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
        }
    }
}

/// The variables of the `Process` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessVariable {
    Setpoint,
    Measurement,
    Output,
    Status,
    SensorValid,
    LoopState,
}

impl ProcessVariable {
    pub const ALL: [ProcessVariable; 6] = [
        ProcessVariable::Setpoint,
        ProcessVariable::Measurement,
        ProcessVariable::Output,
        ProcessVariable::Status,
        ProcessVariable::SensorValid,
        ProcessVariable::LoopState,
    ];

    pub fn browse_name(self) -> &'static str {
        match self {
            Self::Setpoint => "Setpoint",
            Self::Measurement => "Measurement",
            Self::Output => "Output",
            Self::Status => "Status",
            Self::SensorValid => "SensorValid",
            Self::LoopState => "LoopState",
        }
    }

    pub fn node_id(self) -> NodeId {
        NodeId::new(
            PROCESS_NAMESPACE,
            format!("{PROCESS_OBJECT}.{}", self.browse_name()),
        )
    }

    pub fn data_type(self) -> &'static str {
        match self {
            Self::Setpoint | Self::Measurement | Self::Output => "Double",
            Self::Status | Self::LoopState => "String",
            Self::SensorValid => "Boolean",
        }
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::Setpoint)
    }

    pub fn value(self, snapshot: &ProcessSnapshot) -> Variant {
        match self {
            Self::Setpoint => Variant::Double(snapshot.setpoint),
            Self::Measurement => Variant::Double(snapshot.measurement),
            Self::Output => Variant::Double(snapshot.output),
            Self::Status => Variant::String(snapshot.status.as_str().to_string()),
            Self::SensorValid => Variant::Boolean(snapshot.sensor_valid()),
            Self::LoopState => Variant::String(snapshot.loop_state.as_str().to_string()),
        }
    }
}

/// Browse result entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub node_id: NodeId,
    pub browse_name: String,
    pub data_type: String,
    pub writable: bool,
}

/// The served namespace and its nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    namespace_uri: String,
}

impl AddressSpace {
    pub fn new(namespace_uri: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
        }
    }

    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    /// Namespace table; index 2 is the process namespace, index 1 is left to
    /// the server's local namespace.
    pub fn namespace_array(&self) -> Vec<String> {
        vec![
            OPC_UA_NAMESPACE.to_string(),
            "urn:pc:server".to_string(),
            self.namespace_uri.clone(),
        ]
    }

    pub fn object_id(&self) -> NodeId {
        NodeId::new(PROCESS_NAMESPACE, PROCESS_OBJECT)
    }

    pub fn resolve(&self, node: &NodeId) -> Option<ProcessVariable> {
        if node.namespace != PROCESS_NAMESPACE {
            return None;
        }
        let name = node
            .identifier
            .strip_prefix(PROCESS_OBJECT)?
            .strip_prefix('.')?;
        ProcessVariable::ALL
            .into_iter()
            .find(|v| v.browse_name() == name)
    }

    /// Children of the `Process` object.
    pub fn browse(&self) -> Vec<NodeDescription> {
        ProcessVariable::ALL
            .into_iter()
            .map(|v| NodeDescription {
                node_id: v.node_id(),
                browse_name: v.browse_name().to_string(),
                data_type: v.data_type().to_string(),
                writable: v.writable(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_text_form() {
        let id: NodeId = "ns=2;s=Process.Setpoint".parse().unwrap();
        assert_eq!(id, ProcessVariable::Setpoint.node_id());
        assert_eq!(id.to_string(), "ns=2;s=Process.Setpoint");

        for bad in ["Process", "ns=x;s=A", "ns=2;i=5", "ns=2;s=", "ns=2"] {
            assert!(bad.parse::<NodeId>().is_err(), "{bad} parsed");
        }
    }

    #[test]
    fn node_id_serializes_as_string() {
        let json = serde_json::to_string(&ProcessVariable::Output.node_id()).unwrap();
        assert_eq!(json, "\"ns=2;s=Process.Output\"");
        assert!(serde_json::from_str::<NodeId>("\"garbage\"").is_err());
    }

    #[test]
    fn resolves_only_process_variables() {
        let space = AddressSpace::new("urn:test");
        assert_eq!(
            space.resolve(&ProcessVariable::SensorValid.node_id()),
            Some(ProcessVariable::SensorValid)
        );
        assert_eq!(space.resolve(&NodeId::new(3, "Process.Setpoint")), None);
        assert_eq!(space.resolve(&NodeId::new(2, "Process")), None);
        assert_eq!(space.resolve(&NodeId::new(2, "Process.Pressure")), None);
        assert_eq!(space.namespace_array()[2], "urn:test");
    }

    #[test]
    fn browse_lists_typed_variables() {
        let nodes = AddressSpace::new("urn:test").browse();
        assert_eq!(nodes.len(), 6);
        let writable: Vec<_> = nodes.iter().filter(|n| n.writable).collect();
        assert_eq!(writable.len(), 1);
        assert_eq!(writable[0].browse_name, "Setpoint");
        assert_eq!(writable[0].data_type, "Double");
    }

    #[test]
    fn status_code_bits() {
        assert!(StatusCode::Good.is_good());
        assert_eq!(StatusCode::BadNodeIdUnknown.bits(), 0x8034_0000);
        assert!(!StatusCode::BadOutOfRange.is_good());
    }

    #[test]
    fn variant_json_shape() {
        let json = serde_json::to_value(Variant::Double(1.5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Double", "value": 1.5}));
    }
}
