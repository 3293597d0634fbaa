//! Read, write, browse and subscription services over the process state.

use super::address_space::{
    AddressSpace, DataValue, NodeDescription, NodeId, ProcessVariable, StatusCode, Variant,
};
use pc_runtime::{ProcessSnapshot, ProcessState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Service layer shared by every session.
#[derive(Debug, Clone)]
pub struct OpcUaService {
    space: Arc<AddressSpace>,
    state: Arc<ProcessState>,
}

impl OpcUaService {
    pub fn new(space: AddressSpace, state: Arc<ProcessState>) -> Self {
        Self {
            space: Arc::new(space),
            state,
        }
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn browse(&self) -> Vec<NodeDescription> {
        self.space.browse()
    }

    /// Read several nodes from one snapshot, so values read together are
    /// mutually consistent.
    pub fn read(&self, nodes: &[NodeId]) -> Vec<DataValue> {
        let snapshot = self.state.snapshot();
        nodes
            .iter()
            .map(|node| match self.space.resolve(node) {
                Some(var) => DataValue::good(var.value(&snapshot), snapshot.last_updated),
                None => DataValue::bad(StatusCode::BadNodeIdUnknown),
            })
            .collect()
    }

    /// Write one node. Only the setpoint is writable, and only with a Double
    /// inside the configured setpoint range.
    pub fn write(&self, node: &NodeId, value: &Variant) -> StatusCode {
        let Some(var) = self.space.resolve(node) else {
            return StatusCode::BadNodeIdUnknown;
        };
        if !var.writable() {
            return StatusCode::BadNotWritable;
        }
        let Variant::Double(setpoint) = value else {
            tracing::debug!(%node, got = value.type_name(), "write type mismatch");
            return StatusCode::BadTypeMismatch;
        };
        match self.state.write_setpoint(*setpoint) {
            Ok(_) => StatusCode::Good,
            Err(err) => {
                tracing::debug!(%node, %err, "setpoint write rejected");
                StatusCode::BadOutOfRange
            }
        }
    }

    /// Create a subscription monitoring `nodes`.
    ///
    /// # Errors
    ///
    /// [`StatusCode::BadNodeIdUnknown`] if any node does not resolve; nothing
    /// is monitored in that case.
    pub fn subscribe(&self, nodes: &[NodeId]) -> Result<Subscription, StatusCode> {
        let items = nodes
            .iter()
            .map(|node| self.space.resolve(node).ok_or(StatusCode::BadNodeIdUnknown))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Subscription::new(items, self.state.subscribe()))
    }
}

/// One changed monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeNotification {
    pub node_id: NodeId,
    pub value: DataValue,
}

/// Monitored items over the state's change feed.
///
/// The first [`Subscription::next`] reports every item's current value; after
/// that only items whose value changed are reported.
pub struct Subscription {
    rx: watch::Receiver<ProcessSnapshot>,
    items: Vec<ProcessVariable>,
    last: Vec<Option<Variant>>,
}

impl Subscription {
    fn new(items: Vec<ProcessVariable>, rx: watch::Receiver<ProcessSnapshot>) -> Self {
        let last = vec![None; items.len()];
        Self { rx, items, last }
    }

    pub fn items(&self) -> &[ProcessVariable] {
        &self.items
    }

    /// Wait for the next batch of changes. Returns `None` once the process
    /// state is gone.
    pub async fn next(&mut self) -> Option<Vec<DataChangeNotification>> {
        loop {
            if self.last.iter().any(Option::is_none) {
                // Initial values are due
                let snapshot = *self.rx.borrow_and_update();
                return Some(self.diff(&snapshot));
            }
            self.rx.changed().await.ok()?;
            let snapshot = *self.rx.borrow_and_update();
            let changes = self.diff(&snapshot);
            if !changes.is_empty() {
                return Some(changes);
            }
        }
    }

    fn diff(&mut self, snapshot: &ProcessSnapshot) -> Vec<DataChangeNotification> {
        let mut changes = Vec::new();
        for (var, last) in self.items.iter().zip(self.last.iter_mut()) {
            let value = var.value(snapshot);
            if last.as_ref() != Some(&value) {
                changes.push(DataChangeNotification {
                    node_id: var.node_id(),
                    value: DataValue::good(value.clone(), snapshot.last_updated),
                });
                *last = Some(value);
            }
        }
        changes
    }
}
