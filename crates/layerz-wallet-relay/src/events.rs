//! Per-page outbound channels
//!
//! Each connected page context owns one unbounded channel. Responses and
//! provider events share it, so an event emitted before a response is
//! always received first by that page.

use crate::envelope::{ProviderEvent, RequestId, RpcResult};
use dashmap::DashMap;
use layerz_wallet_core::Origin;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Identifier of a connected page context
pub type PortId = Uuid;

/// Message delivered to a page context
#[derive(Debug)]
pub enum PortMessage {
    /// Outcome of a request; `ack` fires once the relay has taken it
    Response {
        id: RequestId,
        result: RpcResult,
        ack: Option<oneshot::Sender<()>>,
    },
    /// Provider event
    Event(ProviderEvent),
}

struct Port {
    origin: Origin,
    tx: mpsc::UnboundedSender<PortMessage>,
}

/// Registry of connected page contexts
#[derive(Default)]
pub struct EventHub {
    ports: DashMap<PortId, Port>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a page context for `origin`
    pub fn subscribe(&self, origin: Origin) -> (PortId, mpsc::UnboundedReceiver<PortMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let port = Uuid::new_v4();
        debug!(%port, %origin, "Page connected");
        self.ports.insert(port, Port { origin, tx });
        (port, rx)
    }

    /// Detach a page context; later messages for it are dropped
    pub fn unsubscribe(&self, port: PortId) -> bool {
        let removed = self.ports.remove(&port);
        if let Some((_, p)) = &removed {
            debug!(%port, origin = %p.origin, "Page disconnected");
        }
        removed.is_some()
    }

    pub fn origin_of(&self, port: PortId) -> Option<Origin> {
        self.ports.get(&port).map(|p| p.origin.clone())
    }

    /// Queue a message for one port. Returns `false` if the port is gone.
    pub fn send(&self, port: PortId, message: PortMessage) -> bool {
        match self.ports.get(&port) {
            Some(p) => p.tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Queue `event` for every port whose origin passes `filter`
    pub fn emit_where<F>(&self, event: &ProviderEvent, filter: F) -> usize
    where
        F: Fn(&Origin) -> bool,
    {
        let mut delivered = 0;
        for port in self.ports.iter() {
            if filter(&port.origin) && port.tx.send(PortMessage::Event(event.clone())).is_ok() {
                delivered += 1;
            }
        }
        debug!(event = event.name(), delivered, "Emitted provider event");
        delivered
    }

    /// Queue `event` for every port of `origin`
    pub fn emit_to_origin(&self, origin: &Origin, event: &ProviderEvent) -> usize {
        self.emit_where(event, |o| o == origin)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }
}
