use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type WsSender = mpsc::UnboundedSender<String>;

/// Fan-out point for report change events, keyed by organization. Pushes
/// are fire-and-forget: closed receivers are pruned while sending, an empty
/// audience is a no-op, and nothing here can fail a committed write.
#[derive(Clone)]
pub struct BroadcastHub {
    connections: Arc<DashMap<Uuid, Vec<(u64, WsSender)>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self, organization_id: Uuid) -> (u64, mpsc::UnboundedReceiver<String>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .entry(organization_id)
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    pub fn unsubscribe(&self, organization_id: Uuid, conn_id: u64) {
        if let Some(mut senders) = self.connections.get_mut(&organization_id) {
            senders.retain(|(id, _)| *id != conn_id);
            if senders.is_empty() {
                drop(senders);
                self.connections.remove(&organization_id);
            }
        }
    }

    pub fn broadcast_to_org(&self, organization_id: Uuid, message: &str) {
        if let Some(mut senders) = self.connections.get_mut(&organization_id) {
            // Remove closed channels while sending
            senders.retain(|(_, sender)| sender.send(message.to_string()).is_ok());
            if senders.is_empty() {
                drop(senders);
                self.connections.remove(&organization_id);
            }
        }
    }
}
