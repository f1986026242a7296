//! Concurrent keyed registry of live tunnel snapshots (component C6),
//! shared between the endpoints (writers) and the REST observation server
//! (readers).

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::tunnel::Role;

#[derive(Debug, Clone, Serialize)]
pub struct TunnelSnapshot {
    pub id: Uuid,
    #[serde(rename = "streamId")]
    pub stream_id: u64,
    #[serde(rename = "endpointRole")]
    pub endpoint_role: Role,
    #[serde(rename = "clientAppAddr", skip_serializing_if = "Option::is_none")]
    pub client_app_addr: Option<String>,
    #[serde(rename = "serverAppAddr", skip_serializing_if = "Option::is_none")]
    pub server_app_addr: Option<String>,
    #[serde(rename = "remoteEndpointAddr")]
    pub remote_endpoint_addr: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "sendTotal")]
    pub send_total: u64,
    #[serde(rename = "recvTotal")]
    pub recv_total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "protocolProperties", skip_serializing_if = "Option::is_none")]
    pub protocol_properties: Option<serde_json::Value>,
}

/// A callback the tunnel registers alongside its snapshot so the REST
/// collaborator's close-by-id interface can tear it down without the store
/// needing to know anything about QUIC streams or connections.
pub trait TunnelHandle: Send + Sync {
    fn close(&self);
}

struct Entry {
    snapshot: TunnelSnapshot,
    handle: Arc<dyn TunnelHandle>,
}

#[derive(Default, Clone)]
pub struct DataStore {
    inner: Arc<DashMap<Uuid, Entry>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a tunnel's snapshot and close handle.
    pub fn store(&self, id: Uuid, snapshot: TunnelSnapshot, handle: Arc<dyn TunnelHandle>) {
        self.inner.insert(id, Entry { snapshot, handle });
    }

    pub fn delete(&self, id: Uuid) {
        self.inner.remove(&id);
    }

    pub fn load_all(&self) -> Vec<TunnelSnapshot> {
        self.inner.iter().map(|e| e.value().snapshot.clone()).collect()
    }

    pub fn load_one(&self, id: Uuid) -> Option<TunnelSnapshot> {
        self.inner.get(&id).map(|e| e.snapshot.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Closes the tunnel's stream and connection. Returns `false` if no
    /// such tunnel exists (the REST layer maps that to 404). Idempotent:
    /// the entry is removed by the tunnel's own teardown path, not here.
    pub fn close(&self, id: Uuid) -> bool {
        match self.inner.get(&id) {
            Some(entry) => {
                entry.handle.close();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandle;
    impl TunnelHandle for NoopHandle {
        fn close(&self) {}
    }

    fn snapshot(id: Uuid) -> TunnelSnapshot {
        TunnelSnapshot {
            id,
            stream_id: 0,
            endpoint_role: Role::Client,
            client_app_addr: Some("127.0.0.1:1".into()),
            server_app_addr: None,
            remote_endpoint_addr: "127.0.0.1:2".into(),
            created_at: "now".into(),
            send_total: 0,
            recv_total: 0,
            protocol: None,
            protocol_properties: None,
        }
    }

    #[test]
    fn store_then_load_then_delete() {
        let store = DataStore::new();
        let id = Uuid::new_v4();
        store.store(id, snapshot(id), Arc::new(NoopHandle));
        assert_eq!(store.len(), 1);
        assert!(store.load_one(id).is_some());
        store.delete(id);
        assert!(store.load_one(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn close_on_missing_id_returns_false() {
        let store = DataStore::new();
        assert!(!store.close(Uuid::new_v4()));
    }
}
