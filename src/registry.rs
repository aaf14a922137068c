use crate::client::ChannelClient;
use crate::types::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Named set of clients, one per logical channel.
///
/// Owned by the caller and shared by cloning. `get_or_create` and `remove`
/// run under the same lock, so two callers racing for one key always end up
/// with the same client.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    clients: Arc<Mutex<HashMap<String, ChannelClient>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client registered under `key`, creating it with `create` if absent.
    ///
    /// `create` runs with the registry locked and must not block; it should
    /// only build the client (see [`ChannelClient::builder`]), not connect it.
    pub fn get_or_create<F>(&self, key: &str, create: F) -> Result<ChannelClient>
    where
        F: FnOnce() -> Result<ChannelClient>,
    {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        let client = create()?;
        tracing::debug!("Registered client '{}' for {}", key, client.endpoint().url());
        clients.insert(key.to_string(), client.clone());
        Ok(client)
    }

    pub fn get(&self, key: &str) -> Option<ChannelClient> {
        self.clients.lock().get(key).cloned()
    }

    /// Drop `key` from the registry without closing its client
    pub fn remove(&self, key: &str) -> Option<ChannelClient> {
        self.clients.lock().remove(key)
    }

    /// Remove `key` and close its client. Returns whether it was registered.
    pub async fn close(&self, key: &str) -> bool {
        let Some(client) = self.remove(key) else {
            return false;
        };
        client.close().await;
        true
    }

    /// Close and forget every registered client
    pub async fn close_all(&self) {
        let clients: Vec<(String, ChannelClient)> = self.clients.lock().drain().collect();
        for (key, client) in clients {
            tracing::debug!("Closing client '{}'", key);
            client.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.clients.lock().keys().cloned().collect()
    }
}
