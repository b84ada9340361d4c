//! Per-user realtime channels.
//!
//! Every authenticated session subscribes to `user:<employeeId>`. Publishing
//! is at-most-once: no session means the event is dropped, and a session
//! whose buffer is full misses the event rather than blocking the sender.
//! Clients recover by re-reading contacts and threads.

use log::{ debug, warn };
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{ Arc, RwLock };
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;
use crate::models::websocket::ServerFrame;

pub const DEFAULT_SESSION_CAPACITY: usize = 64;

pub fn channel_key(employee_id: &str) -> String {
    format!("user:{}", employee_id)
}

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("failed to encode {event} payload: {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Transport-agnostic publish capability the messaging service depends on.
pub trait Publisher: Send + Sync {
    /// Returns the number of sessions the event was handed to.
    fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value
    ) -> Result<usize, FanoutError>;
}

/// Serializes `payload` and publishes it; encode failures become
/// `FanoutError` instead of panics.
pub fn publish_json<T: Serialize>(
    publisher: &dyn Publisher,
    channel: &str,
    event: &str,
    payload: &T
) -> Result<usize, FanoutError> {
    let value = serde_json::to_value(payload).map_err(|source| FanoutError::Encode {
        event: event.to_string(),
        source,
    })?;
    publisher.publish(channel, event, value)
}

type SessionMap = HashMap<String, HashMap<Uuid, mpsc::Sender<ServerFrame>>>;

/// In-process channel registry shared by the WebSocket server and the
/// messaging service.
pub struct ChannelHub {
    capacity: usize,
    channels: RwLock<SessionMap>,
}

/// Live subscription; dropping it leaves the channel.
pub struct Subscription {
    hub: Arc<ChannelHub>,
    channel: String,
    session_id: Uuid,
    pub receiver: mpsc::Receiver<ServerFrame>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(&self.channel, self.session_id);
    }
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        })
    }

    pub fn subscribe(self: &Arc<Self>, employee_id: &str) -> Subscription {
        let channel = channel_key(employee_id);
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.capacity);
        self.channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(channel.clone())
            .or_default()
            .insert(session_id, tx);
        debug!("Session {} joined {}", session_id, channel);
        Subscription { hub: Arc::clone(self), channel, session_id, receiver: rx }
    }

    fn remove(&self, channel: &str, session_id: Uuid) {
        let mut channels = self.channels.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sessions) = channels.get_mut(channel) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                channels.remove(channel);
            }
        }
        debug!("Session {} left {}", session_id, channel);
    }

    pub fn session_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(channel)
            .map_or(0, HashMap::len)
    }
}

impl Publisher for ChannelHub {
    fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value
    ) -> Result<usize, FanoutError> {
        let frame = ServerFrame::new(event, payload);
        let channels = self.channels.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sessions) = channels.get(channel) else {
            debug!("No active session on {}, dropping {}", channel, event);
            return Ok(0);
        };

        let mut delivered = 0;
        for (session_id, tx) in sessions {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Session {} on {} is lagging, dropping {}", session_id, channel, event);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Session {} on {} already closed", session_id, channel);
                }
            }
        }
        Ok(delivered)
    }
}
