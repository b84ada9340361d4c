mod memory;
mod redis;

pub use memory::{ MemoryConversationStore, MemoryMessageLog };
pub use self::redis::{ RedisConversationStore, RedisMessageLog };

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;
use crate::models::chat::{ Conversation, Message };

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("stored record is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored conversation {0} is corrupt")]
    Corrupt(String),

    #[error("conversation {0} does not exist")]
    MissingConversation(String),

    #[error("participants must be two distinct employees")]
    InvalidPair,

    #[error("unsupported store type: {0}")]
    Unsupported(String),
}

/// One conversation per unordered participant pair, with last-message
/// metadata and per-participant unread counters.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the conversation for `{a, b}`, creating it when absent.
    /// Concurrent first contact from both sides still yields one record.
    async fn get_or_create(
        &self,
        a: &str,
        b: &str,
        now: DateTime<Utc>
    ) -> Result<Conversation, StoreError>;

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Updates last-message metadata, zeroes the sender's counter and
    /// increments the other participant's counter in one atomic step.
    async fn record_send(
        &self,
        conversation_id: &str,
        sender: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Result<Conversation, StoreError>;

    /// Zeroes the reader's counter. Idempotent.
    async fn mark_seen(
        &self,
        conversation_id: &str,
        reader: &str
    ) -> Result<Conversation, StoreError>;

    /// Conversations containing `employee_id`, most recent first.
    async fn list_for_participant(
        &self,
        employee_id: &str
    ) -> Result<Vec<Conversation>, StoreError>;
}

/// Append-only message history per conversation.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(
        &self,
        conversation_id: &str,
        from: &str,
        to: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Result<Message, StoreError>;

    /// Full history, oldest first.
    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Flags every unseen message addressed to `reader` as seen and returns
    /// how many changed.
    async fn mark_seen(&self, conversation_id: &str, reader: &str) -> Result<usize, StoreError>;
}

pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageLog>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            conversations: Arc::new(MemoryConversationStore::new()),
            messages: Arc::new(MemoryMessageLog::new()),
        }
    }
}

pub fn create_stores(args: &Args) -> Result<Stores, StoreError> {
    info!("Conversations will be stored in: {} at {}", args.store_type, args.store_host);
    match args.store_type.to_lowercase().as_str() {
        "memory" => Ok(Stores::in_memory()),
        "redis" => {
            let client = ::redis::Client::open(args.store_host.as_str())?;
            Ok(Stores {
                conversations: Arc::new(
                    RedisConversationStore::new(client.clone(), &args.store_redis_prefix)
                ),
                messages: Arc::new(RedisMessageLog::new(client, &args.store_redis_prefix)),
            })
        }
        other => Err(StoreError::Unsupported(other.to_string())),
    }
}
