use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::models::chat::{ Conversation, Message, ParticipantPair };
use crate::store::{ ConversationStore, MessageLog, StoreError };

#[derive(Default)]
struct ConversationState {
    by_id: HashMap<String, Conversation>,
    by_pair: HashMap<ParticipantPair, String>,
}

/// Process-local conversation store. The pair index is the uniqueness
/// constraint; it is only touched under the write lock.
#[derive(Default)]
pub struct MemoryConversationStore {
    state: RwLock<ConversationState>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn checked(conv: &Conversation, pair: &ParticipantPair) -> Result<Conversation, StoreError> {
    if conv.is_between(pair) {
        Ok(conv.clone())
    } else {
        Err(StoreError::Corrupt(conv.id.clone()))
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_or_create(
        &self,
        a: &str,
        b: &str,
        now: DateTime<Utc>
    ) -> Result<Conversation, StoreError> {
        let pair = ParticipantPair::new(a, b).ok_or(StoreError::InvalidPair)?;

        {
            let state = self.state.read().await;
            if let Some(conv) = state.by_pair.get(&pair).and_then(|id| state.by_id.get(id)) {
                return checked(conv, &pair);
            }
        }

        let mut state = self.state.write().await;
        // another task may have created it between the two locks
        if let Some(conv) = state.by_pair.get(&pair).and_then(|id| state.by_id.get(id)) {
            return checked(conv, &pair);
        }
        let conv = Conversation::open(&pair, now);
        state.by_pair.insert(pair, conv.id.clone());
        state.by_id.insert(conv.id.clone(), conv.clone());
        Ok(conv)
    }

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().await.by_id.get(conversation_id).cloned())
    }

    async fn record_send(
        &self,
        conversation_id: &str,
        sender: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Result<Conversation, StoreError> {
        let mut state = self.state.write().await;
        let conv = state.by_id
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::MissingConversation(conversation_id.to_string()))?;
        let recipient = conv
            .other_participant(sender)
            .ok_or(StoreError::InvalidPair)?
            .to_string();

        conv.last_message_at = now;
        conv.last_message_text = text.to_string();
        conv.last_message_from = Some(sender.to_string());
        conv.unread_counts.insert(sender.to_string(), 0);
        *conv.unread_counts.entry(recipient).or_insert(0) += 1;
        Ok(conv.clone())
    }

    async fn mark_seen(
        &self,
        conversation_id: &str,
        reader: &str
    ) -> Result<Conversation, StoreError> {
        let mut state = self.state.write().await;
        let conv = state.by_id
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::MissingConversation(conversation_id.to_string()))?;
        if !conv.has_participant(reader) {
            return Err(StoreError::InvalidPair);
        }
        conv.unread_counts.insert(reader.to_string(), 0);
        Ok(conv.clone())
    }

    async fn list_for_participant(
        &self,
        employee_id: &str
    ) -> Result<Vec<Conversation>, StoreError> {
        let state = self.state.read().await;
        let mut convs: Vec<Conversation> = state.by_id
            .values()
            .filter(|c| c.has_participant(employee_id))
            .cloned()
            .collect();
        convs.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(convs)
    }
}

#[derive(Default)]
pub struct MemoryMessageLog {
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn append(
        &self,
        conversation_id: &str,
        from: &str,
        to: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Result<Message, StoreError> {
        let message = Message::new(conversation_id, from, to, text, now);
        self.messages
            .write().await
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self.messages.read().await.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn mark_seen(&self, conversation_id: &str, reader: &str) -> Result<usize, StoreError> {
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        if let Some(thread) = messages.get_mut(conversation_id) {
            for msg in thread.iter_mut().filter(|m| m.to == reader && !m.seen) {
                msg.seen = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
