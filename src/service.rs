use chrono::{ DateTime, Utc };
use log::{ debug, info, warn };
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use tokio::sync::Mutex as AsyncMutex;
use crate::directory::EmployeeDirectory;
use crate::error::{ ChatError, ChatResult };
use crate::fanout::{ channel_key, publish_json, Publisher };
use crate::models::chat::{ Conversation, Message };
use crate::models::employee::{ Employee, EmployeeId, Role };
use crate::models::websocket::{
    ConversationSummary,
    SeenPayload,
    EVENT_CONVERSATION_UPDATED,
    EVENT_MESSAGE_NEW,
    EVENT_MESSAGE_SEEN,
};
use crate::policy::{ can_message, can_see_conversation };
use crate::rate_limit::SendRateLimiter;
use crate::store::{ ConversationStore, MessageLog, Stores };

/// Strips U+0000..=U+001F and trims surrounding whitespace.
pub fn sanitize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !('\u{0000}'..='\u{001F}').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message: Message,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub conversation_id: String,
    pub other_employee_id: EmployeeId,
    pub other_name: String,
    pub other_role: Role,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: u64,
}

/// A message with both ends resolved against the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    #[serde(flatten)]
    pub message: Message,
    pub from_name: String,
    pub from_role: Role,
    pub to_name: String,
    pub to_role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadItem {
    pub conversation_id: String,
    pub unread_count: u64,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_from: Option<EmployeeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub total_unread: u64,
    pub items: Vec<UnreadItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenAck {
    pub conversation_id: String,
    pub marked: usize,
}

/// One async mutex per conversation. Holding it covers the log append and
/// the metadata update of a single send, so two sends into the same
/// conversation cannot interleave. Different conversations never contend.
#[derive(Default)]
struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    const PRUNE_ABOVE: usize = 4096;

    fn get(&self, conversation_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.len() > Self::PRUNE_ABOVE {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(conversation_id.to_string()).or_default().clone()
    }
}

struct AuthorizedConversation {
    conversation: Conversation,
    me: Employee,
    other: Employee,
}

pub struct MessagingService {
    directory: Arc<dyn EmployeeDirectory>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageLog>,
    limiter: SendRateLimiter,
    publisher: Arc<dyn Publisher>,
    locks: ConversationLocks,
}

impl MessagingService {
    pub fn new(
        directory: Arc<dyn EmployeeDirectory>,
        stores: Stores,
        limiter: SendRateLimiter,
        publisher: Arc<dyn Publisher>
    ) -> Self {
        Self {
            directory,
            conversations: stores.conversations,
            messages: stores.messages,
            limiter,
            publisher,
            locks: ConversationLocks::default(),
        }
    }

    async fn employee(&self, employee_id: &str) -> ChatResult<Option<Employee>> {
        Ok(self.directory.find(employee_id).await?)
    }

    async fn require_employee(&self, employee_id: &str) -> ChatResult<Employee> {
        self.employee(employee_id).await?.ok_or_else(|| ChatError::NotFound("Employee not found".to_string()))
    }

    /// Membership gives 404, policy denial gives 403. Both directions of the
    /// policy are checked against current assignment data.
    async fn authorize(
        &self,
        me_id: &str,
        conversation_id: &str,
        denied: &str
    ) -> ChatResult<AuthorizedConversation> {
        let conversation = self.conversations
            .find(conversation_id).await?
            .filter(|c| c.has_participant(me_id))
            .ok_or_else(|| ChatError::NotFound("Conversation not found".to_string()))?;
        let other_id = conversation
            .other_participant(me_id)
            .ok_or_else(|| ChatError::NotFound("Conversation not found".to_string()))?
            .to_string();

        let (me, other) = tokio::try_join!(self.employee(me_id), self.employee(&other_id))?;
        match (me, other) {
            (Some(me), Some(other)) if can_see_conversation(&me, &other) => {
                Ok(AuthorizedConversation { conversation, me, other })
            }
            _ => Err(ChatError::Forbidden(denied.to_string())),
        }
    }

    fn emit<T: Serialize>(&self, employee_id: &str, event: &str, payload: &T) {
        let channel = channel_key(employee_id);
        match publish_json(self.publisher.as_ref(), &channel, event, payload) {
            Ok(sessions) => debug!("{} delivered to {} session(s) on {}", event, sessions, channel),
            Err(e) => warn!("Failed to emit {} on {}: {}", event, channel, e),
        }
    }

    pub async fn send(
        &self,
        sender_id: &str,
        recipient_id: &str,
        raw_text: &str,
        now: DateTime<Utc>
    ) -> ChatResult<SendReceipt> {
        if sender_id.trim().is_empty() || recipient_id.trim().is_empty() {
            return Err(ChatError::InvalidInput("Missing sender or recipient".to_string()));
        }

        if !self.limiter.try_admit(sender_id, now) {
            warn!("Send rate limit exceeded for {}", sender_id);
            return Err(ChatError::RateLimited);
        }

        let (sender, recipient) = tokio::try_join!(
            self.employee(sender_id),
            self.employee(recipient_id)
        )?;
        let (Some(sender), Some(recipient)) = (sender, recipient) else {
            return Err(ChatError::NotFound("Employee not found".to_string()));
        };

        if !can_message(&sender, &recipient) {
            info!("Blocked message from {} ({}) to {} ({})", sender.id, sender.role, recipient.id, recipient.role);
            return Err(
                ChatError::Forbidden(
                    "You are not allowed to message this user based on role and assignment rules.".to_string()
                )
            );
        }

        let text = sanitize_text(raw_text);
        if text.is_empty() {
            return Err(ChatError::InvalidInput("Message text is required".to_string()));
        }

        let conversation = self.conversations.get_or_create(sender_id, recipient_id, now).await?;
        let lock = self.locks.get(&conversation.id);
        let (message, conversation) = {
            let _guard = lock.lock().await;
            // `now` was taken before the lock; never stamp earlier than the last send
            let latest = self.conversations
                .find(&conversation.id).await?
                .map_or(conversation.last_message_at, |c| c.last_message_at);
            let stamped = now.max(latest);
            let message = self.messages.append(
                &conversation.id,
                sender_id,
                recipient_id,
                &text,
                stamped
            ).await?;
            let conversation = self.conversations.record_send(
                &conversation.id,
                sender_id,
                &text,
                stamped
            ).await?;
            (message, conversation)
        };
        info!("Message {} from {} to {} in conversation {}", message.id, sender_id, recipient_id, conversation.id);

        let summary = ConversationSummary::from(&conversation);
        self.emit(recipient_id, EVENT_MESSAGE_NEW, &message);
        self.emit(sender_id, EVENT_CONVERSATION_UPDATED, &summary);
        self.emit(recipient_id, EVENT_CONVERSATION_UPDATED, &summary);

        Ok(SendReceipt { conversation_id: conversation.id, message })
    }

    pub async fn list_contacts(&self, me_id: &str) -> ChatResult<Vec<Contact>> {
        let me = self.require_employee(me_id).await?;
        let conversations = self.conversations.list_for_participant(me_id).await?;

        let mut contacts = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(other_id) = conversation.other_participant(me_id) else {
                continue;
            };
            let Some(other) = self.employee(other_id).await? else {
                debug!("Contact {} of {} no longer in directory", other_id, me_id);
                continue;
            };
            if !can_see_conversation(&me, &other) {
                continue;
            }
            contacts.push(Contact {
                conversation_id: conversation.id.clone(),
                other_employee_id: other.id.clone(),
                other_name: other.display_name().to_string(),
                other_role: other.role,
                last_message: conversation.last_message_text.clone(),
                last_message_at: conversation.last_message_at,
                unread_count: conversation.unread_for(me_id),
            });
        }
        Ok(contacts)
    }

    pub async fn get_thread(&self, me_id: &str, conversation_id: &str) -> ChatResult<Vec<ThreadMessage>> {
        let AuthorizedConversation { conversation, me, other } = self.authorize(
            me_id,
            conversation_id,
            "You are not allowed to view this conversation."
        ).await?;

        let messages = self.messages.list_by_conversation(&conversation.id).await?;
        let resolve = |id: &str| if id == me.id { &me } else { &other };
        Ok(
            messages
                .into_iter()
                .map(|message| {
                    let from = resolve(&message.from);
                    let to = resolve(&message.to);
                    ThreadMessage {
                        from_name: from.display_name().to_string(),
                        from_role: from.role,
                        to_name: to.display_name().to_string(),
                        to_role: to.role,
                        message,
                    }
                })
                .collect()
        )
    }

    pub async fn mark_seen(&self, me_id: &str, conversation_id: &str) -> ChatResult<SeenAck> {
        let AuthorizedConversation { conversation, other, .. } = self.authorize(
            me_id,
            conversation_id,
            "You are not allowed to modify this conversation."
        ).await?;

        let lock = self.locks.get(&conversation.id);
        let (marked, conversation) = {
            let _guard = lock.lock().await;
            let marked = self.messages.mark_seen(&conversation.id, me_id).await?;
            let conversation = self.conversations.mark_seen(&conversation.id, me_id).await?;
            (marked, conversation)
        };
        debug!("{} marked {} message(s) seen in {}", me_id, marked, conversation.id);

        let seen = SeenPayload {
            conversation_id: conversation.id.clone(),
            seen_by: me_id.to_string(),
        };
        self.emit(&other.id, EVENT_MESSAGE_SEEN, &seen);
        self.emit(me_id, EVENT_CONVERSATION_UPDATED, &ConversationSummary::from(&conversation));

        Ok(SeenAck { conversation_id: conversation.id, marked })
    }

    /// Badge data: only conversations still visible to `me` and holding
    /// unread messages, most recent first.
    pub async fn unread_summary(&self, me_id: &str) -> ChatResult<UnreadSummary> {
        let me = self.require_employee(me_id).await?;
        let conversations = self.conversations.list_for_participant(me_id).await?;

        let mut summary = UnreadSummary::default();
        for conversation in conversations {
            let unread = conversation.unread_for(me_id);
            if unread == 0 {
                continue;
            }
            let Some(other_id) = conversation.other_participant(me_id) else {
                continue;
            };
            let Some(other) = self.employee(other_id).await? else {
                continue;
            };
            if !can_see_conversation(&me, &other) {
                continue;
            }
            summary.total_unread += unread;
            summary.items.push(UnreadItem {
                conversation_id: conversation.id,
                unread_count: unread,
                last_message: conversation.last_message_text,
                last_message_at: conversation.last_message_at,
                last_message_from: conversation.last_message_from,
            });
        }
        summary.items.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(summary)
    }
}
