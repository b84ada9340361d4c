use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::{ debug, error };
use redis::{ AsyncCommands, Client };
use std::collections::{ BTreeMap, HashMap };
use crate::models::chat::{ Conversation, Message, ParticipantPair };
use crate::store::{ ConversationStore, MessageLog, StoreError };

const UNREAD_FIELD_PREFIX: &str = "unread:";
const CREATE_ATTEMPTS: usize = 3;

/// Redis layout, all keys under the configured prefix:
/// `conv:<id>` hash, `pair:<len(lo)>:<lo>:<hi>` uniqueness claim,
/// `inbox:<employee>` sorted set of conversation ids by last activity.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(client: Client, key_prefix: &str) -> Self {
        Self { client, key_prefix: key_prefix.to_string() }
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn conv_key(&self, id: &str) -> String {
        format!("{}conv:{}", self.key_prefix, id)
    }

    fn pair_key(&self, pair: &ParticipantPair) -> String {
        format!("{}pair:{}", self.key_prefix, pair.key())
    }

    fn inbox_key(&self, employee_id: &str) -> String {
        format!("{}inbox:{}", self.key_prefix, employee_id)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str
    ) -> Result<Option<Conversation>, StoreError> {
        let fields: HashMap<String, String> = conn.hgetall(self.conv_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode_conversation(id, &fields).map(Some)
    }

    async fn load_existing(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str
    ) -> Result<Conversation, StoreError> {
        self.load(conn, id).await?.ok_or_else(|| StoreError::MissingConversation(id.to_string()))
    }
}

fn encode_conversation(conv: &Conversation) -> Vec<(String, String)> {
    let mut fields = vec![
        ("p0".to_string(), conv.participants[0].clone()),
        ("p1".to_string(), conv.participants[1].clone()),
        ("lastMessageAt".to_string(), conv.last_message_at.to_rfc3339()),
        ("lastMessageText".to_string(), conv.last_message_text.clone())
    ];
    if let Some(from) = &conv.last_message_from {
        fields.push(("lastMessageFrom".to_string(), from.clone()));
    }
    for (participant, count) in &conv.unread_counts {
        fields.push((format!("{}{}", UNREAD_FIELD_PREFIX, participant), count.to_string()));
    }
    fields
}

fn decode_conversation(id: &str, fields: &HashMap<String, String>) -> Result<Conversation, StoreError> {
    let corrupt = || StoreError::Corrupt(id.to_string());
    let p0 = fields.get("p0").ok_or_else(corrupt)?.clone();
    let p1 = fields.get("p1").ok_or_else(corrupt)?.clone();
    let last_message_at = fields
        .get("lastMessageAt")
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(corrupt)?;

    let mut unread_counts = BTreeMap::new();
    for participant in [&p0, &p1] {
        let count = fields
            .get(&format!("{}{}", UNREAD_FIELD_PREFIX, participant))
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        unread_counts.insert(participant.clone(), count.max(0) as u64);
    }

    Ok(Conversation {
        id: id.to_string(),
        participants: [p0, p1],
        last_message_at,
        last_message_text: fields.get("lastMessageText").cloned().unwrap_or_default(),
        last_message_from: fields.get("lastMessageFrom").cloned(),
        unread_counts,
    })
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn get_or_create(
        &self,
        a: &str,
        b: &str,
        now: DateTime<Utc>
    ) -> Result<Conversation, StoreError> {
        let pair = ParticipantPair::new(a, b).ok_or(StoreError::InvalidPair)?;
        let pair_key = self.pair_key(&pair);
        let mut conn = self.get_connection().await?;

        for _ in 0..CREATE_ATTEMPTS {
            let existing: Option<String> = conn.get(&pair_key).await?;
            if let Some(id) = existing {
                if let Some(conv) = self.load(&mut conn, &id).await? {
                    if !conv.is_between(&pair) {
                        error!("Pair index {} points at conversation {} of other participants", pair_key, id);
                        return Err(StoreError::Corrupt(id));
                    }
                    return Ok(conv);
                }
            }

            // Write the record first so the pair claim never points at nothing.
            let conv = Conversation::open(&pair, now);
            let conv_key = self.conv_key(&conv.id);
            let _: () = conn.hset_multiple(&conv_key, &encode_conversation(&conv)).await?;

            let claimed: bool = conn.set_nx(&pair_key, &conv.id).await?;
            if claimed {
                let score = now.timestamp_millis();
                redis
                    ::pipe()
                    .atomic()
                    .zadd(self.inbox_key(&conv.participants[0]), &conv.id, score)
                    .ignore()
                    .zadd(self.inbox_key(&conv.participants[1]), &conv.id, score)
                    .ignore()
                    .query_async::<_, ()>(&mut conn).await?;
                return Ok(conv);
            }

            debug!("Lost conversation creation race for pair {}, retrying lookup", pair.key());
            let _: () = conn.del(&conv_key).await?;
        }

        error!("Could not settle conversation for pair {}", pair.key());
        Err(StoreError::MissingConversation(pair.key()))
    }

    async fn find(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        self.load(&mut conn, conversation_id).await
    }

    async fn record_send(
        &self,
        conversation_id: &str,
        sender: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Result<Conversation, StoreError> {
        let mut conn = self.get_connection().await?;
        let conv = self.load_existing(&mut conn, conversation_id).await?;
        let recipient = conv.other_participant(sender).ok_or(StoreError::InvalidPair)?;

        let conv_key = self.conv_key(conversation_id);
        let score = now.timestamp_millis();
        let metadata = [
            ("lastMessageAt".to_string(), now.to_rfc3339()),
            ("lastMessageText".to_string(), text.to_string()),
            ("lastMessageFrom".to_string(), sender.to_string()),
            (format!("{}{}", UNREAD_FIELD_PREFIX, sender), "0".to_string()),
        ];
        redis
            ::pipe()
            .atomic()
            .hset_multiple(&conv_key, &metadata)
            .ignore()
            .hincr(&conv_key, format!("{}{}", UNREAD_FIELD_PREFIX, recipient), 1)
            .ignore()
            .zadd(self.inbox_key(sender), conversation_id, score)
            .ignore()
            .zadd(self.inbox_key(recipient), conversation_id, score)
            .ignore()
            .query_async::<_, ()>(&mut conn).await?;

        self.load_existing(&mut conn, conversation_id).await
    }

    async fn mark_seen(
        &self,
        conversation_id: &str,
        reader: &str
    ) -> Result<Conversation, StoreError> {
        let mut conn = self.get_connection().await?;
        let conv = self.load_existing(&mut conn, conversation_id).await?;
        if !conv.has_participant(reader) {
            return Err(StoreError::InvalidPair);
        }
        let _: () = conn.hset(
            self.conv_key(conversation_id),
            format!("{}{}", UNREAD_FIELD_PREFIX, reader),
            0
        ).await?;
        self.load_existing(&mut conn, conversation_id).await
    }

    async fn list_for_participant(
        &self,
        employee_id: &str
    ) -> Result<Vec<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.inbox_key(employee_id), 0, -1).await?;
        let mut convs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&mut conn, &id).await {
                Ok(Some(conv)) => convs.push(conv),
                Ok(None) => debug!("Inbox of {} references missing conversation {}", employee_id, id),
                Err(e) => error!("Skipping unreadable conversation {}: {}", id, e),
            }
        }
        Ok(convs)
    }
}

/// Messages as JSON entries in `msgs:<conversation>`, appended with RPUSH so
/// list order is insertion order.
pub struct RedisMessageLog {
    client: Client,
    key_prefix: String,
}

impl RedisMessageLog {
    pub fn new(client: Client, key_prefix: &str) -> Self {
        Self { client, key_prefix: key_prefix.to_string() }
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}msgs:{}", self.key_prefix, conversation_id)
    }
}

#[async_trait]
impl MessageLog for RedisMessageLog {
    async fn append(
        &self,
        conversation_id: &str,
        from: &str,
        to: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Result<Message, StoreError> {
        let message = Message::new(conversation_id, from, to, text, now);
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(&message)?;
        let _: i64 = conn.rpush(self.key(conversation_id), json).await?;
        Ok(message)
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.get_connection().await?;
        let entries: Vec<String> = conn.lrange(self.key(conversation_id), 0, -1).await?;
        let mut messages = Vec::with_capacity(entries.len());
        for entry in &entries {
            match serde_json::from_str::<Message>(entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => error!("Error parsing message entry in {}: {}", conversation_id, e),
            }
        }
        Ok(messages)
    }

    async fn mark_seen(&self, conversation_id: &str, reader: &str) -> Result<usize, StoreError> {
        let mut conn = self.get_connection().await?;
        let key = self.key(conversation_id);
        let entries: Vec<String> = conn.lrange(&key, 0, -1).await?;

        // appends only grow the tail, so indices read here stay valid
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut changed = 0;
        for (index, entry) in entries.iter().enumerate() {
            let mut msg: Message = match serde_json::from_str(entry) {
                Ok(msg) => msg,
                Err(_) => continue,
            };
            if msg.to == reader && !msg.seen {
                msg.seen = true;
                pipe.lset(&key, index as isize, serde_json::to_string(&msg)?).ignore();
                changed += 1;
            }
        }
        if changed > 0 {
            pipe.query_async::<_, ()>(&mut conn).await?;
        }
        Ok(changed)
    }
}
