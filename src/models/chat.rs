use crate::models::employee::EmployeeId;
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unordered pair of two distinct participants, stored sorted so that
/// `{a, b}` and `{b, a}` share one key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: EmployeeId,
    high: EmployeeId,
}

impl ParticipantPair {
    pub fn new(a: &str, b: &str) -> Option<Self> {
        if a == b {
            return None;
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Some(Self { low: low.to_string(), high: high.to_string() })
    }

    /// Index key. The low id is length-prefixed so ids containing `:`
    /// cannot make two different pairs collide.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.low.len(), self.low, self.high)
    }

    pub fn members(&self) -> [EmployeeId; 2] {
        [self.low.clone(), self.high.clone()]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: [EmployeeId; 2],
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message_text: String,
    #[serde(default)]
    pub last_message_from: Option<EmployeeId>,
    pub unread_counts: BTreeMap<EmployeeId, u64>,
}

impl Conversation {
    pub fn open(pair: &ParticipantPair, now: DateTime<Utc>) -> Self {
        let participants = pair.members();
        let unread_counts = participants
            .iter()
            .map(|p| (p.clone(), 0))
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            participants,
            last_message_at: now,
            last_message_text: String::new(),
            last_message_from: None,
            unread_counts,
        }
    }

    pub fn is_between(&self, pair: &ParticipantPair) -> bool {
        self.has_participant(&pair.low) && self.has_participant(&pair.high)
    }

    pub fn has_participant(&self, employee_id: &str) -> bool {
        self.participants.iter().any(|p| p == employee_id)
    }

    /// The participant that is not `employee_id`, or `None` when
    /// `employee_id` is not part of this conversation.
    pub fn other_participant(&self, employee_id: &str) -> Option<&str> {
        if !self.has_participant(employee_id) {
            return None;
        }
        self.participants
            .iter()
            .find(|p| p.as_str() != employee_id)
            .map(String::as_str)
    }

    pub fn unread_for(&self, employee_id: &str) -> u64 {
        self.unread_counts.get(employee_id).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub from: EmployeeId,
    pub to: EmployeeId,
    pub text: String,
    pub delivered: bool,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: &str,
        from: &str,
        to: &str,
        text: &str,
        now: DateTime<Utc>
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
            delivered: true,
            seen: false,
            created_at: now,
        }
    }
}
