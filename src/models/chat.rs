use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    Driver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatThread {
    pub fn role_of(&self, user_id: Uuid) -> Option<SenderRole> {
        if user_id == self.customer_id {
            Some(SenderRole::Customer)
        } else if user_id == self.driver_id {
            Some(SenderRole::Driver)
        } else {
            None
        }
    }

    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if user_id == self.customer_id {
            self.driver_id
        } else {
            self.customer_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: SenderRole,
    pub body: String,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
