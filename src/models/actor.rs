use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Driver,
    Payment,
    System,
}

/// Who is driving an operation. `System` is never accepted from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Driver(Uuid),
    Payment,
    System,
}

impl Actor {
    pub fn role(&self) -> ActorRole {
        match self {
            Actor::Customer(_) => ActorRole::Customer,
            Actor::Driver(_) => ActorRole::Driver,
            Actor::Payment => ActorRole::Payment,
            Actor::System => ActorRole::System,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Customer(id) | Actor::Driver(id) => Some(*id),
            Actor::Payment | Actor::System => None,
        }
    }
}
