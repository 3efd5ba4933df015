pub mod actor;
pub mod chat;
pub mod directory;
pub mod event;
pub mod location;
pub mod offer;
pub mod order;
