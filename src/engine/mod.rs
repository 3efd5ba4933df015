pub mod chat;
pub mod lifecycle;
pub mod location;
pub mod maintenance;
pub mod negotiation;
pub mod pricing;

#[cfg(test)]
pub(crate) mod fixtures;
