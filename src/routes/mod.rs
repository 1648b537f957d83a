pub mod chat;
pub mod payments;
pub mod properties;
pub mod subscriptions;
