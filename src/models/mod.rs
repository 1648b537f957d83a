pub mod chat;
pub mod property;
pub mod subscription;
pub mod transaction;
pub mod user;
