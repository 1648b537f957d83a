pub mod chat_rooms;
pub mod chat_service;
pub mod paystack;
pub mod quota;
pub mod sweep;
