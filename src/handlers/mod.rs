pub(crate) mod chat_handlers;
pub(crate) mod payment_handlers;
pub(crate) mod property_handlers;
pub(crate) mod subscription_handlers;
pub(crate) mod ws_handlers;
