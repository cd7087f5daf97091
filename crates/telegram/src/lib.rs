pub mod client;
pub mod gateway;

pub use client::TelegramClient;
pub use gateway::TelegramGateway;
