pub mod commands;
pub mod config;
pub mod data;
pub mod discord;
pub mod handlers;
pub mod logging;
pub mod moderation;
pub mod store;

pub const BOT_NAME: &str = "bailiff";
pub const COMMAND_TARGET: &str = "bailiff::command";
pub const ERROR_TARGET: &str = "bailiff::error";
pub const EVENT_TARGET: &str = "bailiff::handlers";
pub const AUDIT_TARGET: &str = "bailiff::audit";
pub const CONSOLE_TARGET: &str = "bailiff";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
