pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod groups;
pub mod materializer;
pub mod models;
pub mod notifier;
pub mod parameters;
pub mod rename;
pub mod retry;
pub mod sessions;
pub mod store;
pub mod timestamp;
pub mod trading_systems;
