// Public API for integration tests and potential library usage

pub mod api;
pub mod broadcast;
pub mod chat;
pub mod config;
pub mod counter;
pub mod delivery;
pub mod error;
pub mod message_log;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod store;
pub mod ws;
