//! Library entrypoint for gameday-bot.
//!
//! Exposes all modules so integration tests can import them.

pub mod api;
pub mod bot;
pub mod config;
pub mod data;
pub mod gateway;
