//! # Open Soundboard
//!
//! Per-guild voice session core of a Discord soundboard. Sounds are streamed by
//! a Lavalink node; this crate keeps the bot's voice presence, the node's
//! players and the outward playback events consistent with each other.
//!
//! ## Components
//!
//! - [`util`]: event bus and keyed waiters
//! - [`cache`]: expiring track-ident cache
//! - [`voice`]: voice registry, gateway requests and the voice-state listener
//! - [`lavalink`]: REST and websocket bridge to the audio backend
//! - [`player`]: the [`SessionManager`](player::SessionManager) command API
//! - [`storage`] and [`server`]: the `/file/<id>` endpoint Lavalink fetches sounds from

pub mod cache;
pub mod config;
pub mod error;
pub mod lavalink;
pub mod player;
pub mod server;
pub mod storage;
pub mod util;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
