//! # Player Module
//!
//! Command API of the voice session core and the outward event stream.
//!
//! [`SessionManager`] ties the voice registry, the gateway, the audio backend
//! and the track-ident cache together behind `init`, `play`, `play_sound`,
//! `stop`, `set_volume`, `destroy` and `close`. Backend push events are
//! translated into [`DomainEvent`]s, but only for playback this process started.

pub mod events;
pub mod manager;

pub use events::{DomainEvent, EventKind};
pub use manager::{SessionManager, SessionSettings};
