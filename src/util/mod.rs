//! Small concurrency primitives shared by the session core.
//!
//! - [`event_bus::EventBus`]: in-process pub/sub with bounded per-subscriber queues.
//! - [`waiters::Waiters`]: keyed one-shot rendezvous used to await gateway confirmations.

pub mod event_bus;
pub mod waiters;

pub use event_bus::{EventBus, OverflowPolicy, Subscription, Unsubscribe};
pub use waiters::{Registration, Waiter, Waiters};
