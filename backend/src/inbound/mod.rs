//! Inbound adapters translating external input into core calls.
//!
//! HTTP handlers live under [`http`]; [`events`] feeds committed domain events
//! from the bus to their in-process subscribers.

pub mod events;
pub mod http;
