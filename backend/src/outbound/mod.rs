//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed store ports using Diesel ORM
//! - **event_bus**: in-process tokio channel carrying committed events
//! - **chat**: reqwest gateway to the chat platform for mirrored cards and
//!   ingest replies
//!
//! Adapters are thin translators between domain types and their
//! infrastructure representations. They contain no business logic.

pub mod chat;
pub mod event_bus;
pub mod persistence;
