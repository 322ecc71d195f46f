//! Test utilities for the backend crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`, via
//! the `test-support` feature): clock doubles, retry doubles, fixtures, an
//! in-memory store implementing every persistence port and a fully wired
//! deployment over them.

pub mod app;
pub mod clock;
pub mod fixtures;
pub mod memory;
pub mod recording;
pub mod retry;

pub use app::{BOT_ID, DISPATCHER_CHAT, TestDeployment};
pub use clock::{MutableClock, fixed_clock, instant, mutable_clock};
pub use fixtures::{
    ADMIN_ID, DISPATCHER_ID, admin, closed_order, dispatcher, draft, master, order, technician,
};
pub use memory::InMemoryStore;
pub use recording::{
    RecordingNotifier, RecordingPublisher, RecordingTransport, SentNotice, TransportCall,
};
pub use retry::{ImmediateSleeper, NoJitter, RecordingSleeper, immediate_retry};
