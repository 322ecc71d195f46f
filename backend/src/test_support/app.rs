//! Fully wired core over the in-memory doubles.
//!
//! Events go through the real mpsc bus; tests call
//! [`TestDeployment::drain_events`] to deliver whatever was committed so far,
//! which keeps mirror and archive effects deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::{ChatId, DomainEvent, IngestSettings, Role, RoleSet, UserId};
use crate::outbound::event_bus::{EVENT_BUS_CAPACITY, EventStream, event_channel};
use crate::server::{Core, CorePorts, build_core};

use super::clock::{MutableClock, mutable_clock};
use super::fixtures::{ADMIN_ID, DISPATCHER_ID, technician};
use super::memory::InMemoryStore;
use super::recording::{RecordingNotifier, RecordingTransport};
use super::retry::immediate_retry;

/// Principal of the feed bot in test deployments.
pub const BOT_ID: UserId = UserId::new(42);
/// Dispatcher channel announcing ingested orders.
pub const DISPATCHER_CHAT: ChatId = ChatId::new(100);

/// Core wired over in-memory ports with recording collaborators.
pub struct TestDeployment {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<MutableClock>,
    pub core: Core,
    events: Mutex<EventStream>,
    delivered: Mutex<Vec<DomainEvent>>,
}

impl TestDeployment {
    /// Deployment with an empty store, clock frozen at `now` (RFC 3339).
    pub fn new(now: &str) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let transport = Arc::new(RecordingTransport::default());
        let (source, clock) = mutable_clock(now);
        let (publisher, events) = event_channel(EVENT_BUS_CAPACITY);
        let ports = CorePorts {
            orders: store.clone(),
            identity: store.clone(),
            rates: store.clone(),
            audit: store.clone(),
            bindings: store.clone(),
            reports: store.clone(),
            archives: store.clone(),
            ingest_config: store.clone(),
            telemetry: store.clone(),
            transport: transport.clone(),
            notifier: notifier.clone(),
            events: Arc::new(publisher),
        };
        let settings = IngestSettings {
            bot_principal_id: BOT_ID,
            dispatcher_chat_id: Some(DISPATCHER_CHAT),
            confirmation_ttl: Duration::from_secs(24 * 60 * 60),
        };
        let core = build_core(ports, settings, immediate_retry(clock.clone()), clock);
        Self {
            store,
            notifier,
            transport,
            clock: source,
            core,
            events: Mutex::new(events),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Deployment seeded with the usual cast: admin `1`, dispatcher `100`,
    /// technician `1` (user `11`, MASTER) and technician `2` (user `12`,
    /// MASTER + SENIOR_MASTER).
    pub fn seeded(now: &str) -> Self {
        let deployment = Self::new(now);
        let store = &deployment.store;
        store.add_user(ADMIN_ID, RoleSet::new([Role::Admin]));
        store.add_user(DISPATCHER_ID, RoleSet::new([Role::Dispatcher]));
        store.add_user(UserId::new(11), RoleSet::new([Role::Master]));
        store.add_user(
            UserId::new(12),
            RoleSet::new([Role::Master, Role::SeniorMaster]),
        );
        store.add_technician(technician(1, 11));
        store.add_technician(technician(2, 12));
        deployment
    }

    /// Deliver every queued event to the subscribers and return them.
    pub async fn drain_events(&self) -> Vec<DomainEvent> {
        let mut batch = Vec::new();
        {
            let mut stream = match self.events.lock() {
                Ok(guard) => guard,
                Err(_) => panic!("event stream mutex"),
            };
            while let Ok(event) = stream.try_recv() {
                batch.push(event);
            }
        }
        for event in &batch {
            self.core.dispatcher.dispatch(event).await;
        }
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.extend(batch.iter().cloned()),
            Err(_) => panic!("delivered events mutex"),
        }
        batch
    }

    /// Every event delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<DomainEvent> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(_) => panic!("delivered events mutex"),
        }
    }
}
