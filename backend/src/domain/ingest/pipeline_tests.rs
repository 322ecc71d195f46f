//! Tests for the feed message pipeline.

use std::sync::Arc;

use mockable::Clock as _;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{IngestNotifierError, MockIngestNotifier, NoOpEventPublisher};
use crate::domain::{
    IngestConfig, OrderServicePorts, OrderStatus, ParseFailureKind, Role, RoleSet,
};
use crate::test_support::{
    InMemoryStore, MutableClock, RecordingNotifier, SentNotice, admin, dispatcher, instant,
    master, mutable_clock, order,
};

const S5_TEXT: &str = "С/м не крутит барабан. ул. Ленина 5-10. +79001234567 завтра к 14:00";
const FEED_CHAT: ChatId = ChatId::new(-200);
const BOT: UserId = UserId::new(42);

struct Harness {
    store: Arc<InMemoryStore>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<MutableClock>,
    pipeline: IngestPipeline,
}

fn build(
    store: Arc<InMemoryStore>,
    notifier: Arc<dyn IngestNotifier>,
) -> (Arc<MutableClock>, IngestPipeline) {
    let (source, clock) = mutable_clock("2026-03-02T06:00:00Z");
    let service = OrderService::new(
        OrderServicePorts {
            orders: store.clone(),
            identity: store.clone(),
            rates: store.clone(),
            audit: store.clone(),
            events: Arc::new(NoOpEventPublisher),
        },
        clock.clone(),
    );
    let pipeline = IngestPipeline::new(
        IngestPorts {
            orders: store.clone(),
            identity: store.clone(),
            config: store.clone(),
            telemetry: store,
            notifier,
        },
        service,
        IngestSettings {
            bot_principal_id: BOT,
            dispatcher_chat_id: Some(ChatId::new(100)),
            confirmation_ttl: Duration::from_secs(3600),
        },
        clock,
    );
    (source, pipeline)
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.add_user(UserId::new(1), RoleSet::new([Role::Admin]));
    store.add_user(UserId::new(100), RoleSet::new([Role::Dispatcher]));
    store.add_user(UserId::new(11), RoleSet::new([Role::Master]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (clock, pipeline) = build(store.clone(), notifier.clone());
    Harness {
        store,
        notifier,
        clock,
        pipeline,
    }
}

fn message(text: &str) -> IncomingMessage {
    IncomingMessage {
        text: text.to_owned(),
        message_id: MessageId::new(12345),
        sender_id: UserId::new(999),
        chat_id: FEED_CHAT,
    }
}

async fn awaiting(harness: &Harness) -> MessageId {
    match harness.pipeline.on_message(message(S5_TEXT)).await {
        Ok(IngestOutcome::AwaitingConfirmation {
            confirmation_id, ..
        }) => confirmation_id,
        other => panic!("expected a confirmation request, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn confirmed_message_becomes_an_order(harness: Harness) {
    let confirmation_id = awaiting(&harness).await;
    assert_eq!(harness.notifier.last_confirmation(), Some(confirmation_id));
    assert_eq!(harness.pipeline.pending().len(harness.clock.utc()), 1);

    let outcome = harness
        .pipeline
        .confirm(confirmation_id, ConfirmationDecision::Yes, &dispatcher())
        .await
        .expect("confirmation applied");

    let ConfirmationOutcome::Created { order } = outcome else {
        panic!("expected an order");
    };
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.equipment_type, "Washing machine");
    assert_eq!(order.problem_description, "не крутит барабан");
    assert_eq!(order.client_address, "ул. Ленина 5-10");
    assert_eq!(order.client_phone.as_deref(), Some("+79001234567"));
    assert_eq!(order.scheduled_time.as_deref(), Some("завтра к 14:00"));
    assert_eq!(order.scheduled_at, Some(instant("2026-03-03T11:00:00Z")));
    assert_eq!(order.source_message_id, Some(MessageId::new(12345)));
    assert!(harness.pipeline.pending().is_empty(harness.clock.utc()));

    let announced: Vec<ChatId> = harness
        .notifier
        .sent()
        .into_iter()
        .filter_map(|notice| match notice {
            SentNotice::OrderCreated { chat_id, .. } => Some(chat_id),
            _ => None,
        })
        .collect();
    assert_eq!(announced, vec![ChatId::new(1), ChatId::new(100)]);

    let telemetry = harness.store.telemetry();
    assert_eq!(telemetry.len(), 1);
    assert_eq!(telemetry[0].outcome, TelemetryOutcome::Success);
}

#[rstest]
#[tokio::test]
async fn duplicates_stop_before_confirmation(harness: Harness) {
    let mut existing = order(41, OrderStatus::New, 1);
    existing.client_address = "ул. Ленина 5-10".to_owned();
    harness.store.add_order(existing);

    let outcome = harness
        .pipeline
        .on_message(message(S5_TEXT))
        .await
        .expect("handled");

    assert_eq!(
        outcome,
        IngestOutcome::Duplicate {
            existing: OrderId::new(41)
        }
    );
    assert_eq!(
        harness.notifier.sent(),
        vec![SentNotice::Duplicate {
            chat_id: FEED_CHAT,
            existing: OrderId::new(41)
        }]
    );
    assert_eq!(harness.store.orders().len(), 1);
    assert!(harness.pipeline.pending().is_empty(harness.clock.utc()));
}

#[rstest]
#[tokio::test]
async fn closed_orders_only_show_up_as_history(harness: Harness) {
    let mut earlier = order(7, OrderStatus::Closed, 6);
    earlier.client_address = "ул. Ленина 5-10".to_owned();
    harness.store.add_order(earlier);

    let outcome = harness
        .pipeline
        .on_message(message(S5_TEXT))
        .await
        .expect("handled");

    assert!(matches!(outcome, IngestOutcome::AwaitingConfirmation { .. }));
    assert!(matches!(
        harness.notifier.sent().first(),
        Some(SentNotice::History { orders: 1, .. })
    ));
}

#[rstest]
#[case(UserId::new(42), "С/м не крутит барабан. ул. Ленина 5-10. +79001234567", IgnoreReason::OwnMessage)]
#[case(UserId::new(999), "ок, принято", IgnoreReason::TooShort)]
#[case(UserId::new(999), "14:30", IgnoreReason::TooShort)]
#[tokio::test]
async fn chatter_is_ignored_and_counted(
    harness: Harness,
    #[case] sender: UserId,
    #[case] text: &str,
    #[case] reason: IgnoreReason,
) {
    let mut incoming = message(text);
    incoming.sender_id = sender;

    let outcome = harness.pipeline.on_message(incoming).await.expect("handled");

    assert_eq!(outcome, IngestOutcome::Ignored { reason });
    assert!(harness.notifier.sent().is_empty());
    let telemetry = harness.store.telemetry();
    assert_eq!(telemetry.len(), 1);
    assert_eq!(telemetry[0].outcome, TelemetryOutcome::Ignored);
    assert_eq!(telemetry[0].elapsed_micros, 0);
}

#[rstest]
#[tokio::test]
async fn disabled_ingestion_ignores_everything(harness: Harness) {
    harness.store.set_ingest_config(IngestConfig {
        enabled: false,
        source_chat_id: None,
    });

    let outcome = harness
        .pipeline
        .on_message(message(S5_TEXT))
        .await
        .expect("handled");

    assert_eq!(
        outcome,
        IngestOutcome::Ignored {
            reason: IgnoreReason::Disabled
        }
    );
    assert!(harness.store.telemetry().is_empty());
}

#[rstest]
#[tokio::test]
async fn messages_from_other_chats_are_ignored(harness: Harness) {
    harness.store.set_ingest_config(IngestConfig {
        enabled: true,
        source_chat_id: Some(ChatId::new(-300)),
    });

    let outcome = harness
        .pipeline
        .on_message(message(S5_TEXT))
        .await
        .expect("handled");

    assert_eq!(
        outcome,
        IngestOutcome::Ignored {
            reason: IgnoreReason::ForeignChat
        }
    );
}

#[rstest]
#[tokio::test]
async fn invalid_phone_is_reported(harness: Harness) {
    let outcome = harness
        .pipeline
        .on_message(message("С/м не сливает воду\nул. Ленина 5\n900 12 34"))
        .await
        .expect("handled");

    let IngestOutcome::ParseFailed { failure } = outcome else {
        panic!("expected a parse failure");
    };
    assert_eq!(failure.kind, ParseFailureKind::InvalidFormat);
    assert!(matches!(
        harness.notifier.sent().as_slice(),
        [SentNotice::ParseFailed { chat_id, .. }] if *chat_id == FEED_CHAT
    ));
    let telemetry = harness.store.telemetry();
    assert_eq!(telemetry[0].outcome, TelemetryOutcome::Failure);
    assert_eq!(telemetry[0].failure_kind, Some(ParseFailureKind::InvalidFormat));
}

#[rstest]
#[tokio::test]
async fn missing_address_fails_quietly(harness: Harness) {
    let outcome = harness
        .pipeline
        .on_message(message("Холодильник не морозит совсем"))
        .await
        .expect("handled");

    assert!(matches!(outcome, IngestOutcome::ParseFailed { .. }));
    assert!(harness.notifier.sent().is_empty());
}

#[rstest]
#[tokio::test]
async fn declined_candidates_create_nothing(harness: Harness) {
    let confirmation_id = awaiting(&harness).await;

    let outcome = harness
        .pipeline
        .confirm(confirmation_id, ConfirmationDecision::No, &admin())
        .await
        .expect("declined");

    assert_eq!(outcome, ConfirmationOutcome::Declined);
    assert!(harness.store.orders().is_empty());
    let again = harness
        .pipeline
        .confirm(confirmation_id, ConfirmationDecision::Yes, &admin())
        .await;
    assert!(matches!(
        again,
        Err(DispatchError::NotFound {
            entity: Entity::Confirmation,
            ..
        })
    ));
}

#[rstest]
#[tokio::test]
async fn technicians_cannot_confirm(harness: Harness) {
    let confirmation_id = awaiting(&harness).await;

    let result = harness
        .pipeline
        .confirm(confirmation_id, ConfirmationDecision::Yes, &master(11, false))
        .await;

    assert!(matches!(result, Err(DispatchError::Forbidden { .. })));
    assert_eq!(harness.pipeline.pending().len(harness.clock.utc()), 1);
}

#[rstest]
#[tokio::test]
async fn confirmations_expire_after_the_ttl(harness: Harness) {
    let confirmation_id = awaiting(&harness).await;
    harness.clock.advance_seconds(3601);

    let result = harness
        .pipeline
        .confirm(confirmation_id, ConfirmationDecision::Yes, &dispatcher())
        .await;

    assert!(matches!(result, Err(DispatchError::NotFound { .. })));
    assert!(harness.store.orders().is_empty());
}

#[rstest]
#[tokio::test]
async fn unreachable_notifier_keeps_nothing_pending() {
    let store = Arc::new(InMemoryStore::new());
    let mut notifier = MockIngestNotifier::new();
    notifier
        .expect_request_confirmation()
        .times(1)
        .return_once(|_, _, _| Err(IngestNotifierError::delivery("chat API down")));
    let (clock, pipeline) = build(store, Arc::new(notifier));

    let result = pipeline.on_message(message(S5_TEXT)).await;

    assert!(matches!(result, Err(DispatchError::Unavailable { .. })));
    assert!(pipeline.pending().is_empty(clock.utc()));
}

#[rstest]
fn pending_entries_are_swept_lazily() {
    let pending = PendingConfirmations::new(Duration::from_secs(60));
    let now = instant("2026-03-02T06:00:00Z");
    let candidate = match parse_message(
        S5_TEXT,
        MessageId::new(1),
        now.with_timezone(&chrono::FixedOffset::east_opt(3 * 3600).expect("offset")),
    ) {
        Ok(candidate) => candidate,
        Err(failure) => panic!("fixture text must parse: {failure}"),
    };
    pending.insert(MessageId::new(9), candidate, now);

    assert_eq!(pending.len(now + chrono::TimeDelta::seconds(59)), 1);
    assert!(pending.is_empty(now + chrono::TimeDelta::seconds(60)));
    assert_eq!(pending.take(MessageId::new(9), now), None);
}
