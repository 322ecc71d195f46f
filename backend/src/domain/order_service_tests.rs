//! Tests for the order lifecycle service.

use std::sync::Arc;

use mockall::predicate::eq;
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;
use crate::domain::finance::SpecialtyRate;
use crate::domain::ports::{
    EventPublisherError, FixtureSpecialtyRateRepository, MockAuditLogRepository,
    MockEventPublisher, MockIdentityRepository, MockOrderRepository,
};
use crate::domain::{RoleSet, UnavailableReason, UserId};
use crate::test_support::{
    InMemoryStore, RecordingPublisher, admin, dispatcher, draft, fixed_clock, master, order,
    technician,
};

const T1: TechnicianId = TechnicianId::new(1);
const T2: TechnicianId = TechnicianId::new(2);

struct Harness {
    store: Arc<InMemoryStore>,
    events: Arc<RecordingPublisher>,
    service: OrderService,
}

impl Harness {
    async fn create(&self) -> Order {
        self.service
            .create(draft(), &dispatcher())
            .await
            .expect("dispatcher creates order")
    }

    /// Create, assign and walk an order to ONSITE; returns it at version 4.
    async fn onsite(&self, technician_id: TechnicianId, holder: &Actor) -> Order {
        let created = self.create().await;
        let assigned = self
            .service
            .assign(created.id, technician_id, &dispatcher(), created.version)
            .await
            .expect("assign");
        let accepted = self
            .service
            .transition(assigned.id, OrderStatus::Accepted, holder, None, assigned.version)
            .await
            .expect("accept");
        self.service
            .transition(accepted.id, OrderStatus::Onsite, holder, None, accepted.version)
            .await
            .expect("onsite")
    }
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.add_user(UserId::new(100), RoleSet::new([Role::Dispatcher]));
    store.add_user(UserId::new(11), RoleSet::new([Role::Master]));
    store.add_user(UserId::new(12), RoleSet::new([Role::Master, Role::SeniorMaster]));
    store.add_technician(technician(1, 11));
    store.add_technician(technician(2, 12));
    let events = Arc::new(RecordingPublisher::default());
    let service = OrderService::new(
        OrderServicePorts {
            orders: store.clone(),
            identity: store.clone(),
            rates: store.clone(),
            audit: store.clone(),
            events: events.clone(),
        },
        fixed_clock("2026-03-02T09:00:00Z"),
    );
    Harness {
        store,
        events,
        service,
    }
}

fn money(total: Decimal, materials: Decimal) -> Money {
    Money {
        total_amount: total,
        materials_cost: materials,
    }
}

#[rstest]
#[tokio::test]
async fn full_lifecycle_splits_high_net_evenly(harness: Harness) {
    let onsite = harness.onsite(T1, &master(11, false)).await;
    assert_eq!(onsite.version, 4);

    let closed = harness
        .service
        .close(
            onsite.id,
            money(dec!(10000), dec!(2000)),
            CloseFlags::default(),
            &master(11, false),
            onsite.version,
        )
        .await
        .expect("close");

    assert_eq!(closed.status, OrderStatus::Closed);
    let settlement = closed.settlement.expect("settlement on closed order");
    assert_eq!(settlement.technician_share, dec!(4000.00));
    assert_eq!(settlement.company_share, dec!(4000.00));
    assert_eq!(harness.store.status_entries(closed.id).len(), 5);
    assert!(matches!(
        harness.events.events().last(),
        Some(DomainEvent::OrderClosed { version: 5, .. })
    ));
}

#[rstest]
#[tokio::test]
async fn senior_master_gets_half_plus_review_bonus(harness: Harness) {
    let holder = master(12, true);
    let onsite = harness.onsite(T2, &holder).await;

    let closed = harness
        .service
        .close(
            onsite.id,
            money(dec!(6000), dec!(1000)),
            CloseFlags {
                has_review: true,
                out_of_city: false,
            },
            &holder,
            onsite.version,
        )
        .await
        .expect("close");

    let settlement = closed.settlement.expect("settlement");
    assert_eq!(settlement.net(), dec!(5000));
    assert_eq!(settlement.technician_share, dec!(3000.00));
    assert_eq!(settlement.company_share, dec!(2000.00));
}

#[rstest]
#[tokio::test]
async fn second_close_with_stale_version_is_rejected(harness: Harness) {
    let holder = master(11, false);
    let onsite = harness.onsite(T1, &holder).await;
    let first = harness
        .service
        .close(
            onsite.id,
            money(dec!(5000), dec!(0)),
            CloseFlags::default(),
            &holder,
            4,
        )
        .await
        .expect("first close wins");
    assert_eq!(first.version, 5);

    let second = harness
        .service
        .close(
            onsite.id,
            money(dec!(9000), dec!(0)),
            CloseFlags::default(),
            &holder,
            4,
        )
        .await;

    assert_eq!(
        second,
        Err(DispatchError::concurrent(Entity::Order, onsite.id.get(), 4))
    );
    assert_eq!(harness.store.order(onsite.id), Some(first));
    assert_eq!(harness.store.status_entries(onsite.id).len(), 5);
}

#[rstest]
#[tokio::test]
async fn dispatcher_cannot_close_a_new_order(harness: Harness) {
    let created = harness.create().await;

    let result = harness
        .service
        .transition(created.id, OrderStatus::Closed, &dispatcher(), None, 1)
        .await;

    assert_eq!(
        result,
        Err(DispatchError::InvalidTransition {
            from: Some(OrderStatus::New),
            to: OrderStatus::Closed,
            roles: RoleSet::new([Role::Dispatcher]),
        })
    );
    assert_eq!(harness.store.status_entries(created.id).len(), 1);
    assert_eq!(harness.store.order(created.id).map(|o| o.version), Some(1));
}

#[rstest]
#[tokio::test]
async fn only_the_holding_technician_may_accept(harness: Harness) {
    let created = harness.create().await;
    let assigned = harness
        .service
        .assign(created.id, T1, &dispatcher(), 1)
        .await
        .expect("assign");

    let result = harness
        .service
        .transition(assigned.id, OrderStatus::Accepted, &master(12, true), None, 2)
        .await;

    assert!(matches!(result, Err(DispatchError::InvalidTransition { .. })));
}

#[rstest]
#[tokio::test]
async fn refusal_back_to_new_releases_the_technician(harness: Harness) {
    let created = harness.create().await;
    let assigned = harness
        .service
        .assign(created.id, T1, &dispatcher(), 1)
        .await
        .expect("assign");

    let released = harness
        .service
        .unassign(
            assigned.id,
            &master(11, false),
            Some("  too far  ".to_owned()),
            2,
        )
        .await
        .expect("technician refuses");

    assert_eq!(released.status, OrderStatus::New);
    assert_eq!(released.assigned_technician, None);
    assert_eq!(released.refuse_reason.as_deref(), Some("too far"));
}

#[rstest]
#[tokio::test]
async fn inactive_technicians_cannot_be_assigned(harness: Harness) {
    let mut idle = technician(3, 13);
    idle.is_active = false;
    harness.store.add_technician(idle);
    let created = harness.create().await;

    let result = harness
        .service
        .assign(created.id, TechnicianId::new(3), &dispatcher(), 1)
        .await;

    assert_eq!(
        result,
        Err(DispatchError::TechnicianUnavailable {
            technician_id: TechnicianId::new(3),
            reason: UnavailableReason::Inactive,
        })
    );
}

#[rstest]
#[tokio::test]
async fn technicians_without_master_cannot_be_assigned(harness: Harness) {
    harness
        .store
        .add_user(UserId::new(14), RoleSet::new([Role::Dispatcher]));
    harness.store.add_technician(technician(4, 14));
    let created = harness.create().await;

    let result = harness
        .service
        .assign(created.id, TechnicianId::new(4), &dispatcher(), 1)
        .await;

    assert!(matches!(
        result,
        Err(DispatchError::TechnicianUnavailable {
            reason: UnavailableReason::MissingMasterRole,
            ..
        })
    ));
}

#[rstest]
#[tokio::test]
async fn clamped_company_share_is_audited(harness: Harness) {
    harness.store.set_rates(vec![SpecialtyRate {
        specialty_name: "Washing machine".to_owned(),
        technician_percentage: dec!(90),
        company_percentage: dec!(10),
        is_default: false,
        deleted_at: None,
    }]);
    let holder = master(11, false);
    let onsite = harness.onsite(T1, &holder).await;

    let closed = harness
        .service
        .close(
            onsite.id,
            money(dec!(1000), dec!(0)),
            CloseFlags {
                has_review: true,
                out_of_city: true,
            },
            &holder,
            onsite.version,
        )
        .await
        .expect("close");

    let settlement = closed.settlement.expect("settlement");
    assert_eq!(settlement.technician_share, dec!(1000));
    assert_eq!(settlement.company_share, dec!(0));
    assert!(
        harness
            .store
            .audit_entries()
            .iter()
            .any(|entry| entry.action == AuditAction::FinanceCompanyShareClamped
                && entry.order_id == Some(onsite.id))
    );
}

#[rstest]
#[tokio::test]
async fn negative_net_is_rejected(harness: Harness) {
    let holder = master(11, false);
    let onsite = harness.onsite(T1, &holder).await;

    let result = harness
        .service
        .close(
            onsite.id,
            money(dec!(100), dec!(500)),
            CloseFlags::default(),
            &holder,
            onsite.version,
        )
        .await;

    assert_eq!(result, Err(DispatchError::NegativeNet));
}

#[rstest]
#[tokio::test]
async fn long_repair_records_terms_and_can_then_close(harness: Harness) {
    let holder = master(11, false);
    let onsite = harness.onsite(T1, &holder).await;

    let repair = harness
        .service
        .move_to_long_repair(
            onsite.id,
            LongRepairTerms {
                estimated_completion: " next Friday ".to_owned(),
                prepayment: dec!(1500.00),
            },
            &holder,
            onsite.version,
        )
        .await
        .expect("long repair");

    assert_eq!(repair.status, OrderStatus::Dr);
    assert_eq!(repair.estimated_completion.as_deref(), Some("next Friday"));
    assert_eq!(repair.prepayment, Some(dec!(1500)));

    let history = harness
        .service
        .field_history(repair.id)
        .await
        .expect("field history");
    let names: Vec<&str> = history.iter().map(|entry| entry.field_name.as_str()).collect();
    assert_eq!(names, vec!["estimated_completion", "prepayment"]);

    let closed = harness
        .service
        .close(
            repair.id,
            money(dec!(3000), dec!(500)),
            CloseFlags::default(),
            &holder,
            repair.version,
        )
        .await
        .expect("close from DR");
    assert_eq!(closed.status, OrderStatus::Closed);
}

#[rstest]
#[tokio::test]
async fn field_edits_are_tracked_and_bump_the_version(harness: Harness) {
    let created = harness.create().await;
    let patch = OrderPatch::new()
        .set(EditableField::Notes, Some("call before arrival"))
        .set(EditableField::ClientName, Some("I.P."));

    let updated = harness
        .service
        .update_fields(created.id, patch, &dispatcher(), 1)
        .await
        .expect("update");

    assert_eq!(updated.version, 2);
    assert_eq!(updated.notes.as_deref(), Some("call before arrival"));
    let history = harness
        .service
        .field_history(created.id)
        .await
        .expect("field history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].field_name, "notes");
    assert!(matches!(
        harness.events.events().last(),
        Some(DomainEvent::OrderUpdated { version: 2, .. })
    ));
}

#[rstest]
#[tokio::test]
async fn unrelated_technicians_cannot_edit(harness: Harness) {
    let created = harness.create().await;
    let patch = OrderPatch::new().set(EditableField::Notes, Some("mine now"));

    let result = harness
        .service
        .update_fields(created.id, patch, &master(12, true), 1)
        .await;

    assert!(matches!(result, Err(DispatchError::Forbidden { .. })));
}

#[rstest]
#[tokio::test]
async fn long_repair_fields_outside_dr_are_rejected(harness: Harness) {
    let created = harness.create().await;
    let patch = OrderPatch::new().set(EditableField::Prepayment, Some("100"));

    let result = harness
        .service
        .update_fields(created.id, patch, &dispatcher(), 1)
        .await;

    assert!(matches!(result, Err(DispatchError::Validation { .. })));
}

#[rstest]
#[case::both(true, true)]
#[case::estimate_only(true, false)]
#[case::prepayment_only(false, true)]
#[tokio::test]
async fn dr_orders_keep_their_long_repair_terms(
    harness: Harness,
    #[case] clear_estimate: bool,
    #[case] clear_prepayment: bool,
) {
    let holder = master(11, false);
    let onsite = harness.onsite(T1, &holder).await;
    let repair = harness
        .service
        .move_to_long_repair(
            onsite.id,
            LongRepairTerms {
                estimated_completion: "next week".to_owned(),
                prepayment: dec!(500),
            },
            &holder,
            onsite.version,
        )
        .await
        .expect("long repair");

    let mut patch = OrderPatch::new();
    if clear_estimate {
        patch = patch.set(EditableField::EstimatedCompletion, None::<String>);
    }
    if clear_prepayment {
        patch = patch.set(EditableField::Prepayment, None::<String>);
    }
    let result = harness
        .service
        .update_fields(repair.id, patch, &dispatcher(), repair.version)
        .await;

    assert!(matches!(result, Err(DispatchError::Validation { .. })));
    let stored = harness.service.get(repair.id).await.expect("stored order");
    assert_eq!(stored.version, repair.version);
    assert_eq!(stored.estimated_completion.as_deref(), Some("next week"));
    assert_eq!(stored.prepayment, Some(dec!(500)));
}

#[rstest]
#[tokio::test]
async fn dr_terms_can_still_be_revised(harness: Harness) {
    let holder = master(11, false);
    let onsite = harness.onsite(T1, &holder).await;
    let repair = harness
        .service
        .move_to_long_repair(
            onsite.id,
            LongRepairTerms {
                estimated_completion: "next week".to_owned(),
                prepayment: dec!(500),
            },
            &holder,
            onsite.version,
        )
        .await
        .expect("long repair");

    let patch = OrderPatch::new().set(EditableField::Prepayment, Some("750"));
    let updated = harness
        .service
        .update_fields(repair.id, patch, &dispatcher(), repair.version)
        .await
        .expect("revise prepayment");

    assert_eq!(updated.prepayment, Some(dec!(750)));
    assert_eq!(updated.version, repair.version + 1);
}

#[rstest]
#[tokio::test]
async fn reschedule_interprets_the_phrase(harness: Harness) {
    let created = harness.create().await;

    let moved = harness
        .service
        .reschedule(
            created.id,
            "завтра к 14:00",
            Some("client asked".to_owned()),
            &dispatcher(),
            1,
        )
        .await
        .expect("reschedule");

    assert_eq!(moved.reschedule_count, 1);
    assert_eq!(moved.scheduled_time.as_deref(), Some("завтра к 14:00"));
    assert_eq!(
        moved.scheduled_at,
        Some(crate::test_support::instant("2026-03-03T11:00:00Z"))
    );
    assert_eq!(moved.reschedule_reason.as_deref(), Some("client asked"));
    assert!(
        harness
            .store
            .audit_entries()
            .iter()
            .any(|entry| entry.action == AuditAction::OrderRescheduled)
    );
}

#[rstest]
#[tokio::test]
async fn soft_delete_is_idempotent_and_restorable(harness: Harness) {
    let created = harness.create().await;

    let deleted = harness
        .service
        .soft_delete(created.id, &admin())
        .await
        .expect("delete");
    assert!(deleted.is_deleted());
    assert_eq!(deleted.version, 2);
    assert_eq!(deleted.updated_at, created.updated_at);
    assert!(matches!(
        harness.service.get(created.id).await,
        Err(DispatchError::NotFound { .. })
    ));

    let again = harness
        .service
        .soft_delete(created.id, &admin())
        .await
        .expect("second delete");
    assert_eq!(again.version, 2);
    let deletions = harness
        .store
        .audit_entries()
        .iter()
        .filter(|entry| entry.action == AuditAction::OrderSoftDeleted)
        .count();
    assert_eq!(deletions, 2);

    let restored = harness
        .service
        .restore(created.id, &dispatcher())
        .await
        .expect("restore");
    assert!(!restored.is_deleted());
    assert_eq!(restored.version, 3);
    assert_eq!(
        harness.events.names(),
        vec!["OrderCreated", "OrderSoftDeleted", "OrderRestored"]
    );
}

#[rstest]
#[tokio::test]
async fn technicians_cannot_delete_orders(harness: Harness) {
    let created = harness.create().await;

    let result = harness
        .service
        .soft_delete(created.id, &master(11, false))
        .await;

    assert!(matches!(result, Err(DispatchError::Forbidden { .. })));
}

#[rstest]
#[tokio::test]
async fn repository_version_conflict_surfaces_as_concurrent_modification() {
    let stored = order(7, OrderStatus::New, 1);
    let mut orders = MockOrderRepository::new();
    orders
        .expect_find_order()
        .with(eq(OrderId::new(7)), eq(Visibility::Live))
        .return_once(move |_, _| Ok(Some(stored)));
    orders
        .expect_commit_order_change()
        .times(1)
        .return_once(|_| Err(OrderRepositoryError::version_conflict(OrderId::new(7), 1)));
    let mut identity = MockIdentityRepository::new();
    identity
        .expect_find_technician()
        .return_once(|_| {
            Ok(Some(crate::domain::TechnicianProfile {
                technician: technician(1, 11),
                roles: RoleSet::new([Role::Master]),
            }))
        });
    let mut events = MockEventPublisher::new();
    events.expect_publish().never();
    let service = OrderService::new(
        OrderServicePorts {
            orders: Arc::new(orders),
            identity: Arc::new(identity),
            rates: Arc::new(FixtureSpecialtyRateRepository),
            audit: Arc::new(MockAuditLogRepository::new()),
            events: Arc::new(events),
        },
        fixed_clock("2026-03-02T09:00:00Z"),
    );

    let result = service.assign(OrderId::new(7), T1, &dispatcher(), 1).await;

    assert_eq!(result, Err(DispatchError::concurrent(Entity::Order, 7, 1)));
}

#[rstest]
#[tokio::test]
async fn failed_publish_does_not_undo_the_commit() {
    let mut orders = MockOrderRepository::new();
    orders
        .expect_insert_order()
        .times(1)
        .return_once(|new| Ok(Order::from_draft(OrderId::new(1), new.draft, None, new.created_at)));
    let mut events = MockEventPublisher::new();
    events
        .expect_publish()
        .times(1)
        .return_once(|_| Err(EventPublisherError::closed("bus stopped")));
    let service = OrderService::new(
        OrderServicePorts {
            orders: Arc::new(orders),
            identity: Arc::new(MockIdentityRepository::new()),
            rates: Arc::new(FixtureSpecialtyRateRepository),
            audit: Arc::new(MockAuditLogRepository::new()),
            events: Arc::new(events),
        },
        fixed_clock("2026-03-02T09:00:00Z"),
    );

    let created = service.create(draft(), &Actor::System).await;

    assert!(created.is_ok());
}
