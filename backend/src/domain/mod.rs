//! Order lifecycle core.
//!
//! Purpose: own the dispatch rules (who may move an order where, how money
//! is split, what a feed message means) independently of any transport or
//! storage. Adapters reach the core only through the traits in [`ports`].
//!
//! Public surface:
//! - [`OrderService`] : sole writer of orders and their history.
//! - [`IdentityService`] : actor resolution, role changes, deactivation.
//! - [`MirrorCoordinator`] : keeps external order cards in step.
//! - [`IngestPipeline`] : feed message to confirmed order.
//! - [`ReportService`] and [`ArchiveService`] : period reports and
//!   technician snapshots.
//! - [`state_machine::validate`] and [`finance::split`] : the pure rules.

mod actor;
mod archive;
mod clock;
mod error;
mod events;
pub mod finance;
mod history;
mod identity;
mod ids;
mod ingest;
mod mirror;
mod order;
mod order_service;
mod phone;
pub mod ports;
mod reports;
mod roles;
pub mod state_machine;
mod user;

pub use self::actor::Actor;
pub use self::archive::{ArchiveRecord, ArchiveService};
pub use self::clock::{CivilClock, DEFAULT_UTC_OFFSET_MINUTES, InvalidOffset};
pub use self::error::{DispatchError, Entity, ErrorCode};
pub use self::events::DomainEvent;
pub use self::history::{AuditAction, AuditLogEntry, FieldHistoryEntry, StatusHistoryEntry};
pub use self::identity::IdentityService;
pub use self::ids::{ChatId, MessageId, OrderId, ReportId, TechnicianId, UserId};
pub use self::ingest::{
    Candidate, ClientHistorySummary, ClientOrderLine, ConfirmationDecision, ConfirmationOutcome,
    IgnoreReason, IncomingMessage, IngestConfig, IngestOutcome, IngestPipeline, IngestPorts,
    IngestSettings, IngestTelemetry, ParseFailure, ParseFailureKind, PendingConfirmations,
    PhraseMatch, ScheduledTime, TelemetryOutcome, canonical_equipment, find_phrase,
    interpret_phrase, is_address_like, parse_message, render_candidate, render_order,
};
pub use self::mirror::{
    AttemptJitter, BackoffJitter, MirrorBinding, MirrorCard, MirrorCoordinator, MirrorPorts,
    MirrorRetryConfig, MirrorTarget, NewMirrorBinding, RetryExhausted, RetryRunner, RetrySleeper,
    TokioSleeper, WorkChannelPolicy,
};
pub use self::order::{
    CloseFlags, DEFAULT_CLIENT_NAME, DraftError, EditableField, FieldChange, InvariantViolation,
    LongRepairTerms, Money, Order, OrderDraft, OrderPatch, OrderStatus, PatchError, Settlement,
    StatusParseError, ValidDraft, share_tolerance,
};
pub use self::order_service::{OrderService, OrderServicePorts};
pub use self::phone::normalize_phone;
pub use self::reports::{
    NewPeriodReport, PeriodReport, PeriodTotals, ReportKind, ReportScheduler, ReportService,
    PeriodAggregator, TechnicianPeriodReport, aggregate, due_reports,
};
pub use self::roles::{Role, RoleParseError, RoleSet};
pub use self::user::{Technician, TechnicianProfile, UnavailableReason, User};
