//! Feed message orchestration: parse, deduplicate, show history, confirm.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{
    Candidate, ClientHistorySummary, IngestTelemetry, ParseFailure, TelemetryOutcome,
    parse_message,
};
use crate::domain::order_service::map_order_error;
use crate::domain::ports::{
    IdentityRepository, IngestConfigRepository, IngestNotifier, IngestRepositoryError,
    IngestTelemetryRepository, OrderRepository,
};
use crate::domain::{
    Actor, ChatId, CivilClock, DispatchError, Entity, MessageId, Order, OrderId, OrderService,
    UserId,
};

/// Messages shorter than this are chatter.
const MIN_MESSAGE_CHARS: usize = 15;
/// Earlier orders shown with a confirmation request.
const HISTORY_LIMIT: usize = 5;

static BARE_TIME: OnceLock<Regex> = OnceLock::new();

fn bare_time_regex() -> &'static Regex {
    BARE_TIME.get_or_init(|| {
        Regex::new(r"^\d{1,2}:\d{2}$")
            .unwrap_or_else(|error| panic!("bare time regex should compile: {error}"))
    })
}

fn map_ingest_error(error: IngestRepositoryError) -> DispatchError {
    match error {
        IngestRepositoryError::Connection { message } => {
            DispatchError::unavailable(format!("ingest repository unavailable: {message}"))
        }
        IngestRepositoryError::Query { message } => {
            DispatchError::internal(format!("ingest repository error: {message}"))
        }
    }
}

/// Ports used by [`IngestPipeline`].
pub struct IngestPorts {
    pub orders: Arc<dyn OrderRepository>,
    pub identity: Arc<dyn IdentityRepository>,
    pub config: Arc<dyn IngestConfigRepository>,
    pub telemetry: Arc<dyn IngestTelemetryRepository>,
    pub notifier: Arc<dyn IngestNotifier>,
}

/// Deployment knobs of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Our own principal; its messages are never parsed.
    pub bot_principal_id: UserId,
    /// Channel announcing ingested orders.
    pub dispatcher_chat_id: Option<ChatId>,
    pub confirmation_ttl: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            bot_principal_id: UserId::new(0),
            dispatcher_chat_id: None,
            confirmation_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// One message from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub text: String,
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub chat_id: ChatId,
}

/// Why a message was not parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Disabled,
    ForeignChat,
    OwnMessage,
    TooShort,
}

/// Result of handling one feed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "outcome",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum IngestOutcome {
    Ignored {
        reason: IgnoreReason,
    },
    ParseFailed {
        failure: ParseFailure,
    },
    Duplicate {
        existing: OrderId,
    },
    AwaitingConfirmation {
        confirmation_id: MessageId,
        candidate: Candidate,
    },
}

/// Human answer to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationDecision {
    Yes,
    No,
}

impl FromStr for ConfirmationDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Created { order: Box<Order> },
    Declined,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    candidate: Candidate,
    requested_at: DateTime<Utc>,
}

/// Process-local confirmations awaiting a decision.
///
/// Entries older than the TTL are swept on every access. Nothing is
/// persisted; a restart forgets all pending requests.
#[derive(Debug)]
pub struct PendingConfirmations {
    ttl: Duration,
    entries: Mutex<HashMap<MessageId, PendingEntry>>,
}

impl PendingConfirmations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn locked(&self, now: DateTime<Utc>) -> MutexGuard<'_, HashMap<MessageId, PendingEntry>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        // A negative age means the clock went backwards; keep the entry.
        entries.retain(|_, entry| {
            (now - entry.requested_at)
                .to_std()
                .map_or(true, |age| age < ttl)
        });
        entries
    }

    pub fn insert(&self, id: MessageId, candidate: Candidate, now: DateTime<Utc>) {
        self.locked(now).insert(
            id,
            PendingEntry {
                candidate,
                requested_at: now,
            },
        );
    }

    /// Remove and return a live entry.
    pub fn take(&self, id: MessageId, now: DateTime<Utc>) -> Option<Candidate> {
        self.locked(now).remove(&id).map(|entry| entry.candidate)
    }

    fn restore(&self, id: MessageId, candidate: Candidate, requested_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            id,
            PendingEntry {
                candidate,
                requested_at,
            },
        );
    }

    pub fn len(&self, now: DateTime<Utc>) -> usize {
        self.locked(now).len()
    }

    pub fn is_empty(&self, now: DateTime<Utc>) -> bool {
        self.len(now) == 0
    }
}

/// Turns feed messages into confirmed orders.
pub struct IngestPipeline {
    orders: Arc<dyn OrderRepository>,
    identity: Arc<dyn IdentityRepository>,
    config: Arc<dyn IngestConfigRepository>,
    telemetry: Arc<dyn IngestTelemetryRepository>,
    notifier: Arc<dyn IngestNotifier>,
    service: OrderService,
    settings: IngestSettings,
    pending: PendingConfirmations,
    clock: CivilClock,
}

impl IngestPipeline {
    pub fn new(
        ports: IngestPorts,
        service: OrderService,
        settings: IngestSettings,
        clock: CivilClock,
    ) -> Self {
        Self {
            orders: ports.orders,
            identity: ports.identity,
            config: ports.config,
            telemetry: ports.telemetry,
            notifier: ports.notifier,
            service,
            pending: PendingConfirmations::new(settings.confirmation_ttl),
            settings,
            clock,
        }
    }

    pub fn pending(&self) -> &PendingConfirmations {
        &self.pending
    }

    /// Handle one feed message.
    #[instrument(skip(self, message), fields(message_id = %message.message_id, chat_id = %message.chat_id))]
    pub async fn on_message(
        &self,
        message: IncomingMessage,
    ) -> Result<IngestOutcome, DispatchError> {
        let config = self.config.load().await.map_err(map_ingest_error)?;
        if !config.enabled {
            return Ok(IngestOutcome::Ignored {
                reason: IgnoreReason::Disabled,
            });
        }
        if config
            .source_chat_id
            .is_some_and(|source| source != message.chat_id)
        {
            return Ok(IngestOutcome::Ignored {
                reason: IgnoreReason::ForeignChat,
            });
        }
        if let Some(reason) = self.ignore_reason(&message) {
            debug!(?reason, "message ignored");
            self.record(message.message_id, TelemetryOutcome::Ignored, None, Duration::ZERO)
                .await;
            return Ok(IngestOutcome::Ignored { reason });
        }

        let started = Instant::now();
        let parsed = parse_message(&message.text, message.message_id, self.clock.civil_now());
        let elapsed = started.elapsed();

        let candidate = match parsed {
            Ok(candidate) => {
                self.record(message.message_id, TelemetryOutcome::Success, None, elapsed)
                    .await;
                candidate
            }
            Err(failure) => {
                self.record(
                    message.message_id,
                    TelemetryOutcome::Failure,
                    Some(&failure),
                    elapsed,
                )
                .await;
                if failure.should_report() {
                    if let Err(error) = self
                        .notifier
                        .parse_failed(message.chat_id, message.message_id, &failure)
                        .await
                    {
                        warn!(%error, "failed to report parse failure");
                    }
                }
                return Ok(IngestOutcome::ParseFailed { failure });
            }
        };

        if let Some(existing) = self.find_duplicate(&candidate).await? {
            info!(existing = %existing, "duplicate of an active order");
            if let Err(error) = self
                .notifier
                .duplicate_detected(message.chat_id, message.message_id, existing)
                .await
            {
                warn!(%error, "failed to report duplicate");
            }
            return Ok(IngestOutcome::Duplicate { existing });
        }

        let history = self
            .orders
            .client_history(
                candidate.client_phone.clone(),
                candidate.client_address.clone(),
                HISTORY_LIMIT,
            )
            .await
            .map_err(map_order_error)?;
        if !history.is_empty() {
            let summary = ClientHistorySummary::new(&candidate, &history);
            if let Err(error) = self
                .notifier
                .history_summary(message.chat_id, message.message_id, &summary)
                .await
            {
                warn!(%error, "failed to publish client history");
            }
        }

        let confirmation_id = self
            .notifier
            .request_confirmation(message.chat_id, message.message_id, &candidate)
            .await
            .map_err(|error| DispatchError::unavailable(error.to_string()))?;
        self.pending
            .insert(confirmation_id, candidate.clone(), self.clock.now());
        info!(confirmation_id = %confirmation_id, "confirmation requested");
        Ok(IngestOutcome::AwaitingConfirmation {
            confirmation_id,
            candidate,
        })
    }

    /// Apply a staff decision to a pending confirmation.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn confirm(
        &self,
        confirmation_id: MessageId,
        decision: ConfirmationDecision,
        actor: &Actor,
    ) -> Result<ConfirmationOutcome, DispatchError> {
        if !actor.is_staff() {
            return Err(DispatchError::forbidden(
                "only staff may confirm ingested orders",
            ));
        }
        let now = self.clock.now();
        let candidate = self
            .pending
            .take(confirmation_id, now)
            .ok_or_else(|| DispatchError::not_found(Entity::Confirmation, confirmation_id))?;

        if decision == ConfirmationDecision::No {
            info!("ingested candidate declined");
            return Ok(ConfirmationOutcome::Declined);
        }

        let order = match self.service.create(candidate.to_draft(), &Actor::System).await {
            Ok(order) => order,
            Err(error) => {
                self.pending.restore(confirmation_id, candidate, now);
                return Err(error);
            }
        };
        self.announce(&order).await;
        Ok(ConfirmationOutcome::Created {
            order: Box::new(order),
        })
    }

    fn ignore_reason(&self, message: &IncomingMessage) -> Option<IgnoreReason> {
        if message.sender_id == self.settings.bot_principal_id {
            return Some(IgnoreReason::OwnMessage);
        }
        let text = message.text.trim();
        if text.chars().count() < MIN_MESSAGE_CHARS || bare_time_regex().is_match(text) {
            return Some(IgnoreReason::TooShort);
        }
        None
    }

    async fn find_duplicate(&self, candidate: &Candidate) -> Result<Option<OrderId>, DispatchError> {
        let Some(phone) = candidate.client_phone.as_deref() else {
            return Ok(None);
        };
        self.orders
            .find_active_duplicate(
                phone,
                &candidate.client_address,
                &candidate.equipment_type,
            )
            .await
            .map_err(map_order_error)
    }

    async fn record(
        &self,
        message_id: MessageId,
        outcome: TelemetryOutcome,
        failure: Option<&ParseFailure>,
        elapsed: Duration,
    ) {
        let event = IngestTelemetry {
            message_id,
            outcome,
            failure_kind: failure.map(|failure| failure.kind),
            elapsed_micros: i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX),
            recorded_at: self.clock.now(),
        };
        if let Err(error) = self.telemetry.record(event).await {
            warn!(%error, "failed to record ingest telemetry");
        }
    }

    async fn announce(&self, order: &Order) {
        let mut chats: BTreeSet<ChatId> = self.settings.dispatcher_chat_id.into_iter().collect();
        match self.identity.staff_principals().await {
            Ok(principals) => {
                chats.extend(principals.into_iter().map(|user| ChatId::new(user.get())));
            }
            Err(error) => warn!(%error, "failed to list staff for ingest announcement"),
        }
        for chat in chats {
            if let Err(error) = self.notifier.order_created(chat, order).await {
                warn!(%error, chat_id = %chat, "failed to announce ingested order");
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
