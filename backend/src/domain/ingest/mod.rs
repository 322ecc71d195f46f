//! Upstream feed ingest.
//!
//! [`parse_message`] turns a free-form message into a [`Candidate`];
//! [`IngestPipeline`] checks it against existing orders, asks a human to
//! confirm and creates the order through the order service.

mod datetime_phrase;
mod dictionary;
mod parser;
mod pipeline;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use datetime_phrase::{PhraseMatch, ScheduledTime, find_phrase, interpret_phrase};
pub use dictionary::canonical_equipment;
pub use parser::{is_address_like, parse_message, render_candidate, render_order};
pub use pipeline::{
    ConfirmationDecision, ConfirmationOutcome, IgnoreReason, IncomingMessage, IngestOutcome,
    IngestPipeline, IngestPorts, IngestSettings, PendingConfirmations,
};

use super::{ChatId, MessageId, Order, OrderDraft, OrderId, OrderStatus};

/// Order extracted from a feed message, awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub equipment_type: String,
    pub problem_description: String,
    pub client_name: String,
    pub client_address: String,
    pub client_phone: Option<String>,
    pub scheduled: Option<ScheduledTime>,
    pub original_text: String,
    pub message_id: MessageId,
}

impl Candidate {
    /// Draft handed to the order service on confirmation.
    pub fn to_draft(&self) -> OrderDraft {
        OrderDraft {
            equipment_type: self.equipment_type.clone(),
            problem_description: self.problem_description.clone(),
            client_name: Some(self.client_name.clone()),
            client_address: self.client_address.clone(),
            client_phone: self.client_phone.clone(),
            notes: None,
            scheduled_time: self
                .scheduled
                .as_ref()
                .map(|scheduled| scheduled.display.clone()),
            scheduled_at: self.scheduled.as_ref().and_then(|scheduled| scheduled.at),
            source_message_id: Some(self.message_id),
        }
    }
}

/// Category of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureKind {
    InvalidFormat,
    MissingFields,
}

impl ParseFailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::MissingFields => "missing_fields",
        }
    }
}

impl fmt::Display for ParseFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseFailureKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "invalid_format" => Ok(Self::InvalidFormat),
            "missing_fields" => Ok(Self::MissingFields),
            other => Err(format!("unknown parse failure kind: {other}")),
        }
    }
}

/// Message that is not (or not yet) an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {}", missing_fields.join(", "))]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub missing_fields: Vec<String>,
}

impl ParseFailure {
    pub const PHONE: &'static str = "phone";
    pub const ADDRESS: &'static str = "address";
    pub const PROBLEM_DESCRIPTION: &'static str = "problem_description";

    /// Phone-like digits without a valid number.
    pub fn invalid_phone() -> Self {
        Self {
            kind: ParseFailureKind::InvalidFormat,
            missing_fields: vec![Self::PHONE.to_owned()],
        }
    }

    pub fn missing_fields(fields: Vec<&str>) -> Self {
        Self {
            kind: ParseFailureKind::MissingFields,
            missing_fields: fields.into_iter().map(str::to_owned).collect(),
        }
    }

    /// Only invalid phones and missing problem descriptions are worth telling
    /// the source group about; other failures are usually chatter.
    pub fn should_report(&self) -> bool {
        self.kind == ParseFailureKind::InvalidFormat
            || self
                .missing_fields
                .iter()
                .any(|field| field == Self::PROBLEM_DESCRIPTION)
    }
}

/// Singleton ingest configuration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    pub enabled: bool,
    /// Feed conversation; any conversation when unset.
    pub source_chat_id: Option<ChatId>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_chat_id: None,
        }
    }
}

/// Outcome recorded for one feed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryOutcome {
    Success,
    Failure,
    Ignored,
}

impl TelemetryOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Ignored => "ignored",
        }
    }
}

impl FromStr for TelemetryOutcome {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "ignored" => Ok(Self::Ignored),
            other => Err(format!("unknown telemetry outcome: {other}")),
        }
    }
}

/// Telemetry row for one feed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestTelemetry {
    pub message_id: MessageId,
    pub outcome: TelemetryOutcome,
    pub failure_kind: Option<ParseFailureKind>,
    pub elapsed_micros: i64,
    pub recorded_at: DateTime<Utc>,
}

/// One earlier order of the same client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOrderLine {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub equipment_type: String,
    pub client_address: String,
    pub created_at: DateTime<Utc>,
}

/// Earlier orders matching a candidate's phone or address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHistorySummary {
    pub phone: Option<String>,
    pub address: String,
    pub orders: Vec<ClientOrderLine>,
}

impl ClientHistorySummary {
    pub fn new(candidate: &Candidate, orders: &[Order]) -> Self {
        Self {
            phone: candidate.client_phone.clone(),
            address: candidate.client_address.clone(),
            orders: orders
                .iter()
                .map(|order| ClientOrderLine {
                    order_id: order.id,
                    status: order.status,
                    equipment_type: order.equipment_type.clone(),
                    client_address: order.client_address.clone(),
                    created_at: order.created_at,
                })
                .collect(),
        }
    }
}
