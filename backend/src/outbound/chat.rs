//! Reqwest-backed chat gateway.
//!
//! One adapter serves both the mirror transport and the ingest notifier. It
//! speaks a bot-style JSON API: every call is a `POST {base}/{method}` with a
//! bearer token, and replies carry an `{ok, result, description}` envelope.
//! This module owns transport details only: request bodies, timeouts and
//! status classification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::ports::{
    IngestNotifier, IngestNotifierError, MirrorTransport, MirrorTransportError,
};
use crate::domain::{
    Candidate, ChatId, ClientHistorySummary, MessageId, MirrorCard, Order, OrderId, ParseFailure,
    render_candidate, render_order,
};

/// Failure of a single gateway call before it is mapped onto a port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum CallError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
}

impl From<CallError> for MirrorTransportError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Transient(message) => Self::transient(message),
            CallError::Permanent(message) => Self::permanent(message),
        }
    }
}

impl From<CallError> for IngestNotifierError {
    fn from(error: CallError) -> Self {
        Self::delivery(error.to_string())
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard {
    inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Serialize)]
struct InlineButton {
    text: &'static str,
    callback_data: &'static str,
}

/// Yes/no buttons under a confirmation request.
///
/// Callback data matches the decision accepted by
/// `POST /api/v1/ingest/confirmations/{id}`, where `id` is the message the
/// buttons are attached to.
fn confirmation_keyboard() -> InlineKeyboard {
    InlineKeyboard {
        inline_keyboard: vec![vec![
            InlineButton {
                text: "Да",
                callback_data: "yes",
            },
            InlineButton {
                text: "Нет",
                callback_data: "no",
            },
        ]],
    }
}

#[derive(Debug, Serialize)]
struct EditMessageRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageRef {
    chat_id: i64,
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Chat platform adapter over one API base URL.
pub struct ChatGateway {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ChatGateway {
    /// Build a gateway using a reqwest client with an explicit request timeout.
    ///
    /// Method names are resolved relative to `base_url`, which is treated as a
    /// directory whether or not it ends in `/`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        mut base_url: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url, CallError> {
        self.base_url
            .join(method)
            .map_err(|err| CallError::Permanent(format!("invalid method url: {err}")))
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, CallError>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self.client.post(self.method_url(method)?).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, bytes.as_ref()));
        }
        decode_envelope(bytes.as_ref())
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
    ) -> Result<MessageId, CallError> {
        self.send(SendMessageRequest {
            chat_id: chat_id.get(),
            text,
            reply_to_message_id: reply_to.map(MessageId::get),
            reply_markup: None,
        })
        .await
    }

    async fn send(&self, request: SendMessageRequest<'_>) -> Result<MessageId, CallError> {
        let sent: SentMessage = self.call("sendMessage", &request).await?;
        Ok(MessageId::new(sent.message_id))
    }

    async fn message_call(
        &self,
        method: &str,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), CallError> {
        let _: serde_json::Value = self
            .call(
                method,
                &MessageRef {
                    chat_id: chat_id.get(),
                    message_id: message_id.get(),
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MirrorTransport for ChatGateway {
    async fn publish(
        &self,
        chat_id: ChatId,
        card: &MirrorCard,
    ) -> Result<MessageId, MirrorTransportError> {
        Ok(self.send_text(chat_id, None, &format_card(card)).await?)
    }

    async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        card: &MirrorCard,
    ) -> Result<(), MirrorTransportError> {
        let text = format_card(card);
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &EditMessageRequest {
                    chat_id: chat_id.get(),
                    message_id: message_id.get(),
                    text: &text,
                },
            )
            .await?;
        Ok(())
    }

    async fn pin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        Ok(self
            .message_call("pinChatMessage", chat_id, message_id)
            .await?)
    }

    async fn unpin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        Ok(self
            .message_call("unpinChatMessage", chat_id, message_id)
            .await?)
    }

    async fn remove(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        Ok(self
            .message_call("deleteMessage", chat_id, message_id)
            .await?)
    }
}

#[async_trait]
impl IngestNotifier for ChatGateway {
    async fn parse_failed(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        failure: &ParseFailure,
    ) -> Result<(), IngestNotifierError> {
        self.send_text(chat_id, Some(reply_to), &format_parse_failure(failure))
            .await?;
        Ok(())
    }

    async fn duplicate_detected(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        existing: OrderId,
    ) -> Result<(), IngestNotifierError> {
        let text = format!("Такая заявка уже есть: #{existing}");
        self.send_text(chat_id, Some(reply_to), &text).await?;
        Ok(())
    }

    async fn history_summary(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        summary: &ClientHistorySummary,
    ) -> Result<(), IngestNotifierError> {
        self.send_text(chat_id, Some(reply_to), &format_history(summary))
            .await?;
        Ok(())
    }

    async fn request_confirmation(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        candidate: &Candidate,
    ) -> Result<MessageId, IngestNotifierError> {
        let text = format!("Создать заявку?\n{}", render_candidate(candidate));
        Ok(self
            .send(SendMessageRequest {
                chat_id: chat_id.get(),
                text: &text,
                reply_to_message_id: Some(reply_to.get()),
                reply_markup: Some(confirmation_keyboard()),
            })
            .await?)
    }

    async fn order_created(
        &self,
        chat_id: ChatId,
        order: &Order,
    ) -> Result<(), IngestNotifierError> {
        let text = format!("Заявка #{} создана\n{}", order.id, render_order(order));
        self.send_text(chat_id, None, &text).await?;
        Ok(())
    }
}

/// Stand-in used when no chat API is configured; every call is logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChatGateway;

#[async_trait]
impl MirrorTransport for LoggingChatGateway {
    async fn publish(
        &self,
        chat_id: ChatId,
        card: &MirrorCard,
    ) -> Result<MessageId, MirrorTransportError> {
        info!(%chat_id, order_id = %card.order_id, "chat api disabled; card not published");
        Ok(MessageId::new(0))
    }

    async fn edit(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        card: &MirrorCard,
    ) -> Result<(), MirrorTransportError> {
        info!(%chat_id, %message_id, order_id = %card.order_id, "chat api disabled; card not edited");
        Ok(())
    }

    async fn pin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        info!(%chat_id, %message_id, "chat api disabled; pin skipped");
        Ok(())
    }

    async fn unpin(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        info!(%chat_id, %message_id, "chat api disabled; unpin skipped");
        Ok(())
    }

    async fn remove(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), MirrorTransportError> {
        info!(%chat_id, %message_id, "chat api disabled; remove skipped");
        Ok(())
    }
}

#[async_trait]
impl IngestNotifier for LoggingChatGateway {
    async fn parse_failed(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        failure: &ParseFailure,
    ) -> Result<(), IngestNotifierError> {
        info!(%chat_id, %reply_to, %failure, "chat api disabled; parse failure not sent");
        Ok(())
    }

    async fn duplicate_detected(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        existing: OrderId,
    ) -> Result<(), IngestNotifierError> {
        info!(%chat_id, %reply_to, %existing, "chat api disabled; duplicate notice not sent");
        Ok(())
    }

    async fn history_summary(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        summary: &ClientHistorySummary,
    ) -> Result<(), IngestNotifierError> {
        info!(
            %chat_id,
            %reply_to,
            orders = summary.orders.len(),
            "chat api disabled; history summary not sent"
        );
        Ok(())
    }

    async fn request_confirmation(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        _candidate: &Candidate,
    ) -> Result<MessageId, IngestNotifierError> {
        info!(%chat_id, %reply_to, "chat api disabled; confirmation bound to source message");
        Ok(reply_to)
    }

    async fn order_created(
        &self,
        chat_id: ChatId,
        order: &Order,
    ) -> Result<(), IngestNotifierError> {
        info!(%chat_id, order_id = %order.id, "chat api disabled; creation notice not sent");
        Ok(())
    }
}

fn format_card(card: &MirrorCard) -> String {
    let mut lines = vec![
        format!("Заявка #{} [{}]", card.order_id, card.status),
        format!("{} {}", card.equipment_type, card.problem_description),
        card.client_address.clone(),
    ];
    lines.extend(card.scheduled_time.clone());
    lines.extend(card.client_name.clone());
    lines.extend(card.client_phone.clone());
    lines.extend(card.notes.as_ref().map(|notes| format!("Примечание: {notes}")));
    lines.join("\n")
}

fn format_parse_failure(failure: &ParseFailure) -> String {
    if failure.missing_fields.is_empty() {
        "Не удалось разобрать заявку".to_owned()
    } else {
        format!(
            "Не удалось разобрать заявку: {}",
            failure.missing_fields.join(", ")
        )
    }
}

fn format_history(summary: &ClientHistorySummary) -> String {
    let mut lines = vec![format!("Клиент уже обращался ({}):", summary.orders.len())];
    lines.extend(summary.orders.iter().map(|line| {
        format!(
            "#{} {} {} {} ({})",
            line.order_id,
            line.status,
            line.equipment_type,
            line.client_address,
            line.created_at.format("%d.%m.%Y"),
        )
    }));
    lines.join("\n")
}

fn decode_envelope<T>(body: &[u8]) -> Result<T, CallError>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|err| CallError::Permanent(format!("invalid chat api payload: {err}")))?;
    match (envelope.ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(CallError::Permanent(
            "chat api reply has no result".to_owned(),
        )),
        (false, _) => Err(CallError::Permanent(
            envelope
                .description
                .unwrap_or_else(|| "chat api reported failure".to_owned()),
        )),
    }
}

fn map_transport_error(error: reqwest::Error) -> CallError {
    if error.is_timeout() {
        CallError::Transient(format!("timed out: {error}"))
    } else if error.is_builder() {
        CallError::Permanent(error.to_string())
    } else {
        CallError::Transient(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> CallError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            CallError::Transient(message)
        }
        _ if status.is_client_error() => CallError::Permanent(message),
        _ => CallError::Transient(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
