//! Caller identification.
//!
//! The calling principal arrives in the `X-Actor-Id` header; handlers turn it
//! into a core [`Actor`] through the identity service so role checks always
//! see the stored roles rather than anything the client claims.

use std::future::{Ready, ready};

use actix_web::{FromRequest, HttpRequest, dev::Payload};

use crate::domain::{Actor, DispatchError, UserId};
use crate::inbound::http::state::HttpState;

/// Header carrying the calling principal.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Principal named by the request, not yet resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorId(pub UserId);

impl ActorId {
    /// Resolve the principal to an actor with its stored roles.
    pub async fn resolve(self, state: &HttpState) -> Result<Actor, DispatchError> {
        state.identity.resolve(self.0).await
    }
}

fn parse_header(req: &HttpRequest) -> Result<ActorId, DispatchError> {
    let raw = req
        .headers()
        .get(ACTOR_HEADER)
        .ok_or_else(|| DispatchError::validation(format!("{ACTOR_HEADER} header is required")))?;
    raw.to_str()
        .ok()
        .and_then(|value| value.trim().parse::<UserId>().ok())
        .map(ActorId)
        .ok_or_else(|| DispatchError::validation(format!("{ACTOR_HEADER} must be an integer")))
}

impl FromRequest for ActorId {
    type Error = DispatchError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(parse_header(req))
    }
}
