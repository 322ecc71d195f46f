//! Default target policy: the assigned technician's work channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ports::{IdentityRepository, MirrorTargetPolicy, MirrorTargetPolicyError};
use crate::domain::{MirrorTarget, Order};

/// Mirrors an order into the private channel of its technician.
#[derive(Clone)]
pub struct WorkChannelPolicy {
    identity: Arc<dyn IdentityRepository>,
}

impl WorkChannelPolicy {
    pub fn new(identity: Arc<dyn IdentityRepository>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl MirrorTargetPolicy for WorkChannelPolicy {
    async fn targets(&self, order: &Order) -> Result<Vec<MirrorTarget>, MirrorTargetPolicyError> {
        let Some(technician_id) = order.assigned_technician else {
            return Ok(Vec::new());
        };
        let profile = self
            .identity
            .find_technician(technician_id)
            .await
            .map_err(|error| MirrorTargetPolicyError::lookup(error.to_string()))?;
        Ok(profile
            .and_then(|profile| profile.technician.work_chat_id)
            .map(|chat_id| MirrorTarget {
                chat_id,
                technician_id,
            })
            .into_iter()
            .collect())
    }
}
