//! Port deciding where an order is mirrored.

use async_trait::async_trait;

use crate::domain::{MirrorTarget, Order};

use super::define_port_error;

define_port_error! {
    /// Errors raised while resolving mirror targets.
    pub enum MirrorTargetPolicyError {
        /// Lookup of target conversations failed.
        Lookup { message: String } =>
            "mirror target lookup failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MirrorTargetPolicy: Send + Sync {
    /// Target `(chat, technician)` pairs for an order visible to technicians.
    async fn targets(&self, order: &Order) -> Result<Vec<MirrorTarget>, MirrorTargetPolicyError>;
}
