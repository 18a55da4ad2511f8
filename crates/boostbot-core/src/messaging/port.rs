use async_trait::async_trait;

use crate::{domain::MessageRef, errors::ReactionError};

/// Port for the host platform's "add reaction" primitive.
///
/// Reapplying the same single-emoji reaction must be harmless: the boost service
/// may repeat calls after a restart.
#[async_trait]
pub trait ReactionPort: Send + Sync {
    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<(), ReactionError>;
}
