//! Service abstraction for guild operations.
//!
//! The [`GuildService`] trait is the capability the step handler, the
//! rate limiter and the snapshotter talk to, allowing for different
//! implementations (a network client, the local [`SimulatedGuild`]).

pub mod simulated;

pub use simulated::{Fault, Operation, SimulatedGuild};

use crate::error::Result;
use crate::permissions::ChannelOverwrite;
use crate::types::{
    ChannelRequest, MessageInfo, RemoteResource, ResourceId, ResourceKind, RoleRequest, TargetId,
};
use async_trait::async_trait;

/// Guild service trait.
///
/// Every call may fail with a rate-limit signal carrying a retry-after
/// duration, or with a transient or permanent error; see
/// [`crate::ErrorCategory`].
#[async_trait]
pub trait GuildService: Send + Sync {
    /// Identifier of the guild this service operates on.
    fn target_id(&self) -> TargetId;

    /// Display name of the guild.
    fn target_name(&self) -> String {
        format!("guild-{}", self.target_id())
    }

    /// Create a role.
    async fn create_role(&self, request: &RoleRequest) -> Result<RemoteResource>;

    /// Create a category.
    async fn create_category(&self, name: &str) -> Result<RemoteResource>;

    /// Create a channel, optionally under a category.
    async fn create_channel(&self, request: &ChannelRequest) -> Result<RemoteResource>;

    /// Set role overwrites on a channel. Roles not mentioned keep their
    /// existing overwrites.
    async fn edit_channel_overwrites(
        &self,
        channel: ResourceId,
        overwrites: &[ChannelOverwrite],
    ) -> Result<()>;

    /// Post a message; returns the message id.
    async fn send_message(&self, channel: ResourceId, content: &str) -> Result<ResourceId>;

    /// Post a message attributed to `author_name` through the channel's
    /// alternate delivery mechanism. `Ok(None)` means the mechanism is not
    /// available here and the caller should fall back to [`Self::send_message`].
    async fn send_as(
        &self,
        _channel: ResourceId,
        _author_name: &str,
        _content: &str,
    ) -> Result<Option<ResourceId>> {
        Ok(None)
    }

    /// List existing resources of one kind.
    async fn list_existing(&self, kind: ResourceKind) -> Result<Vec<RemoteResource>>;

    /// Most recent messages of a channel, oldest first.
    async fn recent_messages(&self, _channel: ResourceId, _limit: usize) -> Result<Vec<MessageInfo>> {
        Ok(Vec::new())
    }
}
