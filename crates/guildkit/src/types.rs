//! Core types for guild resources and requests

use crate::permissions::{ChannelOverwrite, PermissionSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External identifier of a resource
pub type ResourceId = u64;

/// External identifier of a target guild
pub type TargetId = u64;

/// Kind of channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Voice,
    Announcement,
    Stage,
    Category,
}

impl ChannelKind {
    /// Parse the `type` field of a channel payload. Unknown kinds become text.
    pub fn from_payload(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("voice") => Self::Voice,
            Some("announcement" | "news") => Self::Announcement,
            Some("stage") => Self::Stage,
            _ => Self::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Announcement => "announcement",
            Self::Stage => "stage",
            Self::Category => "category",
        }
    }

    /// Whether messages can be posted here
    pub fn is_messageable(&self) -> bool {
        matches!(self, Self::Text | Self::Announcement)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource families that can be listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Roles,
    Categories,
    Channels,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roles => "roles",
            Self::Categories => "categories",
            Self::Channels => "channels",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role, category or channel as the service reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub id: ResourceId,
    pub name: String,
    /// Role color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// Role permissions
    #[serde(default)]
    pub permissions: PermissionSet,
    #[serde(default)]
    pub position: i64,
    /// Role managed by an integration; never recreated from a snapshot
    #[serde(default)]
    pub managed: bool,
    /// The guild's default role
    #[serde(default)]
    pub is_default: bool,
    /// Channel kind; `None` for roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_kind: Option<ChannelKind>,
    /// Parent category of a channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overwrites: Vec<ChannelOverwrite>,
}

/// Parameters for creating a role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRequest {
    pub name: String,
    pub color: Option<u32>,
    pub permissions: PermissionSet,
}

/// Parameters for creating a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ResourceId>,
    pub topic: Option<String>,
}

/// A message as returned by history queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: ResourceId,
    pub channel_id: ResourceId,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
