//! # Guildkit
//!
//! Everything that talks to a community guild on behalf of a build plan.
//!
//! ## Core Concepts
//!
//! - **GuildService**: async capability for creating roles, categories and
//!   channels, editing overwrites, posting messages and listing what exists
//! - **RateLimiter**: serializes calls per guild and retries them according
//!   to [`ErrorCategory`]
//! - **ResourceMappingHandler**: a [`buildplan::StepHandler`] that performs
//!   steps idempotently, remembering every created resource by step id
//! - **Snapshot**: reads a guild back into a replayable [`buildplan::BuildPlan`]
//!
//! ## Example
//!
//! ```ignore
//! use guildkit::{RateLimiter, ResourceMappingHandler, SimulatedGuild};
//! use std::sync::Arc;
//!
//! let guild = Arc::new(SimulatedGuild::new(1, "sandbox"));
//! let limiter = Arc::new(RateLimiter::default());
//! let handler = ResourceMappingHandler::open(guild, limiter, state_dir, Some(&plan.name));
//! executor.run_plan(&plan, &handler, true).await?;
//! ```

pub mod backend;
pub mod error;
pub mod handler;
pub mod permissions;
pub mod rate_limit;
pub mod resource_map;
pub mod snapshot;
pub mod types;

pub use backend::{Fault, GuildService, Operation, SimulatedGuild};
pub use error::{Error, ErrorCategory, Result};
pub use handler::ResourceMappingHandler;
pub use permissions::{
    ChannelOverwrite, OverwriteBuilder, Permission, PermissionOverwrite, PermissionSet,
};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use resource_map::{
    FileResourceStore, MemoryResourceStore, ResourceCategory, ResourceMap, ResourceRecord,
    ResourceStore,
};
pub use snapshot::{SnapshotOptions, snapshot_target};
pub use types::{
    ChannelKind, ChannelRequest, MessageInfo, RemoteResource, ResourceId, ResourceKind,
    RoleRequest, TargetId,
};
