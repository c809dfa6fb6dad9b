//! Resource-mapping step handler
//!
//! Performs build steps against one guild. Two layers keep steps
//! idempotent:
//!
//! - an in-process index from step id (and resource name) to the created
//!   resource, valid for this handler's lifetime
//! - a durable [`ResourceStore`] keyed by step id, consulted before any
//!   creation call and written after every successful one
//!
//! References between steps (a channel's category, an overwrite's role,
//! a post's channel) resolve by step id first, then by name against the
//! live guild. Failed lookups are logged and treated as "not found".
//! Service errors propagate unchanged; the executor owns retries.

use crate::backend::GuildService;
use crate::permissions::{ChannelOverwrite, PermissionSet, parse_color, parse_overwrites};
use crate::rate_limit::RateLimiter;
use crate::resource_map::{FileResourceStore, ResourceCategory, ResourceRecord, ResourceStore};
use crate::types::{ChannelKind, ChannelRequest, RemoteResource, ResourceId, ResourceKind, RoleRequest, TargetId};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use buildplan::validator::is_default_role;
use buildplan::{BuildStep, StepHandler, StepType};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn kind_of(category: ResourceCategory) -> ResourceKind {
    match category {
        ResourceCategory::Roles => ResourceKind::Roles,
        ResourceCategory::Categories => ResourceKind::Categories,
        ResourceCategory::Channels => ResourceKind::Channels,
    }
}

#[derive(Debug, Default)]
struct LiveIndex {
    by_step: HashMap<(ResourceCategory, String), RemoteResource>,
    by_name: HashMap<(ResourceCategory, String), RemoteResource>,
}

/// Step handler bound to one (guild, namespace) pair
pub struct ResourceMappingHandler {
    service: Arc<dyn GuildService>,
    limiter: Arc<RateLimiter>,
    store: Mutex<Box<dyn ResourceStore>>,
    live: Mutex<LiveIndex>,
}

impl ResourceMappingHandler {
    pub fn new(
        service: Arc<dyn GuildService>,
        limiter: Arc<RateLimiter>,
        store: impl ResourceStore + 'static,
    ) -> Self {
        Self {
            service,
            limiter,
            store: Mutex::new(Box::new(store)),
            live: Mutex::new(LiveIndex::default()),
        }
    }

    /// Handler backed by the resource map file for this guild and namespace
    pub fn open(
        service: Arc<dyn GuildService>,
        limiter: Arc<RateLimiter>,
        state_dir: &Path,
        namespace: Option<&str>,
    ) -> Self {
        let store = FileResourceStore::open(state_dir, service.target_id(), namespace);
        Self::new(service, limiter, store)
    }

    fn target(&self) -> TargetId {
        self.service.target_id()
    }

    // ========================================================================
    // Index helpers
    // ========================================================================

    fn stored(&self, category: ResourceCategory, step_id: &str) -> Option<ResourceRecord> {
        lock(&self.store).get(category, step_id)
    }

    fn persist(&self, category: ResourceCategory, step_id: &str, record: ResourceRecord) -> Result<()> {
        lock(&self.store)
            .put(category, step_id, record)
            .with_context(|| format!("Failed to record resource for step {step_id}"))
    }

    fn live_by_step(&self, category: ResourceCategory, step_id: &str) -> Option<RemoteResource> {
        lock(&self.live)
            .by_step
            .get(&(category, step_id.to_string()))
            .cloned()
    }

    fn live_lookup(&self, category: ResourceCategory, key: &str) -> Option<RemoteResource> {
        let live = lock(&self.live);
        let key = (category, key.to_string());
        live.by_step
            .get(&key)
            .or_else(|| live.by_name.get(&key))
            .cloned()
    }

    fn remember(&self, category: ResourceCategory, step_id: Option<&str>, resource: &RemoteResource) {
        let mut live = lock(&self.live);
        if let Some(step_id) = step_id {
            live.by_step
                .insert((category, step_id.to_string()), resource.clone());
        }
        live.by_name
            .insert((category, resource.name.clone()), resource.clone());
    }

    /// Look a resource up by name in the live guild
    async fn find_existing(&self, category: ResourceCategory, key: &str) -> Option<RemoteResource> {
        let kind = kind_of(category);
        let listed = self
            .limiter
            .run(self.target(), || self.service.list_existing(kind))
            .await;
        let items = match listed {
            Ok(items) => items,
            Err(e) => {
                log::warn!("Could not list {kind} while resolving '{key}': {e}");
                return None;
            }
        };
        let wants_default = category == ResourceCategory::Roles && is_default_role(key);
        let found = items
            .into_iter()
            .find(|r| r.name == key || (wants_default && r.is_default));
        match &found {
            Some(resource) => self.remember(category, None, resource),
            None => log::debug!("No existing {kind} named '{key}'"),
        }
        found
    }

    /// Resolve a reference: in-process index, then durable map by step id,
    /// then live guild by name.
    async fn resolve(&self, category: ResourceCategory, key: &str) -> Option<ResourceId> {
        if let Some(resource) = self.live_lookup(category, key) {
            return Some(resource.id);
        }
        if let Some(record) = self.stored(category, key) {
            return Some(record.id);
        }
        self.find_existing(category, key).await.map(|r| r.id)
    }

    /// Parse an overwrite policy and bind each entry to a role id.
    /// Entries whose role cannot be found are skipped with a warning.
    async fn resolve_overwrites(&self, policy: &Value) -> Result<Vec<ChannelOverwrite>> {
        let parsed = parse_overwrites(policy).context("Invalid permission overwrites")?;
        let mut resolved = Vec::with_capacity(parsed.len());
        for (role_key, overwrite) in parsed {
            match self.resolve(ResourceCategory::Roles, &role_key).await {
                Some(role_id) => resolved.push(ChannelOverwrite { role_id, overwrite }),
                None => log::warn!("Skipping overwrite for unknown role '{role_key}'"),
            }
        }
        Ok(resolved)
    }

    async fn apply_overwrites(&self, channel: ResourceId, overwrites: &[ChannelOverwrite]) -> Result<()> {
        self.limiter
            .run(self.target(), || self.service.edit_channel_overwrites(channel, overwrites))
            .await
            .with_context(|| format!("Failed to apply overwrites to channel {channel}"))
    }

    // ========================================================================
    // Step types
    // ========================================================================

    async fn create_role(&self, step: &BuildStep) -> Result<Value> {
        if let Some(record) = self.stored(ResourceCategory::Roles, &step.id) {
            log::debug!("Role step {} already mapped to {}", step.id, record.id);
            return Ok(json!({"role_id": record.id, "name": record.name, "reused": true}));
        }

        let role = match self.live_by_step(ResourceCategory::Roles, &step.id) {
            Some(role) => role,
            None => {
                let request = RoleRequest {
                    name: required(step, "name")?.to_string(),
                    color: role_color(step),
                    permissions: role_permissions(step)?,
                };
                let role = self
                    .limiter
                    .run(self.target(), || self.service.create_role(&request))
                    .await?;
                log::info!("Created role '{}' ({})", role.name, role.id);
                self.remember(ResourceCategory::Roles, Some(&step.id), &role);
                role
            }
        };

        self.persist(ResourceCategory::Roles, &step.id, ResourceRecord::role(&role))?;
        Ok(json!({"role_id": role.id, "name": role.name}))
    }

    async fn create_category(&self, step: &BuildStep) -> Result<Value> {
        if let Some(record) = self.stored(ResourceCategory::Categories, &step.id) {
            log::debug!("Category step {} already mapped to {}", step.id, record.id);
            return Ok(json!({"category_id": record.id, "name": record.name, "reused": true}));
        }

        let category = match self.live_by_step(ResourceCategory::Categories, &step.id) {
            Some(category) => category,
            None => {
                let name = required(step, "name")?;
                let category = self
                    .limiter
                    .run(self.target(), || self.service.create_category(name))
                    .await?;
                log::info!("Created category '{}' ({})", category.name, category.id);
                self.remember(ResourceCategory::Categories, Some(&step.id), &category);
                category
            }
        };

        self.persist(
            ResourceCategory::Categories,
            &step.id,
            ResourceRecord::channel(&category, None),
        )?;
        Ok(json!({"category_id": category.id, "name": category.name}))
    }

    async fn create_channel(&self, step: &BuildStep) -> Result<Value> {
        if let Some(record) = self.stored(ResourceCategory::Channels, &step.id) {
            log::debug!("Channel step {} already mapped to {}", step.id, record.id);
            return Ok(json!({"channel_id": record.id, "name": record.name, "reused": true}));
        }

        let channel = match self.live_by_step(ResourceCategory::Channels, &step.id) {
            Some(channel) => channel,
            None => {
                let parent_id = match step.payload_str("category") {
                    Some(key) => {
                        let parent = self.resolve(ResourceCategory::Categories, key).await;
                        if parent.is_none() {
                            log::warn!("Category '{key}' not found; creating {} without one", step.id);
                        }
                        parent
                    }
                    None => None,
                };
                let request = ChannelRequest {
                    name: required(step, "name")?.to_string(),
                    kind: ChannelKind::from_payload(step.payload_str("type")),
                    parent_id,
                    topic: step.payload_str("topic").map(str::to_string),
                };
                let channel = self
                    .limiter
                    .run(self.target(), || self.service.create_channel(&request))
                    .await?;
                log::info!("Created {} channel '{}' ({})", request.kind, channel.name, channel.id);
                self.remember(ResourceCategory::Channels, Some(&step.id), &channel);
                channel
            }
        };
        // Recorded before overwrites so a failure below never leads to a
        // second channel on a later run.
        self.persist(
            ResourceCategory::Channels,
            &step.id,
            ResourceRecord::channel(&channel, None),
        )?;

        let mut result = json!({"channel_id": channel.id, "name": channel.name});
        let Some(policy) = step.payload.get("overwrites").filter(|v| !v.is_null()) else {
            return Ok(result);
        };
        let applied = match self.resolve_overwrites(policy).await {
            Ok(resolved) if resolved.is_empty() => Ok(()),
            Ok(resolved) => self.apply_overwrites(channel.id, &resolved).await,
            Err(e) => Err(e),
        };
        match applied {
            Ok(()) => self.persist(
                ResourceCategory::Channels,
                &step.id,
                ResourceRecord::channel(&channel, Some(policy.clone())),
            )?,
            Err(e) => {
                log::warn!("Channel {} created without its overwrites: {e:#}", channel.id);
                result["overwrites_error"] = json!(format!("{e:#}"));
            }
        }
        Ok(result)
    }

    async fn apply_permissions(&self, step: &BuildStep) -> Result<Value> {
        let Some(policy) = step.payload.get("overwrites") else {
            log::warn!("Permission step {} has no overwrites", step.id);
            return Ok(json!({"applied_count": 0}));
        };
        let resolved = self.resolve_overwrites(policy).await?;
        if resolved.is_empty() {
            log::warn!("Permission step {} resolved no roles; nothing to apply", step.id);
            return Ok(json!({"applied_count": 0}));
        }

        if let Some(key) = step.payload_str("channel") {
            if let Some(channel) = self.resolve(ResourceCategory::Channels, key).await {
                self.apply_overwrites(channel, &resolved).await?;
                return Ok(json!({"applied_to": channel}));
            }
            log::warn!("Channel '{key}' not found; applying overwrites to every channel");
        }

        let mut targets = Vec::new();
        for kind in [ResourceKind::Categories, ResourceKind::Channels] {
            let listed = self
                .limiter
                .run(self.target(), || self.service.list_existing(kind))
                .await?;
            targets.extend(listed.into_iter().map(|r| r.id));
        }
        let mut applied = 0usize;
        for channel in targets {
            match self.apply_overwrites(channel, &resolved).await {
                Ok(()) => applied += 1,
                Err(e) => log::warn!("{e:#}"),
            }
        }
        Ok(json!({"applied_count": applied}))
    }

    async fn post_message(&self, step: &BuildStep) -> Result<Value> {
        let content = step.payload_str("content").unwrap_or_default();
        if content.is_empty() {
            log::warn!("Post step {} has no content", step.id);
            return Ok(json!({"ok": false, "reason": "empty content"}));
        }

        let channel = match step.payload_str("channel") {
            Some(key) => match self.resolve(ResourceCategory::Channels, key).await {
                Some(id) => Some(id),
                None => key.trim().parse::<ResourceId>().ok(),
            },
            None => None,
        };
        let Some(channel) = channel else {
            log::warn!("Post step {}: channel not found", step.id);
            return Ok(json!({"ok": false, "reason": "channel not found"}));
        };

        if step.payload_flag("use_webhook") {
            let author = step.payload_str("author_name").unwrap_or_default();
            let delivered = self
                .limiter
                .run(self.target(), || self.service.send_as(channel, author, content))
                .await;
            match delivered {
                Ok(Some(message_id)) => {
                    return Ok(json!({
                        "ok": true,
                        "channel_id": channel,
                        "message_id": message_id,
                        "via": "webhook"
                    }));
                }
                Ok(None) => log::debug!("No attributed delivery on channel {channel}; sending directly"),
                Err(e) => log::warn!("Attributed delivery failed on channel {channel} ({e}); sending directly"),
            }
        }

        let message_id = self
            .limiter
            .run(self.target(), || self.service.send_message(channel, content))
            .await?;
        Ok(json!({"ok": true, "channel_id": channel, "message_id": message_id}))
    }
}

#[async_trait]
impl StepHandler for ResourceMappingHandler {
    async fn handle(&self, step: &BuildStep) -> Result<Value> {
        match &step.step_type {
            StepType::CreateGroupRole => self.create_role(step).await,
            StepType::CreateCategory => self.create_category(step).await,
            StepType::CreateChannel => self.create_channel(step).await,
            StepType::ApplyPermissionOverwrites => self.apply_permissions(step).await,
            StepType::PostMessage => self.post_message(step).await,
            StepType::RegisterMetadata => Ok(Value::Object(step.payload.clone())),
            StepType::Unknown(raw) => bail!("Unsupported step type '{raw}'"),
        }
    }
}

fn required<'a>(step: &'a BuildStep, key: &str) -> Result<&'a str> {
    step.payload_str(key)
        .filter(|v| !v.is_empty())
        .with_context(|| format!("Step {} is missing '{key}'", step.id))
}

fn role_color(step: &BuildStep) -> Option<u32> {
    match step.payload.get("color")? {
        Value::String(raw) => {
            let color = parse_color(raw);
            if color.is_none() {
                log::warn!("Ignoring invalid color '{raw}' on step {}", step.id);
            }
            color
        }
        Value::Number(n) => n.as_u64().and_then(|c| u32::try_from(c).ok()),
        _ => None,
    }
}

/// Explicit permission list, else the profile's flags
fn role_permissions(step: &BuildStep) -> Result<PermissionSet> {
    if let Some(list) = step.payload.get("permissions").and_then(Value::as_array) {
        let names = list.iter().filter_map(Value::as_str);
        return PermissionSet::from_names(names)
            .with_context(|| format!("Invalid permissions on step {}", step.id));
    }
    Ok(step
        .payload_str("profile")
        .map(PermissionSet::for_profile)
        .unwrap_or_default())
}
