//! Backup-as-plan: turn a guild's current structure into a replayable plan

use crate::backend::GuildService;
use crate::error::Result;
use crate::permissions::format_color;
use crate::rate_limit::RateLimiter;
use crate::types::{ChannelKind, RemoteResource, ResourceId, ResourceKind};
use buildplan::{BuildPlan, BuildStep, StepType};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

const ROLE_DELAY: f64 = 0.2;
const CATEGORY_DELAY: f64 = 0.3;
const CHANNEL_DELAY: f64 = 0.2;
const MESSAGE_DELAY: f64 = 0.05;

/// Snapshot options
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Plan name; defaults to `backup-<target id>`
    pub name: Option<String>,
    /// Recent messages captured per text channel
    pub messages_per_channel: usize,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            name: None,
            messages_per_channel: 10,
        }
    }
}

/// Snapshot a guild into a plan.
///
/// Roles come first in ascending position, skipping the default role and
/// integration-managed roles. Then categories, then each channel followed
/// by its captured messages, then a metadata step. Message history that
/// cannot be read is logged and skipped.
pub async fn snapshot_target(
    service: &dyn GuildService,
    limiter: &RateLimiter,
    options: &SnapshotOptions,
) -> Result<BuildPlan> {
    let target = service.target_id();
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| format!("backup-{target}"));
    let mut plan = BuildPlan::new(name);

    let mut roles = limiter
        .run(target, || service.list_existing(ResourceKind::Roles))
        .await?;
    let categories = limiter
        .run(target, || service.list_existing(ResourceKind::Categories))
        .await?;
    let channels = limiter
        .run(target, || service.list_existing(ResourceKind::Channels))
        .await?;

    roles.sort_by_key(|r| r.position);
    let role_names: HashMap<ResourceId, &str> = roles.iter().map(|r| (r.id, r.name.as_str())).collect();
    let category_names: HashMap<ResourceId, &str> =
        categories.iter().map(|c| (c.id, c.name.as_str())).collect();

    for role in roles.iter().filter(|r| !r.is_default && !r.managed) {
        plan.add_step(
            BuildStep::new(format!("role-{}", role.id), StepType::CreateGroupRole, role_payload(role))
                .with_delay(ROLE_DELAY),
        );
    }

    for category in &categories {
        let mut payload = Map::new();
        payload.insert("name".into(), json!(category.name));
        plan.add_step(
            BuildStep::new(format!("cat-{}", category.id), StepType::CreateCategory, payload)
                .with_delay(CATEGORY_DELAY),
        );
    }

    for channel in &channels {
        let payload = channel_payload(channel, &category_names, &role_names);
        plan.add_step(
            BuildStep::new(format!("chan-{}", channel.id), StepType::CreateChannel, payload)
                .with_delay(CHANNEL_DELAY),
        );

        if channel.channel_kind != Some(ChannelKind::Text) || options.messages_per_channel == 0 {
            continue;
        }
        let history = limiter
            .run(target, || service.recent_messages(channel.id, options.messages_per_channel))
            .await;
        let messages = match history {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("Skipping history of channel '{}': {e}", channel.name);
                continue;
            }
        };
        for (index, message) in messages.iter().enumerate() {
            let mut payload = Map::new();
            payload.insert("channel".into(), json!(channel.name));
            payload.insert("content".into(), json!(message.content));
            payload.insert("use_webhook".into(), json!(true));
            payload.insert("author_name".into(), json!(message.author_name));
            plan.add_step(
                BuildStep::new(format!("msg-{}-{index}", channel.id), StepType::PostMessage, payload)
                    .with_delay(MESSAGE_DELAY),
            );
        }
    }

    let mut meta = Map::new();
    meta.insert("target_id".into(), json!(target));
    meta.insert("name".into(), json!(service.target_name()));
    plan.add_step(BuildStep::new(format!("meta-{target}"), StepType::RegisterMetadata, meta));

    log::info!(
        "Snapshot of target {target}: {} roles, {} categories, {} channels ({} steps)",
        plan.steps.iter().filter(|s| s.step_type == StepType::CreateGroupRole).count(),
        categories.len(),
        channels.len(),
        plan.len()
    );
    Ok(plan)
}

fn role_payload(role: &RemoteResource) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("name".into(), json!(role.name));
    if let Some(color) = role.color {
        payload.insert("color".into(), json!(format_color(color)));
    }
    payload.insert("permissions".into(), json!(role.permissions.names()));
    payload
}

fn channel_payload(
    channel: &RemoteResource,
    category_names: &HashMap<ResourceId, &str>,
    role_names: &HashMap<ResourceId, &str>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("name".into(), json!(channel.name));
    if let Some(category) = channel.parent_id.and_then(|id| category_names.get(&id)) {
        payload.insert("category".into(), json!(category));
    }
    let kind = channel.channel_kind.unwrap_or(ChannelKind::Text);
    payload.insert("type".into(), json!(kind.as_str()));
    if let Some(topic) = &channel.topic {
        payload.insert("topic".into(), json!(topic));
    }

    let mut overwrites = Map::new();
    for entry in &channel.overwrites {
        let Some(role) = role_names.get(&entry.role_id) else {
            log::debug!("Dropping overwrite for unknown role {} on '{}'", entry.role_id, channel.name);
            continue;
        };
        overwrites.insert(
            (*role).to_string(),
            json!({
                "allow": entry.overwrite.allow.names(),
                "deny": entry.overwrite.deny.names(),
            }),
        );
    }
    if !overwrites.is_empty() {
        payload.insert("overwrites".into(), Value::Object(overwrites));
    }
    payload
}
