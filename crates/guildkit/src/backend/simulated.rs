//! In-process guild used as a sandbox target and as a test double.
//!
//! State optionally persists to a JSON file after every mutation, so a
//! sandbox survives across CLI invocations. Faults can be queued to make
//! the next matching call fail, and every call is counted.

use super::GuildService;
use crate::error::{Error, Result};
use crate::permissions::{ChannelOverwrite, Permission};
use crate::types::{
    ChannelKind, ChannelRequest, MessageInfo, RemoteResource, ResourceId, ResourceKind,
    RoleRequest, TargetId,
};
use async_trait::async_trait;
use buildplan::state::write_atomic;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Service calls, for counting and fault targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateRole,
    CreateCategory,
    CreateChannel,
    EditOverwrites,
    SendMessage,
    SendAs,
    ListExisting,
    RecentMessages,
}

/// A failure to inject into an upcoming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    RateLimited(Option<Duration>),
    Status(u16),
    Other(String),
}

impl Fault {
    fn into_error(self) -> Error {
        match self {
            Fault::RateLimited(retry_after) => Error::RateLimited { retry_after },
            Fault::Status(status) => Error::from_status(status, "injected fault"),
            Fault::Other(message) => Error::Other(message),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuildData {
    name: String,
    next_id: u64,
    roles: Vec<RemoteResource>,
    /// Categories and channels
    channels: Vec<RemoteResource>,
    messages: Vec<MessageInfo>,
}

impl GuildData {
    fn new(id: TargetId, name: &str) -> Self {
        let everyone = RemoteResource {
            id,
            name: "@everyone".to_string(),
            permissions: [Permission::ViewChannel, Permission::SendMessages]
                .into_iter()
                .collect(),
            is_default: true,
            ..Default::default()
        };
        Self {
            name: name.to_string(),
            next_id: id + 1,
            roles: vec![everyone],
            channels: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn allocate(&mut self) -> ResourceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn channel(&self, id: ResourceId) -> Option<&RemoteResource> {
        self.channels.iter().find(|c| c.id == id)
    }

    fn push_message(&mut self, channel: ResourceId, author: &str, content: &str) -> Result<ResourceId> {
        let kind = self
            .channel(channel)
            .ok_or_else(|| Error::NotFound {
                what: format!("channel {channel}"),
            })?
            .channel_kind;
        if !kind.is_some_and(|k| k.is_messageable()) {
            return Err(Error::from_status(400, format!("channel {channel} does not accept messages")));
        }
        let id = self.allocate();
        self.messages.push(MessageInfo {
            id,
            channel_id: channel,
            author_name: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

/// Simulated guild service
#[derive(Debug)]
pub struct SimulatedGuild {
    id: TargetId,
    data: Mutex<GuildData>,
    faults: Mutex<VecDeque<(Option<Operation>, Fault)>>,
    calls: Mutex<HashMap<Operation, usize>>,
    webhooks: bool,
    path: Option<PathBuf>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedGuild {
    /// Create an empty guild holding only its `@everyone` role
    pub fn new(id: TargetId, name: &str) -> Self {
        Self {
            id,
            data: Mutex::new(GuildData::new(id, name)),
            faults: Mutex::new(VecDeque::new()),
            calls: Mutex::new(HashMap::new()),
            webhooks: true,
            path: None,
        }
    }

    /// Open a file-backed guild, creating it if the file does not exist
    pub fn open(path: &Path, id: TargetId) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let data: GuildData = serde_json::from_str(&content)?;
            log::debug!("Loaded sandbox guild {id} from {}", path.display());
            data
        } else {
            log::info!("Creating sandbox guild {id} at {}", path.display());
            GuildData::new(id, &format!("sandbox-{id}"))
        };
        let guild = Self {
            data: Mutex::new(data),
            path: Some(path.to_path_buf()),
            ..Self::new(id, "")
        };
        guild.persist(&lock(&guild.data))?;
        Ok(guild)
    }

    /// Enable or disable author-attributed delivery
    pub fn with_webhooks(mut self, enabled: bool) -> Self {
        self.webhooks = enabled;
        self
    }

    /// Make the next call of any operation fail
    pub fn inject(&self, fault: Fault) {
        lock(&self.faults).push_back((None, fault));
    }

    /// Make the next call of `operation` fail
    pub fn inject_for(&self, operation: Operation, fault: Fault) {
        lock(&self.faults).push_back((Some(operation), fault));
    }

    /// Number of calls made to `operation`, including failed ones
    pub fn calls(&self, operation: Operation) -> usize {
        lock(&self.calls).get(&operation).copied().unwrap_or(0)
    }

    /// Add a role directly, bypassing call counting and faults
    pub fn seed_role(&self, name: &str, managed: bool) -> RemoteResource {
        let mut data = lock(&self.data);
        let role = RemoteResource {
            id: data.allocate(),
            name: name.to_string(),
            position: data.roles.len() as i64,
            managed,
            ..Default::default()
        };
        data.roles.push(role.clone());
        role
    }

    /// Add a message directly, bypassing call counting and faults
    pub fn seed_message(&self, channel: ResourceId, author: &str, content: &str) -> Result<ResourceId> {
        lock(&self.data).push_message(channel, author, content)
    }

    /// Move a role in the hierarchy; unknown ids are ignored
    pub fn set_role_position(&self, role: ResourceId, position: i64) {
        if let Some(found) = lock(&self.data).roles.iter_mut().find(|r| r.id == role) {
            found.position = position;
        }
    }

    pub fn roles(&self) -> Vec<RemoteResource> {
        lock(&self.data).roles.clone()
    }

    /// Categories and channels
    pub fn channels(&self) -> Vec<RemoteResource> {
        lock(&self.data).channels.clone()
    }

    pub fn messages(&self, channel: ResourceId) -> Vec<MessageInfo> {
        lock(&self.data)
            .messages
            .iter()
            .filter(|m| m.channel_id == channel)
            .cloned()
            .collect()
    }

    /// Count the call and fail it if a matching fault is queued
    fn begin(&self, operation: Operation) -> Result<()> {
        *lock(&self.calls).entry(operation).or_default() += 1;
        let mut faults = lock(&self.faults);
        let matching = faults
            .iter()
            .position(|(target, _)| target.is_none_or(|t| t == operation));
        match matching.and_then(|i| faults.remove(i)) {
            Some((_, fault)) => {
                log::debug!("Injected fault for {operation:?}: {fault:?}");
                Err(fault.into_error())
            }
            None => Ok(()),
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut GuildData) -> Result<T>) -> Result<T> {
        let mut data = lock(&self.data);
        let out = f(&mut data)?;
        self.persist(&data)?;
        Ok(out)
    }

    fn persist(&self, data: &GuildData) -> Result<()> {
        if let Some(path) = &self.path {
            write_atomic(path, &serde_json::to_string_pretty(data)?)?;
        }
        Ok(())
    }
}

#[async_trait]
impl GuildService for SimulatedGuild {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn target_name(&self) -> String {
        lock(&self.data).name.clone()
    }

    async fn create_role(&self, request: &RoleRequest) -> Result<RemoteResource> {
        self.begin(Operation::CreateRole)?;
        self.mutate(|data| {
            let role = RemoteResource {
                id: data.allocate(),
                name: request.name.clone(),
                color: request.color,
                permissions: request.permissions,
                position: data.roles.len() as i64,
                ..Default::default()
            };
            data.roles.push(role.clone());
            Ok(role)
        })
    }

    async fn create_category(&self, name: &str) -> Result<RemoteResource> {
        self.begin(Operation::CreateCategory)?;
        self.mutate(|data| {
            let category = RemoteResource {
                id: data.allocate(),
                name: name.to_string(),
                position: data.channels.len() as i64,
                channel_kind: Some(ChannelKind::Category),
                ..Default::default()
            };
            data.channels.push(category.clone());
            Ok(category)
        })
    }

    async fn create_channel(&self, request: &ChannelRequest) -> Result<RemoteResource> {
        self.begin(Operation::CreateChannel)?;
        self.mutate(|data| {
            if let Some(parent) = request.parent_id {
                let is_category = data
                    .channel(parent)
                    .is_some_and(|c| c.channel_kind == Some(ChannelKind::Category));
                if !is_category {
                    return Err(Error::NotFound {
                        what: format!("category {parent}"),
                    });
                }
            }
            let channel = RemoteResource {
                id: data.allocate(),
                name: request.name.clone(),
                position: data.channels.len() as i64,
                channel_kind: Some(request.kind),
                parent_id: request.parent_id,
                topic: request.topic.clone(),
                ..Default::default()
            };
            data.channels.push(channel.clone());
            Ok(channel)
        })
    }

    async fn edit_channel_overwrites(
        &self,
        channel: ResourceId,
        overwrites: &[ChannelOverwrite],
    ) -> Result<()> {
        self.begin(Operation::EditOverwrites)?;
        self.mutate(|data| {
            if let Some(missing) = overwrites
                .iter()
                .find(|o| !data.roles.iter().any(|r| r.id == o.role_id))
            {
                return Err(Error::NotFound {
                    what: format!("role {}", missing.role_id),
                });
            }
            let target = data
                .channels
                .iter_mut()
                .find(|c| c.id == channel)
                .ok_or_else(|| Error::NotFound {
                    what: format!("channel {channel}"),
                })?;
            for overwrite in overwrites {
                match target.overwrites.iter_mut().find(|o| o.role_id == overwrite.role_id) {
                    Some(existing) => *existing = *overwrite,
                    None => target.overwrites.push(*overwrite),
                }
            }
            Ok(())
        })
    }

    async fn send_message(&self, channel: ResourceId, content: &str) -> Result<ResourceId> {
        self.begin(Operation::SendMessage)?;
        self.mutate(|data| data.push_message(channel, "Conditor", content))
    }

    async fn send_as(
        &self,
        channel: ResourceId,
        author_name: &str,
        content: &str,
    ) -> Result<Option<ResourceId>> {
        self.begin(Operation::SendAs)?;
        if !self.webhooks {
            return Ok(None);
        }
        let author = if author_name.is_empty() { "Conditor" } else { author_name };
        self.mutate(|data| data.push_message(channel, author, content).map(Some))
    }

    async fn list_existing(&self, kind: ResourceKind) -> Result<Vec<RemoteResource>> {
        self.begin(Operation::ListExisting)?;
        let data = lock(&self.data);
        let is_category = |r: &&RemoteResource| r.channel_kind == Some(ChannelKind::Category);
        Ok(match kind {
            ResourceKind::Roles => data.roles.clone(),
            ResourceKind::Categories => data.channels.iter().filter(is_category).cloned().collect(),
            ResourceKind::Channels => data
                .channels
                .iter()
                .filter(|r| !is_category(r))
                .cloned()
                .collect(),
        })
    }

    async fn recent_messages(&self, channel: ResourceId, limit: usize) -> Result<Vec<MessageInfo>> {
        self.begin(Operation::RecentMessages)?;
        let data = lock(&self.data);
        let all: Vec<&MessageInfo> = data.messages.iter().filter(|m| m.channel_id == channel).collect();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).cloned().collect())
    }
}
