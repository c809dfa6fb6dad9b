//! Typed permission flags and channel overwrites
//!
//! Plans carry permission names as strings; they are parsed once into
//! [`Permission`] flags, collected in a [`PermissionSet`] bitset, and
//! combined into allow/deny pairs with [`OverwriteBuilder`].

use crate::error::{Error, Result};
use buildplan::validator::overwrite_entries;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

macro_rules! permissions {
    ($($variant:ident = $bit:expr, $name:literal;)*) => {
        /// A single named permission flag
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Permission {
            $($variant,)*
        }

        impl Permission {
            /// Every flag, in bit order
            pub const ALL: &'static [Permission] = &[$(Permission::$variant,)*];

            /// Bit position in a [`PermissionSet`]
            pub fn bit(self) -> u64 {
                match self {
                    $(Permission::$variant => 1 << $bit,)*
                }
            }

            /// Canonical snake_case name
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Permission::$variant => $name,)*
                }
            }
        }

        impl FromStr for Permission {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(Permission::$variant),)*
                    "read_messages" => Ok(Permission::ViewChannel),
                    "manage_permissions" => Ok(Permission::ManageRoles),
                    _ => Err(Error::UnknownPermission(s.to_string())),
                }
            }
        }
    };
}

permissions! {
    CreateInstantInvite = 0, "create_instant_invite";
    KickMembers = 1, "kick_members";
    BanMembers = 2, "ban_members";
    Administrator = 3, "administrator";
    ManageChannels = 4, "manage_channels";
    ManageGuild = 5, "manage_guild";
    AddReactions = 6, "add_reactions";
    ViewAuditLog = 7, "view_audit_log";
    PrioritySpeaker = 8, "priority_speaker";
    Stream = 9, "stream";
    ViewChannel = 10, "view_channel";
    SendMessages = 11, "send_messages";
    SendTtsMessages = 12, "send_tts_messages";
    ManageMessages = 13, "manage_messages";
    EmbedLinks = 14, "embed_links";
    AttachFiles = 15, "attach_files";
    ReadMessageHistory = 16, "read_message_history";
    MentionEveryone = 17, "mention_everyone";
    UseExternalEmojis = 18, "use_external_emojis";
    Connect = 20, "connect";
    Speak = 21, "speak";
    MuteMembers = 22, "mute_members";
    DeafenMembers = 23, "deafen_members";
    MoveMembers = 24, "move_members";
    ChangeNickname = 26, "change_nickname";
    ManageNicknames = 27, "manage_nicknames";
    ManageRoles = 28, "manage_roles";
    ManageWebhooks = 29, "manage_webhooks";
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitset of permission flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u64);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, flag: Permission) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn insert(&mut self, flag: Permission) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: Permission) {
        self.0 &= !flag.bit();
    }

    /// Flags contained in this set, in bit order
    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.iter().copied().filter(move |p| self.contains(*p))
    }

    /// Canonical names of the contained flags
    pub fn names(self) -> Vec<String> {
        self.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Parse a list of permission names
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Self::empty(), |mut set, name| {
            set.insert(name.as_ref().parse()?);
            Ok(set)
        })
    }

    /// Flags granted by a role profile. Unknown profiles grant nothing.
    pub fn for_profile(profile: &str) -> Self {
        let flags: &[Permission] = match profile {
            "admin" => &[Permission::Administrator],
            "moderation" => &[
                Permission::KickMembers,
                Permission::BanMembers,
                Permission::ManageMessages,
            ],
            "member" => &[Permission::SendMessages, Permission::ViewChannel],
            _ => &[],
        };
        flags.iter().copied().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

/// Allow/deny pair applied to one role on one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub allow: PermissionSet,
    pub deny: PermissionSet,
}

impl PermissionOverwrite {
    pub fn builder() -> OverwriteBuilder {
        OverwriteBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Builds a [`PermissionOverwrite`]; a later call for the same flag wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteBuilder {
    overwrite: PermissionOverwrite,
}

impl OverwriteBuilder {
    pub fn allow(mut self, flag: Permission) -> Self {
        self.overwrite.deny.remove(flag);
        self.overwrite.allow.insert(flag);
        self
    }

    pub fn deny(mut self, flag: Permission) -> Self {
        self.overwrite.allow.remove(flag);
        self.overwrite.deny.insert(flag);
        self
    }

    pub fn build(self) -> PermissionOverwrite {
        self.overwrite
    }
}

/// Overwrite bound to a resolved role id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOverwrite {
    pub role_id: u64,
    pub overwrite: PermissionOverwrite,
}

/// Parse an overwrite set in either accepted shape into `(role key, overwrite)`
/// pairs. Role keys are still unresolved names or step ids.
pub fn parse_overwrites(value: &Value) -> Result<Vec<(String, PermissionOverwrite)>> {
    overwrite_entries(value)
        .into_iter()
        .map(|(role, entry)| Ok((role, parse_entry(entry)?)))
        .collect()
}

fn parse_entry(entry: &Value) -> Result<PermissionOverwrite> {
    let mut builder = PermissionOverwrite::builder();
    for name in string_list(entry.get("allow")) {
        builder = builder.allow(name.parse()?);
    }
    for name in string_list(entry.get("deny")) {
        builder = builder.deny(name.parse()?);
    }
    Ok(builder.build())
}

fn string_list(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Parse a `#rrggbb` (or `rrggbb`, or `0x...`) color
pub fn parse_color(raw: &str) -> Option<u32> {
    let hex = raw
        .trim()
        .trim_start_matches('#')
        .trim_start_matches("0x");
    if hex.is_empty() || hex.len() > 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Format a color as `#rrggbb`
pub fn format_color(color: u32) -> String {
    format!("#{:06x}", color & 0x00ff_ffff)
}
