//! Plan compiler: Specification (+ optional template) -> BuildPlan
//!
//! Output order is fixed: roles (descending position), then each category
//! followed by its channels and their starter posts, then exactly one
//! permission step, then exactly one metadata step. Step ids are derived
//! from content so compiling the same input twice yields the same plan.

use crate::error::Result;
use crate::spec::Specification;
use crate::template::{self, CategoryDef, ChannelDef, RoleDef, Template};
use crate::types::{BuildPlan, BuildStep, StepType};
use serde_json::{Map, Value, json};
use std::cmp::Reverse;
use std::collections::HashSet;

const ADMIN_COLOR: &str = "#b02e0c";
const MODERATOR_COLOR: &str = "#0b6e4f";

/// Sizes that earn a Veteran role under official-style defaults
const LARGE_SIZES: &[&str] = &["large", "very large", "huge"];

/// Compile a specification into a build plan.
///
/// `overrides` is an explicit template blob; when `None`, the template is
/// chosen from `spec.extras["templates"]` (official style first).
pub fn compile(spec: &Specification, overrides: Option<&Value>, name: &str) -> Result<BuildPlan> {
    let chosen = overrides.or_else(|| template::choose(spec.templates()));
    let template = match chosen {
        Some(raw) => Template::from_value(raw)?,
        None => Template::default(),
    };
    let official = template.is_official();
    log::debug!(
        "Compiling plan '{}' (template: {}, official style: {official})",
        name,
        template.name().unwrap_or("none")
    );

    let mut plan = BuildPlan::new(name);
    let mut ids = IdAllocator::default();

    let roles = template
        .overrides
        .roles
        .clone()
        .unwrap_or_else(|| default_roles(spec, official));
    emit_roles(&mut plan, &mut ids, roles);

    let categories = template
        .overrides
        .categories
        .clone()
        .unwrap_or_else(|| default_categories(spec, official));
    emit_categories(&mut plan, &mut ids, &categories);

    let permissions = template
        .overrides
        .permissions
        .clone()
        .unwrap_or_else(default_permissions);
    let perm_id = match permissions.get("channel").and_then(Value::as_str) {
        Some(channel) => format!("perm-{}", slug(channel)),
        None => "perm-all".to_string(),
    };
    plan.add_step(step(ids.allocate(perm_id), StepType::ApplyPermissionOverwrites, permissions));

    let mut meta = Map::new();
    meta.insert("spec_summary".into(), serde_json::to_value(spec)?);
    meta.insert("template_meta".into(), Value::Object(template.meta.clone()));
    plan.add_step(step(ids.allocate("meta".to_string()), StepType::RegisterMetadata, meta));

    log::info!("Compiled plan '{}' with {} steps", plan.name, plan.len());
    Ok(plan)
}

fn step(id: String, step_type: StepType, payload: Map<String, Value>) -> BuildStep {
    let delay = step_type.default_delay();
    BuildStep::new(id, step_type, payload).with_delay(delay)
}

fn emit_roles(plan: &mut BuildPlan, ids: &mut IdAllocator, mut roles: Vec<RoleDef>) {
    // Stable sort: equal positions keep input order.
    roles.sort_by_key(|r| Reverse(r.position.unwrap_or(0)));

    for role in roles {
        let mut payload = Map::new();
        payload.insert("name".into(), json!(role.name));
        if let Some(profile) = role.profile.filter(|p| !p.is_empty()) {
            payload.insert("profile".into(), json!(profile));
        }
        if let Some(position) = role.position.filter(|p| *p != 0) {
            payload.insert("position".into(), json!(position));
        }
        let color = role
            .color
            .filter(|c| !c.is_empty())
            .or_else(|| heuristic_color(&role.name).map(str::to_string));
        if let Some(color) = color {
            payload.insert("color".into(), json!(color));
        }
        if let Some(permissions) = role.permissions {
            payload.insert("permissions".into(), json!(permissions));
        }

        let id = ids.allocate(format!("role-{}", slug(&role.name)));
        plan.add_step(step(id, StepType::CreateGroupRole, payload));
    }
}

fn emit_categories(plan: &mut BuildPlan, ids: &mut IdAllocator, categories: &[CategoryDef]) {
    for category in categories {
        let cat_slug = slug(&category.name);
        let mut payload = Map::new();
        payload.insert("name".into(), json!(category.name));
        plan.add_step(step(
            ids.allocate(format!("cat-{cat_slug}")),
            StepType::CreateCategory,
            payload,
        ));

        for channel in &category.channels {
            let chan_slug = slug(&channel.name);
            let mut payload = Map::new();
            payload.insert("name".into(), json!(channel.name));
            // Linked by category name, resolved by the handler at run time.
            payload.insert("category".into(), json!(category.name));
            payload.insert("type".into(), json!(channel.kind));
            if let Some(topic) = &channel.topic {
                payload.insert("topic".into(), json!(topic));
            }
            if let Some(overwrites) = &channel.overwrites {
                payload.insert("overwrites".into(), overwrites.clone());
            }
            plan.add_step(step(
                ids.allocate(format!("chan-{cat_slug}-{chan_slug}")),
                StepType::CreateChannel,
                payload,
            ));

            if let Some(starter) = channel.starter.as_deref().filter(|s| !s.is_empty()) {
                let mut payload = Map::new();
                payload.insert("channel".into(), json!(channel.name));
                payload.insert("content".into(), json!(starter));
                payload.insert("use_webhook".into(), json!(true));
                plan.add_step(step(
                    ids.allocate(format!("post-{cat_slug}-{chan_slug}")),
                    StepType::PostMessage,
                    payload,
                ));
            }
        }
    }
}

fn default_roles(spec: &Specification, official: bool) -> Vec<RoleDef> {
    let mut roles = Vec::new();
    if official {
        roles.push(RoleDef::new("Administrator", Some("admin"), 100));
        roles.push(RoleDef::new("Moderator", Some("moderation"), 90));
        roles.push(RoleDef::new("Member", Some("member"), 10));
        roles.push(RoleDef::new("Bots", Some("bot"), 5));
        if !spec.community_type.is_empty() {
            roles.push(RoleDef::new(title_case(&spec.community_type), None, 50));
        }
        for game in &spec.games {
            roles.push(RoleDef::new(format!("{} Player", title_case(game)), None, 20));
        }
        if LARGE_SIZES.contains(&spec.size.to_lowercase().as_str()) {
            roles.push(RoleDef::new("Veteran", None, 30));
        }
    } else {
        let named = |name: &str| RoleDef {
            name: name.to_string(),
            ..Default::default()
        };
        if !spec.community_type.is_empty() {
            roles.push(named(&title_case(&spec.community_type)));
        }
        roles.push(named("Admin"));
        if !spec.moderation.is_empty() {
            roles.push(named("Moderator"));
        }
        if spec.size == "large" {
            roles.push(named("Veteran"));
        }
    }
    roles
}

fn default_categories(spec: &Specification, official: bool) -> Vec<CategoryDef> {
    if !official {
        let mut categories: Vec<CategoryDef> = ["Community", "Info"]
            .into_iter()
            .map(|name| CategoryDef {
                name: name.to_string(),
                channels: Vec::new(),
            })
            .collect();
        categories.extend(spec.games.iter().map(|game| CategoryDef {
            name: title_case(game),
            channels: Vec::new(),
        }));
        return categories;
    }

    let mut categories = vec![
        CategoryDef {
            name: "Information".to_string(),
            channels: vec![
                ChannelDef::new("welcome", "text", Some("Welcome to the server! Please read the rules.")),
                ChannelDef::new("rules", "text", Some("Be kind. No harassment. Follow Discord TOS.")),
                ChannelDef::new(
                    "announcements",
                    "announcement",
                    Some("Server announcements will appear here."),
                ),
            ],
        },
        CategoryDef {
            name: "Community".to_string(),
            channels: vec![
                ChannelDef::new("general", "text", Some("Say hi!")),
                ChannelDef::new("introductions", "text", Some("Introduce yourself!")),
                ChannelDef::new("off-topic", "text", None),
            ],
        },
    ];
    if !spec.games.is_empty() {
        let channels = spec
            .games
            .iter()
            .flat_map(|game| {
                let base = game.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
                [
                    ChannelDef::new(format!("{base}-chat"), "text", None),
                    ChannelDef::new(format!("{base}-voice"), "voice", None),
                ]
            })
            .collect();
        categories.push(CategoryDef {
            name: "Games".to_string(),
            channels,
        });
    }
    categories
}

fn default_permissions() -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("channel".into(), json!("announcements"));
    payload.insert(
        "overwrites".into(),
        json!({"@everyone": {"allow": [], "deny": ["send_messages"]}}),
    );
    payload
}

fn heuristic_color(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    if lower.contains("admin") {
        Some(ADMIN_COLOR)
    } else if lower.contains("moderator") {
        Some(MODERATOR_COLOR)
    } else {
        None
    }
}

/// Hands out unique ids, suffixing repeats with `-2`, `-3`, ...
#[derive(Debug, Default)]
struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    fn allocate(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed to single dashes
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "unnamed".to_string()
    } else {
        out
    }
}

/// Uppercase the first letter of every word, lowercase the rest
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaming_spec() -> Specification {
        let mut spec = Specification {
            community_type: "gaming".into(),
            games: vec!["chess".into()],
            size: "large".into(),
            ..Default::default()
        };
        spec.attach_template(json!({"meta": {"name": "official", "official_style": true}}));
        spec
    }

    fn names_of(plan: &BuildPlan, step_type: &StepType) -> Vec<String> {
        plan.steps
            .iter()
            .filter(|s| &s.step_type == step_type)
            .filter_map(|s| s.payload_str("name").map(str::to_string))
            .collect()
    }

    #[test]
    fn test_official_style_is_deterministic() {
        let spec = gaming_spec();
        let first = compile(&spec, None, "build").unwrap();
        let second = compile(&spec, None, "build").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_official_style_roles_in_position_order() {
        let plan = compile(&gaming_spec(), None, "build").unwrap();
        assert_eq!(
            names_of(&plan, &StepType::CreateGroupRole),
            vec![
                "Administrator",
                "Moderator",
                "Gaming",
                "Veteran",
                "Chess Player",
                "Member",
                "Bots"
            ]
        );
        let admin = plan.step("role-administrator").unwrap();
        assert_eq!(admin.payload_str("color"), Some(ADMIN_COLOR));
        assert_eq!(admin.payload_str("profile"), Some("admin"));
    }

    #[test]
    fn test_official_style_layout() {
        let plan = compile(&gaming_spec(), None, "build").unwrap();
        assert_eq!(
            names_of(&plan, &StepType::CreateCategory),
            vec!["Information", "Community", "Games"]
        );
        assert_eq!(
            names_of(&plan, &StepType::CreateChannel),
            vec![
                "welcome",
                "rules",
                "announcements",
                "general",
                "introductions",
                "off-topic",
                "chess-chat",
                "chess-voice"
            ]
        );

        let voice = plan.step("chan-games-chess-voice").unwrap();
        assert_eq!(voice.payload_str("category"), Some("Games"));
        assert_eq!(voice.payload_str("type"), Some("voice"));

        // Starter post follows its channel directly.
        let pos = plan.steps.iter().position(|s| s.id == "chan-information-welcome").unwrap();
        assert_eq!(plan.steps[pos + 1].id, "post-information-welcome");
        assert!(plan.step("post-community-off-topic").is_none());
    }

    #[test]
    fn test_game_channels_join_words_and_rules_starter() {
        let mut spec = gaming_spec();
        spec.games = vec!["Rocket League".into()];
        let plan = compile(&spec, None, "build").unwrap();

        let channels = names_of(&plan, &StepType::CreateChannel);
        assert!(channels.contains(&"rocket-league-chat".to_string()));
        assert!(channels.contains(&"rocket-league-voice".to_string()));

        let rules = plan.step("post-information-rules").unwrap();
        assert_eq!(
            rules.payload_str("content"),
            Some("Be kind. No harassment. Follow Discord TOS.")
        );
    }

    #[test]
    fn test_trailing_permission_and_metadata_steps() {
        let plan = compile(&gaming_spec(), None, "build").unwrap();
        let n = plan.len();
        assert_eq!(plan.steps[n - 2].step_type, StepType::ApplyPermissionOverwrites);
        assert_eq!(plan.steps[n - 2].id, "perm-announcements");
        assert_eq!(
            plan.steps[n - 2].payload["overwrites"]["@everyone"]["deny"],
            json!(["send_messages"])
        );
        assert_eq!(plan.steps[n - 1].step_type, StepType::RegisterMetadata);
        assert_eq!(plan.steps[n - 1].payload["template_meta"]["name"], "official");
        assert_eq!(plan.steps[n - 1].payload["spec_summary"]["community_type"], "gaming");

        let perms = plan
            .steps
            .iter()
            .filter(|s| s.step_type == StepType::ApplyPermissionOverwrites)
            .count();
        assert_eq!(perms, 1);
    }

    #[test]
    fn test_minimal_defaults() {
        let spec = Specification {
            community_type: "study group".into(),
            moderation: "strict".into(),
            games: vec!["go".into()],
            size: "large".into(),
            ..Default::default()
        };
        let plan = compile(&spec, None, "p").unwrap();
        assert_eq!(
            names_of(&plan, &StepType::CreateGroupRole),
            vec!["Study Group", "Admin", "Moderator", "Veteran"]
        );
        assert_eq!(
            names_of(&plan, &StepType::CreateCategory),
            vec!["Community", "Info", "Go"]
        );
        assert!(names_of(&plan, &StepType::CreateChannel).is_empty());
        assert_eq!(plan.step("role-admin").unwrap().payload_str("color"), Some(ADMIN_COLOR));
        assert_eq!(
            plan.step("role-moderator").unwrap().payload_str("color"),
            Some(MODERATOR_COLOR)
        );
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let overrides = json!({
            "meta": {"name": "custom"},
            "overrides": {
                "roles": [
                    {"name": "Crew", "position": 1, "color": "#123456"},
                    {"name": "Captain", "position": 9, "permissions": ["kick_members"]}
                ],
                "categories": [
                    {"name": "Deck", "channels": [
                        {"name": "bridge", "starter": "Ahoy", "topic": "Command"},
                        {"name": "bridge"}
                    ]}
                ],
                "permissions": {"overwrites": {"Crew": {"allow": ["send_messages"]}}}
            }
        });
        let plan = compile(&Specification::default(), Some(&overrides), "custom").unwrap();

        assert_eq!(names_of(&plan, &StepType::CreateGroupRole), vec!["Captain", "Crew"]);
        assert_eq!(plan.step("role-crew").unwrap().payload_str("color"), Some("#123456"));
        assert_eq!(
            plan.step("role-captain").unwrap().payload["permissions"],
            json!(["kick_members"])
        );
        assert_eq!(plan.step("chan-deck-bridge").unwrap().payload_str("topic"), Some("Command"));
        // Duplicate channel names get suffixed ids.
        assert!(plan.step("chan-deck-bridge-2").is_some());
        assert!(plan.step("perm-all").is_some());
    }

    #[test]
    fn test_malformed_override_is_compile_error() {
        let overrides = json!({"overrides": {"categories": {"name": "not a list"}}});
        let result = compile(&Specification::default(), Some(&overrides), "bad");
        assert!(matches!(result, Err(crate::Error::Compile(_))));
    }

    #[test]
    fn test_slug_and_title_case() {
        assert_eq!(slug("Chess Player"), "chess-player");
        assert_eq!(slug("  off--topic!! "), "off-topic");
        assert_eq!(slug("???"), "unnamed");
        assert_eq!(title_case("rocket league"), "Rocket League");
        assert_eq!(title_case("GAMING"), "Gaming");
    }
}
