// File: pacebot-common/src/models/command.rs

use serde::{Deserialize, Serialize};

use crate::models::platform::Platform;

/// A text-triggered canned response (e.g. `!tutorial`). Owned by the admin
/// API; bot processes only cache it with a staleness bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Primary lookup key, unique across all commands, case-insensitive.
    pub command: String,
    /// Alternate names; each must be unique across every command.
    #[serde(default)]
    pub aliases: Vec<String>,
    pub response: String,
    pub enabled: bool,
    /// Per-command cooldown override; the channel default applies if absent.
    #[serde(default)]
    pub cooldown_seconds: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Command {
    /// True when `name` equals the canonical name or any alias,
    /// case-insensitively.
    pub fn matches(&self, name: &str) -> bool {
        self.command.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn effective_cooldown(&self, channel_default: u32) -> u32 {
        self.cooldown_seconds.unwrap_or(channel_default)
    }
}

/// Usage record POSTed to the API after a command fires. Fire-and-forget:
/// failures are logged, never retried inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandUsageLog {
    pub command: String,
    /// Set when the user invoked an alias rather than the canonical name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub source: Platform,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd() -> Command {
        Command {
            command: "Tutorial".into(),
            aliases: vec!["guide".into(), "howto".into()],
            response: "See the pinned tutorial.".into(),
            enabled: true,
            cooldown_seconds: None,
            tags: vec![],
        }
    }

    #[test]
    fn matches_canonical_and_aliases_case_insensitively() {
        let c = cmd();
        assert!(c.matches("tutorial"));
        assert!(c.matches("TUTORIAL"));
        assert!(c.matches("guide"));
        assert!(c.matches("HowTo"));
        assert!(!c.matches("tutoria"));
    }

    #[test]
    fn effective_cooldown_prefers_override() {
        let mut c = cmd();
        assert_eq!(c.effective_cooldown(10), 10);
        c.cooldown_seconds = Some(3);
        assert_eq!(c.effective_cooldown(10), 3);
    }
}
