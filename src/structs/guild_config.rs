use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::snowflake;
use super::ticket::TicketKind;

/// The record as it sits in `guildConfigs`. Toggles stay optional so guilds
/// configured before the toggles existed keep working. Every field decodes
/// on its own; a bad value falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredGuildConfig {
    #[serde(with = "snowflake::option", skip_serializing_if = "Option::is_none")]
    pub support_category_id: Option<u64>,
    #[serde(with = "snowflake::option", skip_serializing_if = "Option::is_none")]
    pub mm_category_id: Option<u64>,
    #[serde(with = "snowflake::option", skip_serializing_if = "Option::is_none")]
    pub log_channel_id: Option<u64>,
    #[serde(deserialize_with = "snowflake::lenient", skip_serializing_if = "Option::is_none")]
    pub support_enabled: Option<bool>,
    #[serde(deserialize_with = "snowflake::lenient", skip_serializing_if = "Option::is_none")]
    pub trade_enabled: Option<bool>,
    #[serde(deserialize_with = "snowflake::lenient", skip_serializing_if = "Option::is_none")]
    pub logs_enabled: Option<bool>,
    #[serde(with = "snowflake::set")]
    pub support_roles: BTreeSet<u64>,
    #[serde(with = "snowflake::set")]
    pub mm_roles: BTreeSet<u64>,
    #[serde(with = "snowflake::set")]
    pub admin_roles: BTreeSet<u64>,
    #[serde(deserialize_with = "snowflake::lenient")]
    pub panel_text: PanelText,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelText {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_description: Option<String>,
}

/// Effective configuration handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildConfig {
    #[serde(with = "snowflake::option")]
    pub support_category_id: Option<u64>,
    #[serde(with = "snowflake::option")]
    pub mm_category_id: Option<u64>,
    #[serde(with = "snowflake::option")]
    pub log_channel_id: Option<u64>,
    pub support_enabled: bool,
    pub trade_enabled: bool,
    pub logs_enabled: bool,
    #[serde(with = "snowflake::set")]
    pub support_roles: BTreeSet<u64>,
    #[serde(with = "snowflake::set")]
    pub mm_roles: BTreeSet<u64>,
    #[serde(with = "snowflake::set")]
    pub admin_roles: BTreeSet<u64>,
    pub panel_text: PanelText,
}

impl From<&StoredGuildConfig> for GuildConfig {
    fn from(stored: &StoredGuildConfig) -> Self {
        Self {
            support_category_id: stored.support_category_id,
            mm_category_id: stored.mm_category_id,
            log_channel_id: stored.log_channel_id,
            support_enabled: stored
                .support_enabled
                .unwrap_or(stored.support_category_id.is_some()),
            trade_enabled: stored.trade_enabled.unwrap_or(stored.mm_category_id.is_some()),
            logs_enabled: stored.logs_enabled.unwrap_or(stored.log_channel_id.is_some()),
            support_roles: stored.support_roles.clone(),
            mm_roles: stored.mm_roles.clone(),
            admin_roles: stored.admin_roles.clone(),
            panel_text: stored.panel_text.clone(),
        }
    }
}

impl GuildConfig {
    pub fn is_enabled(&self, kind: TicketKind) -> bool {
        match kind {
            TicketKind::Support => self.support_enabled,
            TicketKind::Trade => self.trade_enabled,
        }
    }

    pub fn category_id(&self, kind: TicketKind) -> Option<u64> {
        match kind {
            TicketKind::Support => self.support_category_id,
            TicketKind::Trade => self.mm_category_id,
        }
    }

    pub fn panel_description(&self, kind: TicketKind) -> Option<&str> {
        match kind {
            TicketKind::Support => self.panel_text.support_description.as_deref(),
            TicketKind::Trade => self.panel_text.trade_description.as_deref(),
        }
    }

    /// Log destination, only when logging is switched on.
    pub fn log_channel(&self) -> Option<u64> {
        self.log_channel_id.filter(|_| self.logs_enabled)
    }

    /// Roles that get access to a freshly opened ticket of this kind.
    pub fn staff_roles(&self, kind: TicketKind) -> BTreeSet<u64> {
        let mut roles = self.admin_roles.clone();
        roles.extend(self.support_roles.iter().copied());
        if kind == TicketKind::Trade {
            roles.extend(self.mm_roles.iter().copied());
        }
        roles
    }
}

/// Partial update. `None` leaves a field alone; for nullable ids
/// `Some(None)` clears it. Role lists arrive raw and are normalized before
/// they are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub support_category_id: Option<Option<u64>>,
    pub mm_category_id: Option<Option<u64>>,
    pub log_channel_id: Option<Option<u64>>,
    pub support_enabled: Option<bool>,
    pub trade_enabled: Option<bool>,
    pub logs_enabled: Option<bool>,
    pub support_roles: Option<Vec<String>>,
    pub mm_roles: Option<Vec<String>>,
    pub admin_roles: Option<Vec<String>>,
    pub panel_text: Option<PanelTextPatch>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelTextPatch {
    pub support_description: Option<Option<String>>,
    pub trade_description: Option<Option<String>>,
}

/// Keeps well-formed ids, accepting `<@&id>` mention syntax, deduplicated.
pub fn normalize_role_ids<I, S>(raw: I) -> BTreeSet<u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|entry| {
            let entry = entry.as_ref().trim();
            let entry = entry
                .strip_prefix("<@&")
                .and_then(|e| e.strip_suffix('>'))
                .unwrap_or(entry);
            snowflake::parse(entry)
        })
        .collect()
}

fn blank_to_none(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

impl StoredGuildConfig {
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(id) = patch.support_category_id {
            self.support_category_id = id;
        }
        if let Some(id) = patch.mm_category_id {
            self.mm_category_id = id;
        }
        if let Some(id) = patch.log_channel_id {
            self.log_channel_id = id;
        }
        if let Some(enabled) = patch.support_enabled {
            self.support_enabled = Some(enabled);
        }
        if let Some(enabled) = patch.trade_enabled {
            self.trade_enabled = Some(enabled);
        }
        if let Some(enabled) = patch.logs_enabled {
            self.logs_enabled = Some(enabled);
        }
        if let Some(roles) = patch.support_roles {
            self.support_roles = normalize_role_ids(roles);
        }
        if let Some(roles) = patch.mm_roles {
            self.mm_roles = normalize_role_ids(roles);
        }
        if let Some(roles) = patch.admin_roles {
            self.admin_roles = normalize_role_ids(roles);
        }
        if let Some(panel) = patch.panel_text {
            if let Some(text) = panel.support_description {
                self.panel_text.support_description = blank_to_none(text);
            }
            if let Some(text) = panel.trade_description {
                self.panel_text.trade_description = blank_to_none(text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY: u64 = 300000000000000001;

    #[test]
    fn toggles_are_inferred_from_legacy_ids() {
        let stored: StoredGuildConfig = serde_json::from_value(serde_json::json!({
            "supportCategoryId": CATEGORY.to_string(),
            "logChannelId": "300000000000000002",
        }))
        .unwrap();

        let config = GuildConfig::from(&stored);
        assert!(config.support_enabled);
        assert!(config.logs_enabled);
        assert!(!config.trade_enabled);
        assert_eq!(config.log_channel(), Some(300000000000000002));
    }

    #[test]
    fn one_bad_field_keeps_the_rest_of_the_record() {
        let stored: StoredGuildConfig = serde_json::from_value(serde_json::json!({
            "mmCategoryId": CATEGORY.to_string(),
            "mmRoles": ["200000000000000001"],
            "supportEnabled": "yes",
            "adminRoles": "200000000000000002",
            "logChannelId": { "id": 1 },
        }))
        .unwrap();

        assert_eq!(stored.mm_category_id, Some(CATEGORY));
        assert_eq!(stored.mm_roles, [200000000000000001].into());
        assert_eq!(stored.support_enabled, None);
        assert!(stored.admin_roles.is_empty());
        assert_eq!(stored.log_channel_id, None);
        assert!(GuildConfig::from(&stored).trade_enabled);
    }

    #[test]
    fn explicit_toggle_wins_over_inference() {
        let stored = StoredGuildConfig {
            support_category_id: Some(CATEGORY),
            support_enabled: Some(false),
            ..Default::default()
        };
        assert!(!GuildConfig::from(&stored).support_enabled);
    }

    #[test]
    fn inferred_toggles_are_not_written_back() {
        let stored = StoredGuildConfig {
            mm_category_id: Some(CATEGORY),
            ..Default::default()
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert!(json.get("tradeEnabled").is_none());
        assert_eq!(json["mmCategoryId"], CATEGORY.to_string());
    }

    #[test]
    fn role_lists_are_filtered_and_deduplicated() {
        let roles = normalize_role_ids([
            "200000000000000001",
            "<@&200000000000000002>",
            "200000000000000001",
            "everyone",
            "42",
        ]);
        assert_eq!(
            roles.into_iter().collect::<Vec<_>>(),
            vec![200000000000000001, 200000000000000002]
        );
    }

    #[test]
    fn trade_tickets_admit_support_and_trade_staff() {
        let stored = StoredGuildConfig {
            support_roles: [1].into(),
            mm_roles: [2].into(),
            admin_roles: [3].into(),
            ..Default::default()
        };
        let config = GuildConfig::from(&stored);
        assert_eq!(config.staff_roles(TicketKind::Trade), [1, 2, 3].into());
        assert_eq!(config.staff_roles(TicketKind::Support), [1, 3].into());
    }

    #[test]
    fn panel_text_clears_on_blank() {
        let mut stored = StoredGuildConfig::default();
        stored.apply(ConfigPatch {
            panel_text: Some(PanelTextPatch {
                support_description: Some(Some("Ask away".into())),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(stored.panel_text.support_description.as_deref(), Some("Ask away"));

        stored.apply(ConfigPatch {
            panel_text: Some(PanelTextPatch {
                support_description: Some(Some("   ".into())),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(stored.panel_text.support_description, None);
    }
}
