use crate::error::log_soft_failure;
use crate::helpers::store::Repository;
use crate::structs::guild_config::{ConfigPatch, GuildConfig, StoredGuildConfig};

/// Per-guild ticket routing. Reads never fail; writes are coalesced.
#[derive(Clone)]
pub struct GuildConfigManager {
    repo: Repository<StoredGuildConfig>,
}

impl GuildConfigManager {
    pub fn new(repo: Repository<StoredGuildConfig>) -> Self {
        Self { repo }
    }

    pub fn get_config(&self, guild_id: u64) -> GuildConfig {
        let stored = self.repo.get(&guild_id.to_string()).unwrap_or_default();
        GuildConfig::from(&stored)
    }

    /// Merges `patch` over the current record. The returned config is the
    /// new effective one even if the write has not happened yet.
    pub async fn save_config(&self, guild_id: u64, patch: ConfigPatch) -> GuildConfig {
        let merged = self.repo.modify(|entries| {
            let stored = entries.entry(guild_id.to_string()).or_default();
            stored.apply(patch);
            stored.clone()
        });

        log_soft_failure(self.repo.commit().await, self.repo.name());
        GuildConfig::from(&merged)
    }

    pub async fn flush(&self) {
        log_soft_failure(self.repo.flush_pending().await, self.repo.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::scheduler::ManualScheduler;
    use crate::helpers::store::{MemoryBackend, WritePolicy, GUILD_CONFIGS};
    use std::sync::Arc;
    use std::time::Duration;

    const GUILD: u64 = 100000000000000001;
    const CATEGORY: u64 = 300000000000000001;
    const LOGS: u64 = 300000000000000002;

    async fn manager() -> (GuildConfigManager, Arc<MemoryBackend>, Arc<ManualScheduler>) {
        let backend = Arc::new(MemoryBackend::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let repo = Repository::open(
            GUILD_CONFIGS,
            backend.clone(),
            scheduler.clone(),
            WritePolicy::Debounced(Duration::from_millis(250)),
            Duration::from_secs(30),
        )
        .await;
        (GuildConfigManager::new(repo), backend, scheduler)
    }

    #[tokio::test]
    async fn unknown_guild_gets_defaults() {
        let (configs, _, _) = manager().await;
        let config = configs.get_config(GUILD);
        assert!(!config.support_enabled);
        assert!(config.support_roles.is_empty());
        assert_eq!(config.support_category_id, None);
    }

    #[tokio::test]
    async fn sequential_patches_equal_a_field_wise_merge() {
        let (configs, _, _) = manager().await;

        configs
            .save_config(GUILD, ConfigPatch {
                support_category_id: Some(Some(CATEGORY)),
                support_roles: Some(vec!["200000000000000001".into(), "200000000000000001".into()]),
                ..Default::default()
            })
            .await;
        let after = configs
            .save_config(GUILD, ConfigPatch {
                log_channel_id: Some(Some(LOGS)),
                support_enabled: Some(false),
                ..Default::default()
            })
            .await;

        let (other, _, _) = manager().await;
        other
            .save_config(GUILD, ConfigPatch {
                log_channel_id: Some(Some(LOGS)),
                support_enabled: Some(false),
                ..Default::default()
            })
            .await;
        let reversed = other
            .save_config(GUILD, ConfigPatch {
                support_category_id: Some(Some(CATEGORY)),
                support_roles: Some(vec!["200000000000000001".into()]),
                ..Default::default()
            })
            .await;

        assert_eq!(after, reversed);
        assert_eq!(after.support_category_id, Some(CATEGORY));
        assert_eq!(after.support_roles, [200000000000000001].into());
        assert!(!after.support_enabled);
        assert!(after.logs_enabled);
        assert_eq!(configs.get_config(GUILD), after);
    }

    #[tokio::test]
    async fn clearing_a_category_clears_the_inferred_toggle() {
        let (configs, _, _) = manager().await;
        configs
            .save_config(GUILD, ConfigPatch { mm_category_id: Some(Some(CATEGORY)), ..Default::default() })
            .await;
        assert!(configs.get_config(GUILD).trade_enabled);

        let config = configs
            .save_config(GUILD, ConfigPatch { mm_category_id: Some(None), ..Default::default() })
            .await;
        assert!(!config.trade_enabled);
    }

    #[tokio::test]
    async fn malformed_field_does_not_erase_the_stored_record() {
        let backend = Arc::new(MemoryBackend::new().with_doc(
            GUILD_CONFIGS,
            serde_json::json!({
                "100000000000000001": {
                    "mmCategoryId": CATEGORY.to_string(),
                    "mmRoles": ["200000000000000001"],
                    "supportEnabled": "yes",
                }
            }),
        ));
        let scheduler = Arc::new(ManualScheduler::new());
        let repo = Repository::open(GUILD_CONFIGS, backend.clone(), scheduler, WritePolicy::Immediate, Duration::from_secs(30)).await;
        let configs = GuildConfigManager::new(repo);

        let config = configs.get_config(GUILD);
        assert_eq!(config.mm_category_id, Some(CATEGORY));
        assert!(config.trade_enabled);
        assert_eq!(config.mm_roles, [200000000000000001].into());

        configs
            .save_config(GUILD, ConfigPatch { logs_enabled: Some(true), ..Default::default() })
            .await;
        let doc = backend.doc(GUILD_CONFIGS).unwrap();
        assert_eq!(doc[GUILD.to_string()]["mmCategoryId"], CATEGORY.to_string());
        assert_eq!(doc[GUILD.to_string()]["mmRoles"], serde_json::json!(["200000000000000001"]));
        assert_eq!(doc[GUILD.to_string()]["logsEnabled"], true);
    }

    #[tokio::test]
    async fn rapid_edits_produce_one_write() {
        let (configs, backend, scheduler) = manager().await;
        for enabled in [true, false, true] {
            configs
                .save_config(GUILD, ConfigPatch { support_enabled: Some(enabled), ..Default::default() })
                .await;
        }
        assert_eq!(backend.writes(), 0);

        scheduler.advance(Duration::from_millis(250)).await;
        assert_eq!(backend.writes(), 1);
        let doc = backend.doc(GUILD_CONFIGS).unwrap();
        assert_eq!(doc[GUILD.to_string()]["supportEnabled"], true);
    }
}
