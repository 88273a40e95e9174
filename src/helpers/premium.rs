use chrono::{DateTime, Utc};
use poise::futures_util::lock::Mutex as AsyncMutex;
use std::sync::Arc;
use tracing::info;

use crate::error::{log_soft_failure, DeskError};
use crate::helpers::clock::Clock;
use crate::helpers::store::Repository;
use crate::structs::license_key::LicenseKey;
use crate::structs::premium::{Merge, PremiumPatch, PremiumState, DEFAULT_PING};
use crate::structs::ticket::TicketKind;

/// Owns premium status per guild. Every read enforces expiry first, and every
/// write goes to storage before returning.
pub struct PremiumManager {
    states: Repository<PremiumState>,
    keys: Repository<LicenseKey>,
    clock: Arc<dyn Clock>,
    redeem_lock: AsyncMutex<()>,
}

fn demote_if_expired(state: &mut PremiumState, now: DateTime<Utc>) -> bool {
    if state.is_premium && state.is_expired(now) {
        state.is_premium = false;
        true
    } else {
        false
    }
}

impl PremiumManager {
    pub fn new(states: Repository<PremiumState>, keys: Repository<LicenseKey>, clock: Arc<dyn Clock>) -> Self {
        Self { states, keys, clock, redeem_lock: AsyncMutex::new(()) }
    }

    pub async fn get_state(&self, guild_id: u64) -> PremiumState {
        let key = guild_id.to_string();
        let now = self.clock.now();

        let (mut state, demoted) = self.states.modify(|entries| match entries.get_mut(&key) {
            Some(state) => {
                let demoted = demote_if_expired(state, now);
                (state.clone(), demoted)
            }
            None => (PremiumState::default(), false),
        });

        if demoted {
            info!(guild_id, "premium expired, demoting");
            log_soft_failure(self.states.commit().await, self.states.name());
        }

        state.sanitize();
        state
    }

    pub async fn is_premium(&self, guild_id: u64) -> bool {
        self.get_state(guild_id).await.is_premium
    }

    /// Deep-merges `patch`; branding is validated before anything changes.
    pub async fn save_state(&self, guild_id: u64, patch: PremiumPatch) -> Result<PremiumState, DeskError> {
        if let Some(branding) = &patch.branding {
            branding.validate().map_err(DeskError::Invalid)?;
        }

        let now = self.clock.now();
        let state = self.states.modify(|entries| {
            let state = entries.entry(guild_id.to_string()).or_default();
            demote_if_expired(state, now);
            state.merge(patch);
            state.sanitize();
            state.clone()
        });

        log_soft_failure(self.states.commit().await, self.states.name());
        Ok(state)
    }

    /// Consumes `code` for `guild_id`. The key check, its consumption and
    /// the guild update all happen under one lock, so a key can never be
    /// applied twice.
    pub async fn redeem(&self, guild_id: u64, code: &str) -> Result<PremiumState, DeskError> {
        let _guard = self.redeem_lock.lock().await;
        let code = code.trim().to_uppercase();
        let now = self.clock.now();

        let key = self.keys.modify(|keys| {
            let key = keys.get_mut(&code).ok_or(DeskError::KeyInvalid)?;
            if key.used {
                return Err(DeskError::KeyAlreadyUsed);
            }
            if key.duration() <= chrono::Duration::zero() {
                return Err(DeskError::Invalid("license key carries no duration".to_string()));
            }
            key.mark_used(guild_id, now);
            Ok(key.clone())
        })?;
        log_soft_failure(self.keys.commit().await, self.keys.name());

        let state = self.states.modify(|entries| {
            let state = entries.entry(guild_id.to_string()).or_default();
            demote_if_expired(state, now);

            let base = state.expires_at.filter(|expires_at| *expires_at > now).unwrap_or(now);
            state.expires_at = Some(base + key.duration());
            state.is_premium = true;
            state.plan = Some(key.plan.clone());
            state.activated_at.get_or_insert(now);
            state.clone()
        });
        log_soft_failure(self.states.commit().await, self.states.name());

        info!(guild_id, plan = %key.plan, expires_at = ?state.expires_at, "license key redeemed");
        let mut state = state;
        state.sanitize();
        Ok(state)
    }

    /// Mention line for a new ticket; non-premium guilds always get `@here`.
    pub async fn compute_ping_mention(&self, guild_id: u64, kind: TicketKind) -> String {
        let state = self.get_state(guild_id).await;
        if !state.is_premium {
            return DEFAULT_PING.to_string();
        }
        state.features.pings.for_kind(kind).mention()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::clock::ManualClock;
    use crate::helpers::scheduler::ManualScheduler;
    use crate::helpers::store::{MemoryBackend, WritePolicy, PREMIUM_GUILDS, PREMIUM_KEYS};
    use crate::structs::premium::{BrandingPatch, FeaturesPatch, PingPatch, PingsPatch};
    use chrono::Duration;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    const GUILD: u64 = 100000000000000001;

    struct Fixture {
        premium: PremiumManager,
        keys: Repository<LicenseKey>,
        backend: Arc<MemoryBackend>,
        clock: Arc<ManualClock>,
    }

    async fn fixture(backend: MemoryBackend) -> Fixture {
        let backend = Arc::new(backend);
        let scheduler = Arc::new(ManualScheduler::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let retry = StdDuration::from_secs(30);
        let states = Repository::open(PREMIUM_GUILDS, backend.clone(), scheduler.clone(), WritePolicy::Immediate, retry).await;
        let keys = Repository::open(PREMIUM_KEYS, backend.clone(), scheduler, WritePolicy::Immediate, retry).await;
        Fixture {
            premium: PremiumManager::new(states, keys.clone(), clock.clone()),
            keys,
            backend,
            clock,
        }
    }

    async fn issue(keys: &Repository<LicenseKey>, code: &str, duration: Duration, now: DateTime<Utc>) {
        let key = LicenseKey::new(code.to_string(), "test".to_string(), duration, None, now);
        keys.put(code, key).await.unwrap();
    }

    #[tokio::test]
    async fn expired_premium_is_demoted_and_stays_demoted() {
        let past = Utc::now() - Duration::days(1);
        let backend = MemoryBackend::new().with_doc(
            PREMIUM_GUILDS,
            json!({ GUILD.to_string(): { "isPremium": true, "expiresAt": past.timestamp_millis() } }),
        );
        let f = fixture(backend).await;

        assert!(!f.premium.get_state(GUILD).await.is_premium);
        assert_eq!(f.backend.doc(PREMIUM_GUILDS).unwrap()[GUILD.to_string()]["isPremium"], false);
        assert!(!f.premium.get_state(GUILD).await.is_premium);
        assert_eq!(f.backend.writes(), 1);
    }

    #[tokio::test]
    async fn unreadable_or_iso_expiry_does_not_grant_forever() {
        let backend = MemoryBackend::new().with_doc(
            PREMIUM_GUILDS,
            json!({
                GUILD.to_string(): { "isPremium": true, "expiresAt": "2020-01-01T00:00:00.000Z" },
                "100000000000000002": { "isPremium": true, "expiresAt": { "when": "later" } },
            }),
        );
        let f = fixture(backend).await;

        assert!(!f.premium.is_premium(GUILD).await);
        assert!(!f.premium.is_premium(100000000000000002).await);
        assert_eq!(f.backend.doc(PREMIUM_GUILDS).unwrap()["100000000000000002"]["isPremium"], false);
    }

    #[tokio::test]
    async fn concurrent_redemptions_stack_and_never_reuse_a_key() {
        let f = fixture(MemoryBackend::new()).await;
        let now = f.clock.now();
        issue(&f.keys, "TKT-AAAA-AAAA-AAAA", Duration::days(10), now).await;
        issue(&f.keys, "TKT-BBBB-BBBB-BBBB", Duration::days(30), now).await;

        let (a, b) = tokio::join!(
            f.premium.redeem(GUILD, "TKT-AAAA-AAAA-AAAA"),
            f.premium.redeem(GUILD, "TKT-BBBB-BBBB-BBBB"),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(f.premium.get_state(GUILD).await.expires_at, Some(now + Duration::days(40)));

        let again = f.premium.redeem(100000000000000002, "TKT-AAAA-AAAA-AAAA").await;
        assert!(matches!(again, Err(DeskError::KeyAlreadyUsed)));
    }

    #[tokio::test]
    async fn legacy_grant_without_expiry_stays_premium() {
        let backend = MemoryBackend::new()
            .with_doc(PREMIUM_GUILDS, json!({ GUILD.to_string(): { "isPremium": true } }));
        let f = fixture(backend).await;
        f.clock.advance(Duration::days(10_000));
        assert!(f.premium.is_premium(GUILD).await);
    }

    #[tokio::test]
    async fn redemption_extends_remaining_time() {
        let f = fixture(MemoryBackend::new()).await;
        let now = f.clock.now();
        issue(&f.keys, "TKT-AAAA-AAAA-AAAA", Duration::days(10), now).await;
        issue(&f.keys, "TKT-BBBB-BBBB-BBBB", Duration::days(30), now).await;

        let first = f.premium.redeem(GUILD, "tkt-aaaa-aaaa-aaaa").await.unwrap();
        assert_eq!(first.expires_at, Some(now + Duration::days(10)));
        assert_eq!(first.activated_at, Some(now));

        f.clock.advance(Duration::days(4));
        let second = f.premium.redeem(GUILD, "TKT-BBBB-BBBB-BBBB").await.unwrap();
        assert_eq!(second.expires_at, Some(now + Duration::days(40)));
        assert_eq!(second.activated_at, Some(now));
        assert_eq!(second.plan.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn redemption_after_expiry_starts_from_now() {
        let f = fixture(MemoryBackend::new()).await;
        let start = f.clock.now();
        issue(&f.keys, "TKT-AAAA-AAAA-AAAA", Duration::days(1), start).await;
        issue(&f.keys, "TKT-BBBB-BBBB-BBBB", Duration::days(5), start).await;

        f.premium.redeem(GUILD, "TKT-AAAA-AAAA-AAAA").await.unwrap();
        f.clock.advance(Duration::days(3));
        let state = f.premium.redeem(GUILD, "TKT-BBBB-BBBB-BBBB").await.unwrap();
        assert_eq!(state.expires_at, Some(f.clock.now() + Duration::days(5)));
        assert!(state.is_premium);
    }

    #[tokio::test]
    async fn keys_are_single_use() {
        let f = fixture(MemoryBackend::new()).await;
        issue(&f.keys, "TKT-AAAA-AAAA-AAAA", Duration::days(10), f.clock.now()).await;

        let first = f.premium.redeem(GUILD, "TKT-AAAA-AAAA-AAAA").await.unwrap();
        let writes = f.backend.writes();

        let second = f.premium.redeem(200000000000000009, "TKT-AAAA-AAAA-AAAA").await;
        assert!(matches!(second, Err(DeskError::KeyAlreadyUsed)));
        assert_eq!(f.backend.writes(), writes);
        assert_eq!(f.premium.get_state(GUILD).await, first);
        assert!(!f.premium.is_premium(200000000000000009).await);

        let key = f.keys.get("TKT-AAAA-AAAA-AAAA").unwrap();
        assert_eq!(key.used_by_guild_id, Some(GUILD));
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let f = fixture(MemoryBackend::new()).await;
        assert!(matches!(f.premium.redeem(GUILD, "TKT-NOPE").await, Err(DeskError::KeyInvalid)));
    }

    #[tokio::test]
    async fn save_state_merges_key_wise_and_validates_branding() {
        let f = fixture(MemoryBackend::new()).await;
        f.premium
            .save_state(GUILD, PremiumPatch {
                branding: Some(BrandingPatch { name: Some(Some("Acme".into())), ..Default::default() }),
                features: Some(FeaturesPatch { auto_close_minutes: Some(90), ..Default::default() }),
                ..Default::default()
            })
            .await
            .unwrap();

        let state = f
            .premium
            .save_state(GUILD, PremiumPatch {
                branding: Some(BrandingPatch { accent: Some(Some("00FF00".into())), ..Default::default() }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(state.branding.name.as_deref(), Some("Acme"));
        assert_eq!(state.branding.accent.as_deref(), Some("#00ff00"));
        assert_eq!(state.features.auto_close_minutes, 90);

        let rejected = f
            .premium
            .save_state(GUILD, PremiumPatch {
                branding: Some(BrandingPatch { accent: Some(Some("green".into())), ..Default::default() }),
                ..Default::default()
            })
            .await;
        assert!(matches!(rejected, Err(DeskError::Invalid(_))));
        assert_eq!(f.premium.get_state(GUILD).await.branding.accent.as_deref(), Some("#00ff00"));
    }

    #[tokio::test]
    async fn ping_mention_respects_premium() {
        let f = fixture(MemoryBackend::new()).await;
        let pings = FeaturesPatch {
            pings: Some(PingsPatch {
                trade: Some(PingPatch {
                    roles: Some(vec!["200000000000000001".into()]),
                    here: Some(true),
                    everyone: None,
                }),
                support: None,
            }),
            ..Default::default()
        };
        f.premium
            .save_state(GUILD, PremiumPatch { features: Some(pings), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(f.premium.compute_ping_mention(GUILD, TicketKind::Trade).await, "@here");

        f.premium
            .save_state(GUILD, PremiumPatch { is_premium: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(
            f.premium.compute_ping_mention(GUILD, TicketKind::Trade).await,
            "<@&200000000000000001> @here"
        );
        assert_eq!(f.premium.compute_ping_mention(GUILD, TicketKind::Support).await, "@here");
    }
}
