use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

use crate::error::{log_soft_failure, DeskError};
use crate::helpers::clock::Clock;
use crate::helpers::store::Repository;
use crate::structs::license_key::LicenseKey;
use crate::structs::time_parse::parse_duration;

const KEY_PREFIX: &str = "TKT";
const KEY_GROUPS: usize = 3;
const GROUP_LEN: usize = 4;
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const MAX_KEYS_PER_BATCH: usize = 25;

/// Creates license keys. Redemption lives with the premium manager.
pub struct KeyIssuer {
    keys: Repository<LicenseKey>,
    clock: Arc<dyn Clock>,
}

fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::from(KEY_PREFIX);
    for _ in 0..KEY_GROUPS {
        code.push('-');
        for _ in 0..GROUP_LEN {
            if let Some(c) = CHARSET.choose(&mut *rng) {
                code.push(*c as char);
            }
        }
    }
    code
}

impl KeyIssuer {
    pub fn new(keys: Repository<LicenseKey>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    /// Issues `count` keys (clamped to 1..=25) worth `duration_text` each.
    pub async fn generate(
        &self,
        plan: Option<&str>,
        duration_text: &str,
        count: usize,
        created_by: Option<u64>,
    ) -> Result<Vec<LicenseKey>, DeskError> {
        let duration = parse_duration(duration_text).map_err(|e| DeskError::Invalid(e.to_string()))?;
        let count = count.clamp(1, MAX_KEYS_PER_BATCH);
        let plan = plan
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| duration_text.trim().to_lowercase());
        let now = self.clock.now();

        let issued = self.keys.modify(|keys| {
            let mut rng = rand::rng();
            let mut issued = Vec::with_capacity(count);
            while issued.len() < count {
                let code = generate_code(&mut rng);
                if keys.contains_key(&code) {
                    continue;
                }
                let key = LicenseKey::new(code.clone(), plan.clone(), duration, created_by, now);
                keys.insert(code, key.clone());
                issued.push(key);
            }
            issued
        });

        log_soft_failure(self.keys.commit().await, self.keys.name());
        info!(count, plan = %plan, created_by = ?created_by, "license keys issued");
        Ok(issued)
    }

    /// Keys newest first, for the owner's audit view.
    pub fn list_keys(&self, include_used: bool) -> Vec<LicenseKey> {
        let mut keys: Vec<LicenseKey> = self
            .keys
            .entries()
            .into_iter()
            .map(|(_, key)| key)
            .filter(|key| include_used || !key.used)
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::clock::SystemClock;
    use crate::helpers::scheduler::ManualScheduler;
    use crate::helpers::store::{MemoryBackend, WritePolicy, PREMIUM_KEYS};
    use regex::Regex;
    use std::time::Duration;

    async fn issuer() -> (KeyIssuer, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let keys = Repository::open(
            PREMIUM_KEYS,
            backend.clone(),
            Arc::new(ManualScheduler::new()),
            WritePolicy::Immediate,
            Duration::from_secs(30),
        )
        .await;
        (KeyIssuer::new(keys, Arc::new(SystemClock)), backend)
    }

    #[tokio::test]
    async fn keys_have_the_expected_shape() {
        let (issuer, backend) = issuer().await;
        let keys = issuer.generate(None, "15d", 3, Some(7)).await.unwrap();

        let shape = Regex::new(r"^TKT-[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$").unwrap();
        assert_eq!(keys.len(), 3);
        for key in &keys {
            assert!(shape.is_match(&key.key), "{}", key.key);
            assert_eq!(key.plan, "15d");
            assert_eq!(key.duration_ms, Some(1_296_000_000));
            assert_eq!(key.duration_days, Some(15));
            assert!(!key.used);
        }
        let doc = backend.doc(PREMIUM_KEYS).unwrap();
        assert_eq!(doc.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn batch_size_is_clamped() {
        let (issuer, _) = issuer().await;
        assert_eq!(issuer.generate(Some("Gold"), "1m", 0, None).await.unwrap().len(), 1);
        assert_eq!(issuer.generate(Some("Gold"), "1m", 500, None).await.unwrap().len(), 25);
        assert_eq!(issuer.list_keys(false).len(), 26);
    }

    #[tokio::test]
    async fn bad_duration_issues_nothing() {
        let (issuer, backend) = issuer().await;
        assert!(matches!(issuer.generate(None, "", 5, None).await, Err(DeskError::Invalid(_))));
        assert!(matches!(issuer.generate(None, "forever", 5, None).await, Err(DeskError::Invalid(_))));
        assert_eq!(backend.writes(), 0);
    }
}
