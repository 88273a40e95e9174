use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::snowflake;

/// A single-use premium activation code as stored in `premiumKeys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKey {
    pub key: String,
    pub plan: String,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Written for tooling that predates `durationMs`.
    #[serde(default)]
    pub duration_days: Option<i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "snowflake::option", default)]
    pub created_by: Option<u64>,
    #[serde(default)]
    pub used: bool,
    #[serde(with = "snowflake::option", default)]
    pub used_by_guild_id: Option<u64>,
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub used_at: Option<DateTime<Utc>>,
}

impl LicenseKey {
    pub fn new(key: String, plan: String, duration: Duration, created_by: Option<u64>, now: DateTime<Utc>) -> Self {
        Self {
            key,
            plan,
            duration_ms: Some(duration.num_milliseconds()),
            duration_days: Some(duration.num_days()),
            created_at: now,
            created_by,
            used: false,
            used_by_guild_id: None,
            used_at: None,
        }
    }

    /// Legacy keys only carry whole days.
    pub fn duration(&self) -> Duration {
        match (self.duration_ms, self.duration_days) {
            (Some(ms), _) if ms > 0 => Duration::milliseconds(ms),
            (_, Some(days)) if days > 0 => Duration::days(days),
            _ => Duration::zero(),
        }
    }

    pub fn mark_used(&mut self, guild_id: u64, now: DateTime<Utc>) {
        self.used = true;
        self.used_by_guild_id = Some(guild_id);
        self.used_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_day_keys_still_carry_a_duration() {
        let key: LicenseKey = serde_json::from_value(json!({
            "key": "TKT-AAAA-BBBB-CCCC",
            "plan": "1m",
            "durationDays": 30,
            "createdAt": 1_700_000_000_000_i64,
            "used": false
        }))
        .unwrap();
        assert_eq!(key.duration(), Duration::days(30));
        assert_eq!(key.created_by, None);
    }

    #[test]
    fn mark_used_records_guild_and_time() {
        let now = Utc::now();
        let mut key = LicenseKey::new("K".into(), "15d".into(), Duration::days(15), Some(1), now);
        key.mark_used(42, now);
        assert!(key.used);
        assert_eq!(key.used_by_guild_id, Some(42));
        assert_eq!(key.used_at, Some(now));
    }
}
