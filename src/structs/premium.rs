use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::guild_config::normalize_role_ids;
use super::snowflake::{self, lenient};
use super::ticket::TicketKind;

pub const MAX_AUTO_CLOSE_MINUTES: u32 = 1440;
const MAX_CLOSE_REASONS: usize = 25;
const MAX_CLOSE_REASON_LEN: usize = 100;
const MAX_TEMPLATE_LEN: usize = 100;
const MAX_WELCOME_LEN: usize = 2000;
const MAX_BRAND_NAME_LEN: usize = 80;

/// Key-wise merge of a typed patch into a value. Nested structures merge
/// recursively; lists and scalars are replaced.
pub trait Merge {
    type Patch;

    fn merge(&mut self, patch: Self::Patch);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PremiumState {
    #[serde(deserialize_with = "lenient")]
    pub is_premium: bool,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(with = "millis", skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(with = "expiry", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub branding: Branding,
    #[serde(deserialize_with = "lenient")]
    pub features: Features,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Branding {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub accent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Features {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ticket_name_template: Option<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub pings: Pings,
    #[serde(deserialize_with = "lenient")]
    pub transcripts: Transcripts,
    #[serde(deserialize_with = "lenient")]
    pub auto_close_minutes: u32,
    #[serde(deserialize_with = "lenient")]
    pub close_reasons: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub claim_auto_tag: bool,
    #[serde(deserialize_with = "lenient")]
    pub priority: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pings {
    #[serde(deserialize_with = "lenient")]
    pub support: PingConfig,
    #[serde(deserialize_with = "lenient")]
    pub trade: PingConfig,
}

impl Pings {
    pub fn for_kind(&self, kind: TicketKind) -> &PingConfig {
        match kind {
            TicketKind::Support => &self.support,
            TicketKind::Trade => &self.trade,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    #[serde(with = "snowflake::set")]
    pub roles: BTreeSet<u64>,
    #[serde(deserialize_with = "lenient")]
    pub here: bool,
    #[serde(deserialize_with = "lenient")]
    pub everyone: bool,
}

impl PingConfig {
    /// Role mentions followed by the broadcast tokens; `@here` when nothing
    /// is configured.
    pub fn mention(&self) -> String {
        let mut parts: Vec<String> = self.roles.iter().map(|id| format!("<@&{}>", id)).collect();
        if self.here {
            parts.push("@here".to_string());
        }
        if self.everyone {
            parts.push("@everyone".to_string());
        }
        if parts.is_empty() {
            DEFAULT_PING.to_string()
        } else {
            parts.join(" ")
        }
    }
}

pub const DEFAULT_PING: &str = "@here";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transcripts {
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(with = "snowflake::option", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
}

/// Timestamps are written as epoch milliseconds. Reads also accept a
/// millisecond string or an RFC 3339 string.
mod millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(at: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => s.serialize_i64(at.timestamp_millis()),
            None => s.serialize_none(),
        }
    }

    pub(super) fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(ms) => Utc.timestamp_millis_opt(ms).single(),
                    Err(_) => DateTime::parse_from_rfc3339(s).ok().map(|at| at.with_timezone(&Utc)),
                }
            }
            _ => None,
        }
    }

    /// Junk reads as absent.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(parse))
    }
}

/// Like `millis`, but an expiry that is present and unreadable becomes the
/// epoch so the grant counts as expired. Only `null` or a missing field
/// means no expiry.
mod expiry {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(at: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        super::millis::serialize(at, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(value) => Some(super::millis::parse(&value).unwrap_or_default()),
        })
    }
}

impl PremiumState {
    /// True when a recorded expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn accent_colour(&self) -> Option<u32> {
        self.branding
            .accent
            .as_deref()
            .and_then(|accent| u32::from_str_radix(accent.trim_start_matches('#'), 16).ok())
    }

    /// Drops whatever a hand-edited or older document holds that the
    /// features can't honour.
    pub fn sanitize(&mut self) {
        let branding = &mut self.branding;
        branding.name = clean_text(branding.name.take(), MAX_BRAND_NAME_LEN);
        branding.accent = branding.accent.take().and_then(|a| normalize_accent(&a));
        branding.icon_url = branding.icon_url.take().filter(|url| is_http_url(url));

        let features = &mut self.features;
        features.auto_close_minutes = features.auto_close_minutes.min(MAX_AUTO_CLOSE_MINUTES);
        features.ticket_name_template = clean_text(features.ticket_name_template.take(), MAX_TEMPLATE_LEN);
        features.welcome_message = clean_text(features.welcome_message.take(), MAX_WELCOME_LEN);
        features.close_reasons = clean_reasons(std::mem::take(&mut features.close_reasons));
    }
}

/// `#RRGGBB` or `RRGGBB`, stored as lowercase `#rrggbb`.
pub fn normalize_accent(raw: &str) -> Option<String> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", hex.to_ascii_lowercase()))
    } else {
        None
    }
}

pub fn is_http_url(raw: &str) -> bool {
    let raw = raw.trim();
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"));
    rest.is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/') && !rest.contains(char::is_whitespace))
}

fn clean_text(text: Option<String>, max_chars: usize) -> Option<String> {
    text.map(|t| t.trim().chars().take(max_chars).collect::<String>())
        .filter(|t| !t.is_empty())
}

fn clean_reasons(reasons: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for reason in reasons {
        let Some(reason) = clean_text(Some(reason), MAX_CLOSE_REASON_LEN) else {
            continue;
        };
        if !cleaned.contains(&reason) {
            cleaned.push(reason);
        }
        if cleaned.len() == MAX_CLOSE_REASONS {
            break;
        }
    }
    cleaned
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PremiumPatch {
    pub is_premium: Option<bool>,
    pub plan: Option<Option<String>>,
    pub activated_at: Option<Option<DateTime<Utc>>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub branding: Option<BrandingPatch>,
    pub features: Option<FeaturesPatch>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandingPatch {
    pub name: Option<Option<String>>,
    pub icon_url: Option<Option<String>>,
    pub accent: Option<Option<String>>,
}

impl BrandingPatch {
    /// Checks the accent colour and icon url before anything is merged.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Some(accent)) = &self.accent {
            if !accent.trim().is_empty() && normalize_accent(accent).is_none() {
                return Err(format!("`{}` is not a 6 digit hex colour", accent));
            }
        }
        if let Some(Some(url)) = &self.icon_url {
            if !url.trim().is_empty() && !is_http_url(url) {
                return Err(format!("`{}` is not an http(s) url", url));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeaturesPatch {
    pub ticket_name_template: Option<Option<String>>,
    pub welcome_message: Option<Option<String>>,
    pub pings: Option<PingsPatch>,
    pub transcripts: Option<TranscriptsPatch>,
    pub auto_close_minutes: Option<u32>,
    pub close_reasons: Option<Vec<String>>,
    pub claim_auto_tag: Option<bool>,
    pub priority: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingsPatch {
    pub support: Option<PingPatch>,
    pub trade: Option<PingPatch>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingPatch {
    pub roles: Option<Vec<String>>,
    pub here: Option<bool>,
    pub everyone: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptsPatch {
    pub enabled: Option<bool>,
    pub channel_id: Option<Option<u64>>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl Merge for PremiumState {
    type Patch = PremiumPatch;

    fn merge(&mut self, patch: PremiumPatch) {
        set(&mut self.is_premium, patch.is_premium);
        set(&mut self.plan, patch.plan);
        set(&mut self.activated_at, patch.activated_at);
        set(&mut self.expires_at, patch.expires_at);
        if let Some(branding) = patch.branding {
            self.branding.merge(branding);
        }
        if let Some(features) = patch.features {
            self.features.merge(features);
        }
    }
}

impl Merge for Branding {
    type Patch = BrandingPatch;

    fn merge(&mut self, patch: BrandingPatch) {
        set(&mut self.name, patch.name);
        set(&mut self.icon_url, patch.icon_url);
        set(&mut self.accent, patch.accent);
    }
}

impl Merge for Features {
    type Patch = FeaturesPatch;

    fn merge(&mut self, patch: FeaturesPatch) {
        set(&mut self.ticket_name_template, patch.ticket_name_template);
        set(&mut self.welcome_message, patch.welcome_message);
        if let Some(pings) = patch.pings {
            self.pings.merge(pings);
        }
        if let Some(transcripts) = patch.transcripts {
            self.transcripts.merge(transcripts);
        }
        set(&mut self.auto_close_minutes, patch.auto_close_minutes);
        set(&mut self.close_reasons, patch.close_reasons);
        set(&mut self.claim_auto_tag, patch.claim_auto_tag);
        set(&mut self.priority, patch.priority);
    }
}

impl Merge for Pings {
    type Patch = PingsPatch;

    fn merge(&mut self, patch: PingsPatch) {
        if let Some(support) = patch.support {
            self.support.merge(support);
        }
        if let Some(trade) = patch.trade {
            self.trade.merge(trade);
        }
    }
}

impl Merge for PingConfig {
    type Patch = PingPatch;

    fn merge(&mut self, patch: PingPatch) {
        if let Some(roles) = patch.roles {
            self.roles = normalize_role_ids(roles);
        }
        set(&mut self.here, patch.here);
        set(&mut self.everyone, patch.everyone);
    }
}

impl Merge for Transcripts {
    type Patch = TranscriptsPatch;

    fn merge(&mut self, patch: TranscriptsPatch) {
        set(&mut self.enabled, patch.enabled);
        set(&mut self.channel_id, patch.channel_id);
    }
}
