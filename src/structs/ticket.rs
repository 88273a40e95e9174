use std::fmt;
use std::str::FromStr;

pub const CLAIMED_PREFIX: &str = "claimed-";
const MAX_NAME_LEN: usize = 90;
pub const DEFAULT_NAME_TEMPLATE: &str = "{type}-{user}";

/// Channel name prefixes that mark a ticket even after a rename.
pub const TICKET_NAME_PREFIXES: [&str; 5] = ["ticket-", "support-", "trade-", "mm-", CLAIMED_PREFIX];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketKind {
    Support,
    Trade,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Support => "support",
            TicketKind::Trade => "trade",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TicketKind::Support => "Support Ticket",
            TicketKind::Trade => "Trade Ticket",
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "support" => Ok(TicketKind::Support),
            "trade" | "mm" | "middleman" => Ok(TicketKind::Trade),
            other => Err(format!("unknown ticket type `{}`", other)),
        }
    }
}

/// Ticket state carried in the channel topic as `opened:<id>;claimed:<id|null>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketTopic {
    pub opened_by: u64,
    pub claimed_by: Option<u64>,
}

impl TicketTopic {
    pub fn new(opened_by: u64) -> Self {
        Self { opened_by, claimed_by: None }
    }

    /// Reads a topic. Unknown segments are ignored; a topic without an
    /// `opened:` segment is not a ticket topic.
    pub fn parse(topic: &str) -> Option<Self> {
        let mut opened_by = None;
        let mut claimed_by = None;

        for segment in topic.split(';') {
            let Some((key, value)) = segment.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "opened" => opened_by = value.parse::<u64>().ok(),
                "claimed" => claimed_by = value.parse::<u64>().ok(),
                _ => {}
            }
        }

        opened_by.map(|opened_by| Self { opened_by, claimed_by })
    }

    pub fn serialize(&self) -> String {
        match self.claimed_by {
            Some(staff) => format!("opened:{};claimed:{}", self.opened_by, staff),
            None => format!("opened:{};claimed:null", self.opened_by),
        }
    }
}

impl fmt::Display for TicketTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Renders the ticket-name template and squeezes it into a safe channel name.
pub fn render_channel_name(template: Option<&str>, user: &str, kind: TicketKind, user_id: u64) -> String {
    let template = template
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_NAME_TEMPLATE);

    let rendered = template
        .replace("{user}", user)
        .replace("{type}", kind.as_str())
        .replace("{id}", &user_id.to_string());

    let sanitized = sanitize_channel_name(&rendered);
    if sanitized.is_empty() {
        "ticket".to_string()
    } else {
        sanitized
    }
}

pub fn sanitize_channel_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            continue;
        }
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }

    out.truncate(MAX_NAME_LEN);
    out.trim_end_matches('-').to_string()
}

pub fn with_claimed_prefix(name: &str) -> String {
    if name.starts_with(CLAIMED_PREFIX) {
        return name.to_string();
    }
    format!("{}{}", CLAIMED_PREFIX, name).chars().take(MAX_NAME_LEN).collect()
}

pub fn without_claimed_prefix(name: &str) -> Option<&str> {
    name.strip_prefix(CLAIMED_PREFIX).filter(|rest| !rest.is_empty())
}

pub fn has_ticket_prefix(name: &str) -> bool {
    TICKET_NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
