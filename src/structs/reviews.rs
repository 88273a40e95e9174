use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores for one staff member, or the global service bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingBucket {
    pub scores: Vec<u8>,
    pub count: usize,
    pub avg: f64,
}

impl RatingBucket {
    pub fn record(&mut self, score: u8) {
        self.scores.push(score);
        self.count = self.scores.len();
        let sum: u64 = self.scores.iter().map(|s| u64::from(*s)).sum();
        self.avg = round2(sum as f64 / self.count as f64);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatingKind {
    /// The staff member who handled a trade.
    Trade,
    /// The service as a whole.
    Service,
}

impl RatingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingKind::Trade => "trade",
            RatingKind::Service => "service",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trade" => Some(RatingKind::Trade),
            "service" => Some(RatingKind::Service),
            _ => None,
        }
    }
}

impl fmt::Display for RatingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key into `ratedTickets`.
pub fn dedup_key(ticket_id: u64, rater_id: u64, kind: RatingKind) -> String {
    format!("{}:{}:{}", ticket_id, rater_id, kind)
}

pub const SERVICE_SUBJECT: &str = "global";

/// A rating button press, carried in the control id as
/// `rate:<kind>:<ticket>:<subject>:<score>`. Service votes use `global`
/// as the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingVote {
    pub kind: RatingKind,
    pub ticket_id: u64,
    pub subject: Option<u64>,
    pub score: u8,
}

impl RatingVote {
    pub fn control_id(&self) -> String {
        let subject = match self.subject {
            Some(id) => id.to_string(),
            None => SERVICE_SUBJECT.to_string(),
        };
        format!("rate:{}:{}:{}:{}", self.kind, self.ticket_id, subject, self.score)
    }

    pub fn parse(control_id: &str) -> Option<Self> {
        let mut parts = control_id.split(':');
        if parts.next()? != "rate" {
            return None;
        }
        let kind = RatingKind::parse(parts.next()?)?;
        let ticket_id = parts.next()?.parse().ok()?;
        let subject = match parts.next()? {
            SERVICE_SUBJECT => None,
            raw => Some(raw.parse().ok()?),
        };
        let score = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { kind, ticket_id, subject, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_control_ids() {
        let vote = RatingVote { kind: RatingKind::Trade, ticket_id: 5, subject: Some(7), score: 4 };
        assert_eq!(vote.control_id(), "rate:trade:5:7:4");
        assert_eq!(RatingVote::parse("rate:trade:5:7:4"), Some(vote));
        assert_eq!(
            RatingVote::parse("rate:service:5:global:2").map(|v| v.subject),
            Some(None)
        );
        assert_eq!(RatingVote::parse("rate:trade:5:7"), None);
        assert_eq!(RatingVote::parse("ticket:claim"), None);
    }

    #[test]
    fn average_is_rounded_to_two_places() {
        let mut bucket = RatingBucket::default();
        for score in [5, 4, 4] {
            bucket.record(score);
        }
        assert_eq!(bucket.count, 3);
        assert_eq!(bucket.avg, 4.33);
    }
}
