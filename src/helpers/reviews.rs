use poise::futures_util::lock::Mutex;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{log_soft_failure, DeskError};
use crate::helpers::store::Repository;
use crate::structs::reviews::{dedup_key, RatingBucket, RatingKind, RatingVote, SERVICE_SUBJECT};

pub type Buckets = BTreeMap<String, RatingBucket>;

/// Staff and service ratings plus the record of who rated what.
pub struct RatingLedger {
    reviews: Repository<Buckets>,
    rated: Repository<bool>,
    ledger_lock: Mutex<()>,
}

fn valid_score(score: u8) -> Result<u8, DeskError> {
    if (1..=5).contains(&score) {
        Ok(score)
    } else {
        Err(DeskError::Invalid(format!("rating must be between 1 and 5, got {}", score)))
    }
}

impl RatingLedger {
    pub fn new(reviews: Repository<Buckets>, rated: Repository<bool>) -> Self {
        Self {
            reviews,
            rated,
            ledger_lock: Mutex::new(()),
        }
    }

    fn append(&self, kind: RatingKind, subject: &str, score: u8) -> RatingBucket {
        self.reviews.modify(|sections| {
            let bucket = sections
                .entry(kind.as_str().to_string())
                .or_default()
                .entry(subject.to_string())
                .or_default();
            bucket.record(score);
            bucket.clone()
        })
    }

    pub async fn record_staff_rating(&self, staff_id: u64, score: u8) -> Result<RatingBucket, DeskError> {
        let score = valid_score(score)?;
        let bucket = self.append(RatingKind::Trade, &staff_id.to_string(), score);
        log_soft_failure(self.reviews.commit().await, self.reviews.name());
        Ok(bucket)
    }

    pub async fn record_service_rating(&self, score: u8) -> Result<RatingBucket, DeskError> {
        let score = valid_score(score)?;
        let bucket = self.append(RatingKind::Service, SERVICE_SUBJECT, score);
        log_soft_failure(self.reviews.commit().await, self.reviews.name());
        Ok(bucket)
    }

    pub fn has_rated(&self, ticket_id: u64, rater_id: u64, kind: RatingKind) -> bool {
        self.rated.get(&dedup_key(ticket_id, rater_id, kind)).unwrap_or(false)
    }

    pub async fn mark_rated(&self, ticket_id: u64, rater_id: u64, kind: RatingKind) {
        let key = dedup_key(ticket_id, rater_id, kind);
        log_soft_failure(self.rated.put(key, true).await, self.rated.name());
    }

    /// Checks the dedup record, appends the score and marks the vote as one
    /// step. A trade vote without a subject is rejected.
    pub async fn rate(&self, rater_id: u64, vote: RatingVote) -> Result<RatingBucket, DeskError> {
        let score = valid_score(vote.score)?;
        let subject = match (vote.kind, vote.subject) {
            (RatingKind::Trade, Some(staff)) => staff.to_string(),
            (RatingKind::Trade, None) => {
                return Err(DeskError::Invalid("trade ratings need a staff member".to_string()))
            }
            (RatingKind::Service, _) => SERVICE_SUBJECT.to_string(),
        };

        let _guard = self.ledger_lock.lock().await;
        if self.has_rated(vote.ticket_id, rater_id, vote.kind) {
            return Err(DeskError::AlreadyRated);
        }

        let bucket = self.append(vote.kind, &subject, score);
        self.rated
            .modify(|rated| rated.insert(dedup_key(vote.ticket_id, rater_id, vote.kind), true));
        log_soft_failure(self.reviews.commit().await, self.reviews.name());
        log_soft_failure(self.rated.commit().await, self.rated.name());

        info!(ticket_id = vote.ticket_id, rater_id, kind = %vote.kind, score, "rating recorded");
        Ok(bucket)
    }

    pub fn staff_summary(&self, staff_id: u64) -> Option<RatingBucket> {
        self.reviews
            .get(RatingKind::Trade.as_str())
            .and_then(|staff| staff.get(&staff_id.to_string()).cloned())
    }

    pub fn service_summary(&self) -> Option<RatingBucket> {
        self.reviews
            .get(RatingKind::Service.as_str())
            .and_then(|service| service.get(SERVICE_SUBJECT).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::scheduler::ManualScheduler;
    use crate::helpers::store::{MemoryBackend, WritePolicy, RATED_TICKETS, REVIEWS};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const TICKET: u64 = 900000000000000001;
    const RATER: u64 = 400000000000000001;
    const STAFF: u64 = 400000000000000002;

    async fn ledger() -> (RatingLedger, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let retry = Duration::from_secs(30);
        let reviews = Repository::open(REVIEWS, backend.clone(), scheduler.clone(), WritePolicy::Immediate, retry).await;
        let rated = Repository::open(RATED_TICKETS, backend.clone(), scheduler, WritePolicy::Immediate, retry).await;
        (RatingLedger::new(reviews, rated), backend)
    }

    fn trade_vote(score: u8) -> RatingVote {
        RatingVote { kind: RatingKind::Trade, ticket_id: TICKET, subject: Some(STAFF), score }
    }

    #[tokio::test]
    async fn duplicate_vote_leaves_ledger_unchanged() {
        let (ledger, backend) = ledger().await;

        let bucket = ledger.rate(RATER, trade_vote(4)).await.unwrap();
        assert_eq!((bucket.count, bucket.avg), (1, 4.0));
        assert!(ledger.has_rated(TICKET, RATER, RatingKind::Trade));

        let err = ledger.rate(RATER, trade_vote(1)).await.unwrap_err();
        assert!(matches!(err, DeskError::AlreadyRated));
        assert_eq!(ledger.staff_summary(STAFF).unwrap().scores, vec![4]);

        let doc = backend.doc(REVIEWS).unwrap();
        assert_eq!(doc["trade"][STAFF.to_string()]["count"], json!(1));
        assert_eq!(
            backend.doc(RATED_TICKETS).unwrap()[format!("{}:{}:trade", TICKET, RATER)],
            json!(true)
        );
    }

    #[tokio::test]
    async fn service_and_trade_votes_are_tracked_separately() {
        let (ledger, _) = ledger().await;
        ledger.rate(RATER, trade_vote(5)).await.unwrap();
        let service = RatingVote { kind: RatingKind::Service, ticket_id: TICKET, subject: None, score: 3 };
        ledger.rate(RATER, service).await.unwrap();

        assert_eq!(ledger.service_summary().unwrap().avg, 3.0);
        assert_eq!(ledger.staff_summary(STAFF).unwrap().avg, 5.0);
    }

    #[tokio::test]
    async fn scores_outside_range_are_rejected() {
        let (ledger, _) = ledger().await;
        assert!(matches!(ledger.rate(RATER, trade_vote(0)).await, Err(DeskError::Invalid(_))));
        assert!(matches!(ledger.record_service_rating(6).await, Err(DeskError::Invalid(_))));
        assert!(!ledger.has_rated(TICKET, RATER, RatingKind::Trade));
    }

    #[tokio::test]
    async fn direct_recording_updates_the_average() {
        let (ledger, _) = ledger().await;
        ledger.record_staff_rating(STAFF, 5).await.unwrap();
        let bucket = ledger.record_staff_rating(STAFF, 2).await.unwrap();
        assert_eq!(bucket.avg, 3.5);

        ledger.mark_rated(TICKET, RATER, RatingKind::Service).await;
        assert!(ledger.has_rated(TICKET, RATER, RatingKind::Service));
        assert!(!ledger.has_rated(TICKET, RATER, RatingKind::Trade));
    }
}
