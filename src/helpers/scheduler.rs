use poise::futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type Job = BoxFuture<'static, ()>;

/// Delayed fire-and-forget work. Nothing scheduled here survives a restart.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledTask;
}

/// Handle to a scheduled job. Cancelling after the job started has no effect.
#[derive(Clone, Default)]
pub struct ScheduledTask {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTask {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> ScheduledTask {
        let task = ScheduledTask::default();
        let handle = task.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !handle.is_cancelled() {
                job.await;
            }
        });
        task
    }
}

#[cfg(test)]
pub use manual::ManualScheduler;

#[cfg(test)]
mod manual {
    use super::*;
    use std::sync::Mutex;

    struct Pending {
        due: Duration,
        seq: u64,
        task: ScheduledTask,
        job: Job,
    }

    #[derive(Default)]
    struct Inner {
        now: Duration,
        seq: u64,
        jobs: Vec<Pending>,
    }

    /// Runs jobs only when a test moves time forward.
    #[derive(Default)]
    pub struct ManualScheduler {
        inner: Mutex<Inner>,
    }

    impl ManualScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Jobs that are scheduled and not cancelled.
        pub fn pending(&self) -> usize {
            let inner = self.inner.lock().unwrap();
            inner.jobs.iter().filter(|p| !p.task.is_cancelled()).count()
        }

        /// Moves time forward, running every job that falls due in order,
        /// including jobs scheduled by jobs that ran.
        pub async fn advance(&self, by: Duration) {
            let target = self.inner.lock().unwrap().now + by;
            loop {
                let next = {
                    let mut inner = self.inner.lock().unwrap();
                    let index = inner
                        .jobs
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.due <= target)
                        .min_by_key(|(_, p)| (p.due, p.seq))
                        .map(|(i, _)| i);
                    index.map(|i| {
                        let pending = inner.jobs.remove(i);
                        inner.now = inner.now.max(pending.due);
                        pending
                    })
                };
                match next {
                    Some(pending) if !pending.task.is_cancelled() => pending.job.await,
                    Some(_) => continue,
                    None => break,
                }
            }
            self.inner.lock().unwrap().now = target;
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, delay: Duration, job: Job) -> ScheduledTask {
            let task = ScheduledTask::default();
            let mut inner = self.inner.lock().unwrap();
            inner.seq += 1;
            let pending = Pending {
                due: inner.now + delay,
                seq: inner.seq,
                task: task.clone(),
                job,
            };
            inner.jobs.push(pending);
            task
        }
    }

    mod tests {
        use super::*;
        use std::sync::atomic::AtomicUsize;

        #[tokio::test]
        async fn runs_due_jobs_and_skips_cancelled_ones() {
            let scheduler = ManualScheduler::new();
            let runs = Arc::new(AtomicUsize::new(0));

            let counter = Arc::clone(&runs);
            scheduler.schedule(Duration::from_millis(100), Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            let counter = Arc::clone(&runs);
            let cancelled = scheduler.schedule(Duration::from_millis(50), Box::pin(async move {
                counter.fetch_add(10, Ordering::SeqCst);
            }));
            cancelled.cancel();

            scheduler.advance(Duration::from_millis(99)).await;
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            assert_eq!(scheduler.pending(), 1);

            scheduler.advance(Duration::from_millis(1)).await;
            assert_eq!(runs.load(Ordering::SeqCst), 1);
            assert_eq!(scheduler.pending(), 0);
        }
    }
}
