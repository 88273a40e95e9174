use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::helpers::gateway::Gateway;
use crate::helpers::scheduler::{Job, ScheduledTask, Scheduler};
use crate::helpers::tickets::{Actor, TicketEngine};
use crate::structs::premium::MAX_AUTO_CLOSE_MINUTES;
use crate::structs::time_parse::human_readable;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `None` when auto-close is off.
pub fn clamp_minutes(minutes: u32) -> Option<u32> {
    (minutes > 0).then(|| minutes.clamp(1, MAX_AUTO_CLOSE_MINUTES))
}

/// Pending auto-close timers, one per ticket channel. Memory only: a
/// restart forgets every timer.
#[derive(Default)]
pub struct AutoCloseTimers {
    timers: Mutex<HashMap<u64, ScheduledTask>>,
}

impl AutoCloseTimers {
    pub fn arm(&self, engine: &Arc<TicketEngine>, scheduler: &dyn Scheduler, channel_id: u64, minutes: u32) {
        let delay = Duration::from_secs(u64::from(minutes) * 60);
        let task = scheduler.schedule(delay, auto_close_job(Arc::clone(engine), channel_id, minutes));
        if let Some(previous) = lock(&self.timers).insert(channel_id, task) {
            previous.cancel();
        }
        debug!(channel_id, minutes, "auto-close armed");
    }

    pub fn disarm(&self, channel_id: u64) {
        if let Some(task) = lock(&self.timers).remove(&channel_id) {
            task.cancel();
        }
    }
}

fn auto_close_job(engine: Arc<TicketEngine>, channel_id: u64, minutes: u32) -> Job {
    Box::pin(async move {
        let after = human_readable(chrono::Duration::minutes(i64::from(minutes)));
        let reason = format!("Automatically closed after {}", after);

        match engine.close(channel_id, Actor::System, Some(reason)).await {
            Ok(report) if report.channel_gone => debug!(channel_id, "auto-close fired for a channel that is gone"),
            Ok(_) => info!(channel_id, "ticket auto-closed"),
            Err(e) => warn!(channel_id, error = %e, "auto-close failed"),
        }
    })
}

/// Deletes a closed ticket once its grace period is over and releases it
/// from the closing set.
pub fn deletion_job(gateway: Arc<dyn Gateway>, closing: Arc<Mutex<HashSet<u64>>>, channel_id: u64) -> Job {
    Box::pin(async move {
        match gateway.delete_channel(channel_id).await {
            Ok(()) => info!(channel_id, "ticket channel deleted"),
            Err(e) => warn!(channel_id, error = %e, "failed to delete ticket channel"),
        }
        lock(&closing).remove(&channel_id);
    })
}
