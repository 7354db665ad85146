//! In-process job scheduler.
//!
//! Jobs are plain data: a name, a trigger, and an async handler. `run` gives
//! each job its own task whose loop awaits the handler to completion before
//! sleeping again, so a slow run delays the next tick instead of overlapping
//! it. Handler errors are logged and never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use futures::future::BoxFuture;

type Handler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// When a job fires.
#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// Immediately, then on a fixed interval.
    Every(Duration),
    /// Once a day at the given local wall-clock time.
    DailyAt { hour: u32, minute: u32 },
}

struct Job {
    name: &'static str,
    trigger: Trigger,
    handler: Handler,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. The handler factory is called once per tick.
    pub fn register<F>(&mut self, name: &'static str, trigger: Trigger, handler: F)
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.jobs.push(Job {
            name,
            trigger,
            handler: Arc::new(handler),
        });
    }

    /// Run all jobs until the future is dropped. Never returns on its own.
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            handles.push(tokio::spawn(run_job(job)));
        }
        futures::future::join_all(handles).await;
    }
}

async fn run_job(job: Job) {
    tracing::info!(job = job.name, trigger = ?job.trigger, "Scheduled job started");
    loop {
        match job.trigger {
            Trigger::Every(interval) => {
                tick(&job).await;
                tokio::time::sleep(interval).await;
            }
            Trigger::DailyAt { hour, minute } => {
                let wait = until_next_occurrence(Local::now(), hour, minute);
                tokio::time::sleep(wait).await;
                tick(&job).await;
            }
        }
    }
}

async fn tick(job: &Job) {
    if let Err(e) = (job.handler)().await {
        tracing::error!(job = job.name, error = %e, "Scheduled job failed");
    }
}

/// Time until the next local `hour:minute`, rolling to tomorrow when today's
/// slot has passed. A skipped wall-clock time (DST) resolves to the earliest
/// valid instant after it.
fn until_next_occurrence(now: DateTime<Local>, hour: u32, minute: u32) -> Duration {
    let mut candidate = now.date_naive().and_hms_opt(hour, minute, 0);
    let mut target = candidate.and_then(|naive| Local.from_local_datetime(&naive).earliest());
    if target.is_none_or(|t| t <= now) {
        candidate = (now.date_naive() + ChronoDuration::days(1)).and_hms_opt(hour, minute, 0);
        target = candidate.and_then(|naive| Local.from_local_datetime(&naive).earliest());
    }
    match target {
        Some(t) => (t - now).to_std().unwrap_or(Duration::from_secs(60)),
        // hour/minute out of range; retry in a minute rather than spin
        None => Duration::from_secs(60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_runs_immediately_then_on_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let c = count.clone();
        scheduler.register("tick", Trigger::Every(Duration::from_secs(60)), move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.abort();

        // t=0, t=60, t=120
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_keeps_running() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let c = count.clone();
        scheduler.register("flaky", Trigger::Every(Duration::from_secs(10)), move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always fails")
            })
        });

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(35)).await;
        handle.abort();

        assert!(count.load(Ordering::SeqCst) >= 3, "errors do not stop the loop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_never_overlaps() {
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let r = running.clone();
        let o = overlaps.clone();
        scheduler.register("slow", Trigger::Every(Duration::from_secs(1)), move || {
            let r = r.clone();
            let o = o.clone();
            Box::pin(async move {
                if r.fetch_add(1, Ordering::SeqCst) > 0 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                // Takes longer than the interval.
                tokio::time::sleep(Duration::from_secs(5)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.abort();

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_daily_wait_later_today() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap();
        let wait = until_next_occurrence(now, 2, 0);
        assert_eq!(wait, Duration::from_secs(3600));
    }

    #[test]
    fn test_daily_wait_rolls_to_tomorrow() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap();
        let wait = until_next_occurrence(now, 2, 0);
        assert_eq!(wait, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_daily_wait_invalid_time_does_not_spin() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(until_next_occurrence(now, 99, 0), Duration::from_secs(60));
    }
}
