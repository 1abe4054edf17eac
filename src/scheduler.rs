//! Recurring ingestion jobs on the UTC wall clock.
//!
//! Each job runs in its own spawned task; individual fetch failures are
//! logged and never halt the loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::fetch::{floor_to_slot, Fetcher};
use crate::models::Collector;

/// Slots in a 24-hour window at 15-minute cadence.
const DAILY_SLOTS: i64 = 96;

pub fn start_realtime_job(fetcher: Arc<Fetcher>, interval_min: u64) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_min.max(1) * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Realtime job started - interval_min={}", interval_min);
        loop {
            ticker.tick().await;
            let slot = floor_to_slot(Utc::now());
            match fetcher.fetch_and_process(slot).await {
                Ok(outcome) => info!(
                    "Realtime job completed - job_type={:?}, date={}, rows={}",
                    outcome.job_type, outcome.date, outcome.rows
                ),
                Err(e) => warn!("Realtime job failed - slot={}, error={:#}", slot, e),
            }
        }
    });
}

pub fn start_daily_job(fetcher: Arc<Fetcher>, aggregator: Aggregator, daily_hour_utc: u32) {
    tokio::spawn(async move {
        info!("Daily job started - hour_utc={:02}:00", daily_hour_utc);
        loop {
            sleep(until_next_hour(daily_hour_utc)).await;
            run_daily_rollup(&fetcher, &aggregator).await;
        }
    });
}

/// Fetch the last 96 completed 15-minute slots sequentially (bounding
/// memory) and aggregate them under the current UTC date.
pub async fn run_daily_rollup(fetcher: &Fetcher, aggregator: &Aggregator) {
    let started = Instant::now();
    let date = Utc::now().date_naive();
    let newest = floor_to_slot(Utc::now());

    let mut collectors: Vec<Collector> = Vec::new();
    let mut failures = 0usize;
    for k in 1..=DAILY_SLOTS {
        let slot = newest - ChronoDuration::minutes(15 * k);
        match fetcher.fetch_slot_collector(slot).await {
            Ok(collector) => collectors.push(collector),
            Err(e) => {
                failures += 1;
                warn!("Daily rollup slot failed - slot={}, error={:#}", slot, e);
            }
        }
    }
    info!(
        "Daily rollup fetch completed - date={}, slots_ok={}, slots_failed={}, duration={:.2}s",
        date,
        collectors.len(),
        failures,
        started.elapsed().as_secs_f32()
    );

    if collectors.is_empty() {
        warn!("Daily rollup skipped - no slot data for {}", date);
        return;
    }
    if let Err(e) = aggregator.aggregate_daily(collectors, date, None).await {
        warn!("Daily rollup aggregation failed - date={}, error={:#}", date, e);
    }
}

fn until_next_hour(hour_utc: u32) -> Duration {
    let now = Utc::now();
    let today_run = now
        .date_naive()
        .and_hms_opt(hour_utc.min(23), 0, 0)
        .expect("valid rollup hour")
        .and_utc();
    let next = if today_run > now {
        today_run
    } else {
        today_run + ChronoDuration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_run_is_within_a_day() {
        for hour in [0, 6, 12, 23] {
            let wait = until_next_hour(hour);
            assert!(wait <= Duration::from_secs(24 * 60 * 60));
            assert!(wait > Duration::ZERO);
        }
    }
}
