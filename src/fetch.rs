//! Locate, download and decompress GDELT GKG artifacts.
//!
//! The realtime path tries the 15-minute archive first and degrades through
//! the daily rollup for today, then yesterday. Terminal failure is returned
//! to the caller, which logs and moves on; nothing here panics the scheduler.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::collect::{self, ColumnIndices};
use crate::config::Config;
use crate::models::Collector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Realtime,
    Daily,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub job_type: JobType,
    pub date: NaiveDate,
    pub rows: u64,
}

pub struct Fetcher {
    client: Client,
    config: Arc<Config>,
    aggregator: Aggregator,
}

impl Fetcher {
    pub fn new(config: Arc<Config>, aggregator: Aggregator) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Fetcher { client, config, aggregator })
    }

    /// 15-minute archive name, minutes floored to a multiple of 15.
    pub fn realtime_filename(instant: DateTime<Utc>) -> String {
        let slot = floor_to_slot(instant);
        format!(
            "{:04}{:02}{:02}{:02}{:02}00.gkg.csv.zip",
            slot.year(),
            slot.month(),
            slot.day(),
            slot.hour(),
            slot.minute()
        )
    }

    pub fn daily_filename(date: NaiveDate) -> String {
        format!("{:04}{:02}{:02}.gkg.csv.zip", date.year(), date.month(), date.day())
    }

    fn realtime_url(&self, instant: DateTime<Utc>) -> String {
        format!(
            "{}/{}",
            self.config.gdelt_base_url.trim_end_matches('/'),
            Self::realtime_filename(instant)
        )
    }

    fn daily_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}",
            self.config.gdelt_daily_base_url.trim_end_matches('/'),
            Self::daily_filename(date)
        )
    }

    /// Ingest the 15-minute archive for `instant`, falling back through the
    /// daily rollups for today and yesterday.
    pub async fn fetch_and_process(&self, instant: DateTime<Utc>) -> Result<FetchOutcome> {
        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);
        match self.fetch_collector(&self.realtime_url(instant), timeout).await {
            Ok(collector) => {
                let rows = collector.rows;
                self.aggregator
                    .aggregate_from_file(&collector, floor_to_slot(instant), None)
                    .await?;
                return Ok(FetchOutcome {
                    job_type: JobType::Realtime,
                    date: instant.date_naive(),
                    rows,
                });
            }
            Err(e) => {
                warn!(
                    "Realtime fetch failed, trying daily fallback - instant={}, error={:#}",
                    instant, e
                );
            }
        }

        for offset in 0..=1 {
            let date = instant.date_naive() - chrono::Duration::days(offset);
            match self.ingest_daily(date).await {
                Ok(rows) => {
                    info!("Daily fallback succeeded - date={}, rows={}", date, rows);
                    return Ok(FetchOutcome { job_type: JobType::Daily, date, rows });
                }
                Err(e) => warn!("Daily fallback failed - date={}, error={:#}", date, e),
            }
        }

        bail!("All fetch attempts failed for {}", instant)
    }

    /// Fetch and aggregate the daily rollup file for `date`. Also the
    /// baseline backfill path of the scorer and the admin re-ingest.
    pub async fn ingest_daily(&self, date: NaiveDate) -> Result<u64> {
        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);
        let collector = self.fetch_collector(&self.daily_url(date), timeout).await?;
        let rows = collector.rows;
        self.aggregator.aggregate_daily(vec![collector], date, None).await?;
        Ok(rows)
    }

    /// Fetch one 15-minute slot into a collector without persisting anything
    /// (the daily rollup job merges these itself).
    pub async fn fetch_slot_collector(&self, slot: DateTime<Utc>) -> Result<Collector> {
        let timeout = Duration::from_secs(self.config.daily_fetch_timeout_secs);
        self.fetch_collector(&self.realtime_url(slot), timeout).await
    }

    async fn fetch_collector(&self, url: &str, timeout: Duration) -> Result<Collector> {
        let start = Instant::now();
        debug!("Fetching artifact - url={}", url);

        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("Request failed for {}", url))?;
        let resp = resp
            .error_for_status()
            .with_context(|| format!("HTTP error for {}", url))?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("Reading body of {}", url))?;

        let indices = self.config.columns;
        let collector = tokio::task::spawn_blocking(move || unzip_and_collect(bytes, indices))
            .await
            .context("Decompress task panicked")??;

        if collector.is_empty() {
            warn!("Artifact yielded no entities - url={}", url);
        }
        info!(
            "Artifact processed - url={}, duration={:.2}s, rows={}, row_errors={}",
            url,
            start.elapsed().as_secs_f32(),
            collector.rows,
            collector.row_errors
        );
        Ok(collector)
    }
}

/// Floor an instant to its 15-minute GDELT publication slot.
pub fn floor_to_slot(instant: DateTime<Utc>) -> DateTime<Utc> {
    let minute = instant.minute() - instant.minute() % 15;
    instant
        .with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("floored slot components are in range")
}

fn unzip_and_collect(bytes: Bytes, indices: ColumnIndices) -> Result<Collector> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("Opening zip archive")?;
    if archive.is_empty() {
        bail!("Archive contains no entries");
    }
    let entry = archive.by_index(0).context("Reading archive entry")?;
    collect::read_records(entry, indices)
}
