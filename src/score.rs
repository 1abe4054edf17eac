//! Composite novelty/volume scoring over a sliding daily baseline.
//!
//! Upstream data is noisy and baselines are frequently incomplete, so the
//! scorer degrades in stages: it backfills missing days best-effort, then
//! walks three scoring tiers until one yields a non-empty result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use futures::future::join_all;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::models::{Category, Keyword, Trend, TrendType};
use crate::store::TrendStore;
use crate::tokenize::{filter_noise, is_noise, is_numeric_vector};

/// Missing baseline days beyond this many degrade to fire-and-forget
/// backfill so long analyst windows never block a request unboundedly.
const AWAITED_BACKFILL_DAYS: usize = 31;

#[derive(Debug, Clone)]
pub struct ScoreParams {
    pub date: NaiveDate,
    pub category: Category,
    pub window_days: i64,
    pub top_n: usize,
}

impl ScoreParams {
    pub fn new(date: NaiveDate) -> Self {
        ScoreParams {
            date,
            category: Category::Themes,
            window_days: 7,
            top_n: 50,
        }
    }
}

pub struct Scorer {
    store: Arc<dyn TrendStore>,
    fetcher: Arc<Fetcher>,
    config: Arc<Config>,
}

impl Scorer {
    pub fn new(store: Arc<dyn TrendStore>, fetcher: Arc<Fetcher>, config: Arc<Config>) -> Self {
        Scorer { store, fetcher, config }
    }

    /// Score the given day against its baseline window and persist the
    /// resulting `ranked` trend. An empty current day yields `[]` and writes
    /// nothing.
    pub async fn score_trends(&self, params: ScoreParams) -> Result<Vec<Keyword>> {
        let started = Instant::now();
        let ScoreParams { date, category, window_days, top_n } = params;
        let window_days = window_days.max(1);

        self.ensure_baseline(date, window_days, category).await?;

        let current = match self.store.find_trend(TrendType::Daily, date, category).await? {
            Some(trend) if !trend.keywords.is_empty() => trend,
            _ => {
                debug!("No current daily trend - date={}, category={}", date, category);
                return Ok(Vec::new());
            }
        };

        let baseline_dates: Vec<NaiveDate> =
            (1..=window_days).map(|k| date - Duration::days(k)).collect();
        let baseline_trends = self
            .store
            .find_trends_in(TrendType::Daily, &baseline_dates, category)
            .await?;
        let mut baseline: HashMap<String, u64> = HashMap::new();
        for trend in &baseline_trends {
            for kw in &trend.keywords {
                *baseline.entry(kw.word.clone()).or_insert(0) += kw.count;
            }
        }

        let scored = run_tiers(&current.keywords, &baseline, window_days, top_n);
        if scored.is_empty() {
            info!("Scoring produced no results - date={}, category={}", date, category);
            return Ok(Vec::new());
        }

        let ranked = Trend {
            timestamp: Utc::now(),
            trend_type: TrendType::Ranked,
            date,
            category,
            keywords: scored.clone(),
        };
        self.store.upsert_trend(&ranked).await?;

        info!(
            "Scoring completed - date={}, category={}, window_days={}, keywords={}, baseline_days={}, duration={:.2}s",
            date,
            category,
            window_days,
            scored.len(),
            baseline_trends.len(),
            started.elapsed().as_secs_f32()
        );
        Ok(scored)
    }

    /// Re-ingest daily trends for any day of the window that is missing from
    /// the store. The first [`AWAITED_BACKFILL_DAYS`] run in bounded batches
    /// and are awaited; the remainder are spawned with errors swallowed.
    async fn ensure_baseline(
        &self,
        date: NaiveDate,
        window_days: i64,
        category: Category,
    ) -> Result<()> {
        let wanted: Vec<NaiveDate> = (0..=window_days).map(|k| date - Duration::days(k)).collect();
        let present: HashSet<NaiveDate> = self
            .store
            .find_trends_in(TrendType::Daily, &wanted, category)
            .await?
            .into_iter()
            .map(|t| t.date)
            .collect();
        let missing: Vec<NaiveDate> =
            wanted.into_iter().filter(|d| !present.contains(d)).collect();
        if missing.is_empty() {
            return Ok(());
        }

        let awaited_len = missing.len().min(AWAITED_BACKFILL_DAYS);
        info!(
            "Baseline backfill - category={}, missing_days={}, awaited={}",
            category,
            missing.len(),
            awaited_len
        );

        let (awaited, background) = missing.split_at(awaited_len);
        for batch in awaited.chunks(self.config.max_parallel_backfill.max(1)) {
            let fetches = batch.iter().map(|&day| self.fetcher.ingest_daily(day));
            for (day, result) in batch.iter().zip(join_all(fetches).await) {
                if let Err(e) = result {
                    warn!("Baseline day ingest failed - date={}, error={:#}", day, e);
                }
            }
        }
        for &day in background {
            let fetcher = Arc::clone(&self.fetcher);
            tokio::spawn(async move {
                if let Err(e) = fetcher.ingest_daily(day).await {
                    debug!("Background baseline ingest failed - date={}, error={:#}", day, e);
                }
            });
        }
        Ok(())
    }
}

/// Walk the scoring tiers: strict noise filtering, numeric-vector-only
/// filtering, then a volume-ranked fallback pinned at score 100.
fn run_tiers(
    current: &[Keyword],
    baseline: &HashMap<String, u64>,
    window_days: i64,
    top_n: usize,
) -> Vec<Keyword> {
    let strict_current = filter_noise(current.to_vec());
    let strict_baseline: HashMap<String, u64> = baseline
        .iter()
        .filter(|(word, _)| !is_noise(word))
        .map(|(word, &count)| (word.clone(), count))
        .collect();
    let scored = score_core(&strict_current, &strict_baseline, window_days, top_n);
    if !scored.is_empty() {
        return scored;
    }

    debug!("Strict scoring tier empty, retrying with loose filtering");
    let loose_current: Vec<Keyword> = current
        .iter()
        .filter(|k| !is_numeric_vector(&k.word))
        .cloned()
        .collect();
    let loose_baseline: HashMap<String, u64> = baseline
        .iter()
        .filter(|(word, _)| !is_numeric_vector(word))
        .map(|(word, &count)| (word.clone(), count))
        .collect();
    let scored = score_core(&loose_current, &loose_baseline, window_days, top_n);
    if !scored.is_empty() {
        return scored;
    }

    debug!("Loose scoring tier empty, falling back to volume ranking");
    let mut fallback: Vec<Keyword> =
        current.iter().filter(|k| !is_noise(&k.word)).cloned().collect();
    fallback.sort_by(|a, b| b.count.cmp(&a.count));
    fallback.truncate(top_n);
    for kw in fallback.iter_mut() {
        kw.score = Some(100);
    }
    fallback
}

/// Composite score: log volume, growth against the per-day baseline rate,
/// and the positive part of the z-score over baseline totals, normalized so
/// the maximum raw score maps to 100.
pub fn score_core(
    current: &[Keyword],
    baseline: &HashMap<String, u64>,
    window_days: i64,
    top_n: usize,
) -> Vec<Keyword> {
    if current.is_empty() {
        return Vec::new();
    }

    let values: Vec<f64> = if baseline.is_empty() {
        vec![0.0]
    } else {
        baseline.values().map(|&c| c as f64).collect_vec()
    };
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    let window = window_days.max(1) as f64;

    let raw: Vec<(Keyword, f64)> = current
        .iter()
        .map(|kw| {
            let count = kw.count as f64;
            let base = baseline.get(&kw.word).copied().unwrap_or(0) as f64;
            let volume = (1.0 + count).ln();
            let growth = (count + 1.0) / (base / window + 1.0);
            let z = if std_dev > 0.0 { (count - mean) / std_dev } else { 0.0 };
            let score = 0.6 * volume + 0.3 * (1.0 + growth).ln() + 0.1 * z.max(0.0);
            (kw.clone(), score)
        })
        .collect();

    let max_raw = raw.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    let mut scored: Vec<Keyword> = raw
        .into_iter()
        .map(|(mut kw, s)| {
            kw.score = Some(if max_raw > 0.0 {
                ((s / max_raw) * 100.0).round() as u32
            } else {
                0
            });
            kw
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(top_n);
    scored
}
