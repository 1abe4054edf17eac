//! Merge collector output into realtime and daily trend documents.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{info, warn};

use crate::cache::{daily_key, realtime_key, TrendCache};
use crate::config::Config;
use crate::models::{Category, Collector, Keyword, Trend, TrendType};
use crate::rank::rank_bag;
use crate::store::TrendStore;

const DAILY_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn TrendStore>,
    cache: Arc<dyn TrendCache>,
    config: Arc<Config>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn TrendStore>, cache: Arc<dyn TrendCache>, config: Arc<Config>) -> Self {
        Aggregator { store, cache, config }
    }

    /// Upsert realtime trends for one fetched artifact. `category == None`
    /// aggregates every category.
    pub async fn aggregate_from_file(
        &self,
        collector: &Collector,
        timestamp: DateTime<Utc>,
        category: Option<Category>,
    ) -> Result<()> {
        let date = timestamp.date_naive();
        let ttl = self.config.realtime_interval_min * 60;

        for cat in entity_categories(category) {
            let keywords = rank_bag(collector.entity_bag(cat), self.config.top_n);
            let trend = Trend {
                timestamp,
                trend_type: TrendType::Realtime,
                date,
                category: cat,
                keywords,
            };
            self.write_trend(&trend, realtime_key(date, cat), ttl).await?;
        }

        if wants_documents(category) && !collector.document_identifiers.is_empty() {
            let trend = Trend {
                timestamp,
                trend_type: TrendType::Realtime,
                date,
                category: Category::Documents,
                keywords: document_keywords(&collector.document_identifiers, self.config.top_n),
            };
            self.write_trend(&trend, realtime_key(date, Category::Documents), ttl)
                .await?;
        }

        info!(
            "Realtime aggregation completed - date={}, timestamp={}, rows={}, row_errors={}",
            date, timestamp, collector.rows, collector.row_errors
        );
        Ok(())
    }

    /// Merge the day's collectors and upsert daily trends for `date`.
    pub async fn aggregate_daily(
        &self,
        collectors: Vec<Collector>,
        date: NaiveDate,
        category: Option<Category>,
    ) -> Result<()> {
        let mut merged = Collector::default();
        let sources = collectors.len();
        for collector in collectors {
            merged.merge(collector);
        }

        let timestamp = midday_utc(date);
        for cat in entity_categories(category) {
            let keywords = rank_bag(merged.entity_bag(cat), self.config.top_n);
            let trend = Trend {
                timestamp,
                trend_type: TrendType::Daily,
                date,
                category: cat,
                keywords,
            };
            self.write_trend(&trend, daily_key(date, cat), DAILY_CACHE_TTL_SECS)
                .await?;
        }

        if wants_documents(category) && !merged.document_identifiers.is_empty() {
            let trend = Trend {
                timestamp,
                trend_type: TrendType::Daily,
                date,
                category: Category::Documents,
                keywords: document_keywords(&merged.document_identifiers, self.config.top_n),
            };
            self.write_trend(&trend, daily_key(date, Category::Documents), DAILY_CACHE_TTL_SECS)
                .await?;
        }

        info!(
            "Daily aggregation completed - date={}, sources={}, rows={}, row_errors={}",
            date, sources, merged.rows, merged.row_errors
        );
        Ok(())
    }

    /// Store upsert and cache write run concurrently. Store failures surface;
    /// cache failures degrade to a miss.
    async fn write_trend(&self, trend: &Trend, cache_key: String, ttl_secs: u64) -> Result<()> {
        let body = serde_json::to_string(trend)?;
        let (stored, cached) = tokio::join!(
            self.store.upsert_trend(trend),
            self.cache.set_with_ttl(&cache_key, &body, ttl_secs),
        );
        if let Err(e) = cached {
            warn!("Cache write failed - key={}, error={:#}", cache_key, e);
        }
        stored
    }
}

fn entity_categories(category: Option<Category>) -> Vec<Category> {
    match category {
        None => Category::ENTITIES.to_vec(),
        Some(Category::Documents) => Vec::new(),
        Some(cat) => vec![cat],
    }
}

fn wants_documents(category: Option<Category>) -> bool {
    matches!(category, None | Some(Category::Documents))
}

/// Deduplicated document identifiers, first-seen order, count 1 each.
fn document_keywords(ids: &[String], top_n: usize) -> Vec<Keyword> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .take(top_n)
        .map(|id| Keyword::new(id.clone(), 1))
        .collect()
}

pub fn midday_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("midday is a valid time"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::store::FsTrendStore;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: Arc<dyn TrendStore>,
        cache: Arc<dyn TrendCache>,
        aggregator: Aggregator,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store: Arc<dyn TrendStore> = Arc::new(FsTrendStore::new(tmp.path()).unwrap());
        let cache: Arc<dyn TrendCache> = Arc::new(MemoryCache::new(64));
        let aggregator = Aggregator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::new(Config::default()),
        );
        Fixture { _tmp: tmp, store, cache, aggregator }
    }

    fn sample_collector() -> Collector {
        Collector {
            themes: vec![
                "war_conflict".into(),
                "tax_policy".into(),
                "war_conflict".into(),
            ],
            persons: vec!["jane roe".into()],
            orgs: vec!["united nations".into(), "united nations".into()],
            document_identifiers: vec![
                "http://a.example/1".into(),
                "http://b.example/2".into(),
                "http://a.example/1".into(),
            ],
            rows: 3,
            row_errors: 0,
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 15, 0).unwrap()
    }

    #[tokio::test]
    async fn realtime_aggregation_writes_every_category() {
        let fx = fixture();
        fx.aggregator
            .aggregate_from_file(&sample_collector(), ts(), None)
            .await
            .unwrap();

        let date = ts().date_naive();
        let themes = fx
            .store
            .find_trend(TrendType::Realtime, date, Category::Themes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(themes.keywords[0].word, "war_conflict");
        assert_eq!(themes.keywords[0].count, 2);
        assert_eq!(themes.timestamp, ts());

        let docs = fx
            .store
            .find_trend(TrendType::Realtime, date, Category::Documents)
            .await
            .unwrap()
            .unwrap();
        // duplicates collapsed, count fixed at 1
        assert_eq!(docs.keywords.len(), 2);
        assert!(docs.keywords.iter().all(|k| k.count == 1));

        // cache carries the same payload
        let cached = fx
            .cache
            .get(&realtime_key(date, Category::Themes))
            .await
            .unwrap()
            .unwrap();
        let cached: Trend = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached, themes);
    }

    #[tokio::test]
    async fn aggregation_is_idempotent() {
        let fx = fixture();
        let collector = sample_collector();

        fx.aggregator
            .aggregate_from_file(&collector, ts(), None)
            .await
            .unwrap();
        let first = fx
            .store
            .find_trend(TrendType::Realtime, ts().date_naive(), Category::Themes)
            .await
            .unwrap()
            .unwrap();

        fx.aggregator
            .aggregate_from_file(&collector, ts(), None)
            .await
            .unwrap();
        let second = fx
            .store
            .find_trend(TrendType::Realtime, ts().date_naive(), Category::Themes)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn daily_aggregation_merges_collectors() {
        let fx = fixture();
        let date = ts().date_naive();
        let mut other = Collector::default();
        other.themes = vec!["tax_policy".into(), "tax_policy".into(), "tax_policy".into()];
        other.rows = 1;

        fx.aggregator
            .aggregate_daily(vec![sample_collector(), other], date, None)
            .await
            .unwrap();

        let themes = fx
            .store
            .find_trend(TrendType::Daily, date, Category::Themes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(themes.keywords[0].word, "tax_policy");
        assert_eq!(themes.keywords[0].count, 4);
        assert_eq!(themes.keywords[1].word, "war_conflict");
        assert_eq!(themes.timestamp, midday_utc(date));
    }

    #[tokio::test]
    async fn single_category_aggregation_leaves_others_untouched() {
        let fx = fixture();
        fx.aggregator
            .aggregate_from_file(&sample_collector(), ts(), Some(Category::Persons))
            .await
            .unwrap();

        let date = ts().date_naive();
        assert!(fx
            .store
            .find_trend(TrendType::Realtime, date, Category::Persons)
            .await
            .unwrap()
            .is_some());
        assert!(fx
            .store
            .find_trend(TrendType::Realtime, date, Category::Themes)
            .await
            .unwrap()
            .is_none());
        assert!(fx
            .store
            .find_trend(TrendType::Realtime, date, Category::Documents)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn keyword_order_survives_store_round_trip() {
        // round-trip equality of the serialized keyword sequence
        let keywords = vec![Keyword::new("b", 5), Keyword::new("a", 5), Keyword::new("c", 1)];
        let json = serde_json::to_string(&keywords).unwrap();
        let back: Vec<Keyword> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keywords);
    }
}
