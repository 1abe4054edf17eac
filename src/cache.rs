//! TTL key-value cache in front of the trend store.
//!
//! Values are opaque serialized trend bodies; expiry is best-effort. The
//! contract mirrors the external cache the read endpoints consult before
//! touching the store, and every caller treats a cache failure as a miss.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use moka::sync::Cache;
use moka::Expiry;

use crate::models::Category;

#[async_trait]
pub trait TrendCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
}

pub fn realtime_key(date: NaiveDate, category: Category) -> String {
    format!("realtime:{}:{}", date, category)
}

pub fn daily_key(date: NaiveDate, category: Category) -> String {
    format!("daily:{}:{}", date, category)
}

pub fn top_key(date: NaiveDate, category: Category, window_days: i64, limit: usize) -> String {
    format!("top:{}:{}:{}:{}", date, category, window_days, limit)
}

#[derive(Clone)]
struct Entry {
    body: String,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache with per-entry TTL.
pub struct MemoryCache {
    inner: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new(capacity: u64) -> Self {
        MemoryCache {
            inner: Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryTtl)
                .build(),
        }
    }
}

#[async_trait]
impl TrendCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.get(key).map(|entry| entry.body))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.inner.insert(
            key.to_string(),
            Entry {
                body: value.to_string(),
                ttl: Duration::from_secs(ttl_secs.max(1)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.inner.invalidate(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_del() {
        let cache = MemoryCache::new(16);
        cache.set_with_ttl("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new(16);
        cache.set_with_ttl("short", "v", 1).await.unwrap();
        assert!(cache.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[test]
    fn key_formats_are_stable() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(realtime_key(d, Category::Themes), "realtime:2024-05-01:themes");
        assert_eq!(daily_key(d, Category::Documents), "daily:2024-05-01:documents");
        assert_eq!(top_key(d, Category::Orgs, 7, 50), "top:2024-05-01:orgs:7:50");
    }
}
