//! Persistent trend document store.
//!
//! The pipeline only needs upserts atomic on `(type, date, category)` and a
//! few date-keyed lookups, so the contract is a small DAO trait; the default
//! implementation keeps one JSON document per key on the local filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::models::{Category, Trend, TrendType};

#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Create or fully replace the document keyed by the trend's
    /// `(type, date, category)`.
    async fn upsert_trend(&self, trend: &Trend) -> Result<()>;

    async fn find_trend(
        &self,
        kind: TrendType,
        date: NaiveDate,
        category: Category,
    ) -> Result<Option<Trend>>;

    /// All documents of `kind`/`category` whose date is in `dates`.
    async fn find_trends_in(
        &self,
        kind: TrendType,
        dates: &[NaiveDate],
        category: Category,
    ) -> Result<Vec<Trend>>;

    /// Up to `limit` documents of `kind`, walking dates backwards from
    /// `until` inclusive, restricted to `categories`.
    async fn find_recent(
        &self,
        kind: TrendType,
        until: NaiveDate,
        categories: &[Category],
        limit: usize,
    ) -> Result<Vec<Trend>>;
}

/// Filesystem-backed store: `<data_dir>/<type>/<date>/<category>.json`,
/// upserts via write-temp-then-rename so readers never observe partial
/// documents.
pub struct FsTrendStore {
    data_dir: PathBuf,
}

impl FsTrendStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Creating data dir {}", data_dir.display()))?;
        Ok(FsTrendStore { data_dir })
    }

    fn doc_path(&self, kind: TrendType, date: NaiveDate, category: Category) -> PathBuf {
        self.data_dir
            .join(kind.as_str())
            .join(date.to_string())
            .join(format!("{}.json", category.as_str()))
    }

    fn read_doc(&self, path: &Path) -> Result<Option<Trend>> {
        match fs::read(path) {
            Ok(bytes) => {
                let trend = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Decoding trend document {}", path.display()))?;
                Ok(Some(trend))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Reading {}", path.display())),
        }
    }

    fn list_dates(&self, kind: TrendType) -> Vec<NaiveDate> {
        let kind_dir = self.data_dir.join(kind.as_str());
        let entries = match fs::read_dir(&kind_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
            .collect()
    }
}

#[async_trait]
impl TrendStore for FsTrendStore {
    async fn upsert_trend(&self, trend: &Trend) -> Result<()> {
        let path = self.doc_path(trend.trend_type, trend.date, trend.category);
        let dir = path.parent().expect("document path has a parent");
        fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;

        let tmp = dir.join(format!(".{}.tmp", trend.category.as_str()));
        fs::write(&tmp, serde_json::to_vec_pretty(trend)?)
            .with_context(|| format!("Writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Renaming into {}", path.display()))?;

        debug!(
            "Trend upserted - type={}, date={}, category={}, keywords={}",
            trend.trend_type,
            trend.date,
            trend.category,
            trend.keywords.len()
        );
        Ok(())
    }

    async fn find_trend(
        &self,
        kind: TrendType,
        date: NaiveDate,
        category: Category,
    ) -> Result<Option<Trend>> {
        self.read_doc(&self.doc_path(kind, date, category))
    }

    async fn find_trends_in(
        &self,
        kind: TrendType,
        dates: &[NaiveDate],
        category: Category,
    ) -> Result<Vec<Trend>> {
        let mut found = Vec::new();
        for &date in dates {
            if let Some(trend) = self.read_doc(&self.doc_path(kind, date, category))? {
                found.push(trend);
            }
        }
        Ok(found)
    }

    async fn find_recent(
        &self,
        kind: TrendType,
        until: NaiveDate,
        categories: &[Category],
        limit: usize,
    ) -> Result<Vec<Trend>> {
        let mut dates = self.list_dates(kind);
        dates.sort_unstable_by(|a, b| b.cmp(a));

        let mut out = Vec::new();
        'dates: for date in dates.into_iter().filter(|d| *d <= until) {
            for &category in categories {
                if out.len() >= limit {
                    break 'dates;
                }
                if let Some(trend) = self.read_doc(&self.doc_path(kind, date, category))? {
                    out.push(trend);
                }
            }
        }
        Ok(out)
    }
}
