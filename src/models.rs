use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendType {
    Realtime,
    Daily,
    Ranked,
}

impl TrendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendType::Realtime => "realtime",
            TrendType::Daily => "daily",
            TrendType::Ranked => "ranked",
        }
    }
}

impl fmt::Display for TrendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Themes,
    Persons,
    Orgs,
    Documents,
}

impl Category {
    /// The three entity-mention categories extracted from GKG columns.
    pub const ENTITIES: [Category; 3] = [Category::Themes, Category::Persons, Category::Orgs];

    /// Every persisted category, including document identifiers.
    pub const ALL: [Category; 4] = [
        Category::Themes,
        Category::Persons,
        Category::Orgs,
        Category::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Themes => "themes",
            Category::Persons => "persons",
            Category::Orgs => "orgs",
            Category::Documents => "documents",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s.trim().to_lowercase().as_str() {
            "themes" => Some(Category::Themes),
            "persons" => Some(Category::Persons),
            "orgs" => Some(Category::Orgs),
            "documents" => Some(Category::Documents),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single aggregated keyword within a trend document.
///
/// `score` is populated only on `ranked` trends; `documents` tracks which
/// source documents mentioned the keyword, when that information is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<BTreeSet<String>>,
}

impl Keyword {
    pub fn new(word: impl Into<String>, count: u64) -> Self {
        Keyword {
            word: word.into(),
            count,
            score: None,
            documents: None,
        }
    }
}

/// A materialized aggregation keyed by `(type, date, category)`.
///
/// `timestamp` is payload, not identity: for realtime trends it is the GDELT
/// file instant, for daily trends UTC midday of `date`, for ranked trends the
/// moment of computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub trend_type: TrendType,
    pub date: NaiveDate,
    pub category: Category,
    pub keywords: Vec<Keyword>,
}

/// Transient per-file aggregation buffer filled by the CSV collector and
/// consumed by the aggregator. Bags preserve multiplicity; insertion order is
/// irrelevant.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    pub themes: Vec<String>,
    pub persons: Vec<String>,
    pub orgs: Vec<String>,
    pub document_identifiers: Vec<String>,
    pub rows: u64,
    pub row_errors: u64,
}

impl Collector {
    pub fn entity_bag(&self, category: Category) -> &[String] {
        match category {
            Category::Themes => &self.themes,
            Category::Persons => &self.persons,
            Category::Orgs => &self.orgs,
            Category::Documents => &self.document_identifiers,
        }
    }

    pub fn merge(&mut self, other: Collector) {
        self.themes.extend(other.themes);
        self.persons.extend(other.persons);
        self.orgs.extend(other.orgs);
        self.document_identifiers.extend(other.document_identifiers);
        self.rows += other.rows;
        self.row_errors += other.row_errors;
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
            && self.persons.is_empty()
            && self.orgs.is_empty()
            && self.document_identifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_serde_round_trip() {
        let trend = Trend {
            timestamp: "2024-05-01T08:15:00Z".parse().unwrap(),
            trend_type: TrendType::Realtime,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            category: Category::Themes,
            keywords: vec![Keyword::new("tax_political", 3)],
        };
        let json = serde_json::to_string(&trend).unwrap();
        assert!(json.contains("\"type\":\"realtime\""));
        assert!(json.contains("\"date\":\"2024-05-01\""));
        // score/documents stay absent unless populated
        assert!(!json.contains("score"));
        assert!(!json.contains("documents"));
        let back: Trend = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trend);
    }

    #[test]
    fn ranked_keyword_carries_score() {
        let mut kw = Keyword::new("covid-19", 12);
        kw.score = Some(87);
        let json = serde_json::to_string(&kw).unwrap();
        assert!(json.contains("\"score\":87"));
    }

    #[test]
    fn category_parse_accepts_known_names() {
        assert_eq!(Category::parse("Themes"), Some(Category::Themes));
        assert_eq!(Category::parse(" orgs "), Some(Category::Orgs));
        assert_eq!(Category::parse("locations"), None);
    }

    #[test]
    fn collector_merge_sums_counters() {
        let mut a = Collector {
            themes: vec!["alpha".into()],
            rows: 2,
            row_errors: 1,
            ..Collector::default()
        };
        let b = Collector {
            themes: vec!["beta".into()],
            persons: vec!["someone".into()],
            rows: 3,
            ..Collector::default()
        };
        a.merge(b);
        assert_eq!(a.themes, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(a.persons.len(), 1);
        assert_eq!(a.rows, 5);
        assert_eq!(a.row_errors, 1);
    }
}
