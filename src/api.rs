//! HTTP query surface over the trend store and cache.
//!
//! Read endpoints consult the cache first and fall back to the store; cache
//! failures are treated as misses and never fail a request.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cache::{daily_key, top_key, TrendCache};
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::models::{Category, Trend, TrendType};
use crate::score::{ScoreParams, Scorer};
use crate::store::TrendStore;

const TOP_CACHE_TTL_SECS: u64 = 600;
const REALTIME_RESULT_LIMIT: usize = 20;

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TrendStore>,
    pub cache: Arc<dyn TrendCache>,
    pub fetcher: Arc<Fetcher>,
    pub scorer: Scorer,
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trends/realtime", get(get_realtime))
        .route("/trends/daily", get(get_daily))
        .route("/trends/top", get(get_top))
        .route("/trends/documents", get(get_documents))
        .route("/trends/admin/fetchDaily", post(admin_fetch_daily))
        .with_state(state)
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(e) => {
                warn!("Request failed - error={:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TrendQuery {
    date: Option<NaiveDate>,
    category: Option<String>,
    window: Option<String>,
    limit: Option<usize>,
    nocache: Option<u8>,
}

impl TrendQuery {
    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn category_label(&self) -> &str {
        self.category.as_deref().unwrap_or("all")
    }

    /// `category=all` (or none) expands to every category; otherwise one.
    fn categories(&self) -> Result<Vec<Category>, ApiError> {
        match self.category.as_deref() {
            None | Some("all") => Ok(Category::ALL.to_vec()),
            Some(raw) => Category::parse(raw)
                .map(|cat| vec![cat])
                .ok_or_else(|| ApiError::BadRequest(format!("unknown category: {raw}"))),
        }
    }

    fn single_category(&self) -> Result<Category, ApiError> {
        let raw = self.category.as_deref().unwrap_or("themes");
        Category::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown category: {raw}")))
    }

    fn nocache(&self) -> bool {
        self.nocache.unwrap_or(0) != 0
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Up to 20 most recent realtime trend documents at or before `date`.
async fn get_realtime(
    State(state): State<SharedState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = query.date();
    let categories = query.categories()?;

    // the realtime cache holds only the newest snapshot per day, so this
    // listing always walks the store
    let results = state
        .store
        .find_recent(TrendType::Realtime, date, &categories, REALTIME_RESULT_LIMIT)
        .await?;
    Ok(trend_list_response(date, query.category_label(), results))
}

/// The daily trend document for `date`, or all four when `category=all`.
async fn get_daily(
    State(state): State<SharedState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = query.date();
    let categories = query.categories()?;

    let mut results = Vec::new();
    for category in &categories {
        match cached_trend(&state, &daily_key(date, *category)).await {
            Some(trend) => results.push(trend),
            None => {
                if let Some(trend) = state
                    .store
                    .find_trend(TrendType::Daily, date, *category)
                    .await?
                {
                    results.push(trend);
                }
            }
        }
    }

    let results = if categories.len() == 1 {
        // single category: the document itself (or null)
        results.pop().map(|t| json!(t)).unwrap_or(Value::Null)
    } else {
        json!(results)
    };
    Ok(Json(json!({
        "date": date,
        "category": query.category_label(),
        "results": results,
    })))
}

/// Ranked trends for `date`, computed by the scorer and cached for 10 min.
async fn get_top(
    State(state): State<SharedState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = query.date();
    let category = query.single_category()?;
    let window_days = parse_window_days(query.window.as_deref().unwrap_or("7d"));
    let limit = query.limit.unwrap_or(state.config.top_n).max(1);
    let key = top_key(date, category, window_days, limit);

    if !query.nocache() {
        match state.cache.get(&key).await {
            Ok(Some(body)) => {
                if let Ok(cached) = serde_json::from_str::<Value>(&body) {
                    debug!("Top trends served from cache - key={}", key);
                    return Ok(Json(cached));
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Cache read failed - key={}, error={:#}", key, e),
        }
    }

    let params = ScoreParams {
        category,
        window_days,
        top_n: limit,
        ..ScoreParams::new(date)
    };
    let results = state.scorer.score_trends(params).await?;
    let response = json!({
        "date": date,
        "category": category.as_str(),
        "results": results,
    });

    if let Err(e) = state
        .cache
        .set_with_ttl(&key, &response.to_string(), TOP_CACHE_TTL_SECS)
        .await
    {
        warn!("Cache write failed - key={}, error={:#}", key, e);
    }
    Ok(Json(response))
}

/// Unique document identifiers of the date's daily rollup.
async fn get_documents(
    State(state): State<SharedState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = query.date();
    let trend = match cached_trend(&state, &daily_key(date, Category::Documents)).await {
        Some(trend) => Some(trend),
        None => {
            state
                .store
                .find_trend(TrendType::Daily, date, Category::Documents)
                .await?
        }
    };
    let ids: Vec<String> = trend
        .map(|t| t.keywords.into_iter().map(|k| k.word).collect())
        .unwrap_or_default();
    Ok(Json(json!({
        "date": date,
        "category": Category::Documents.as_str(),
        "results": ids,
    })))
}

#[derive(Debug, Deserialize)]
struct AdminFetchQuery {
    date: NaiveDate,
}

/// Force a daily re-ingest for `date` and evict its cache keys.
async fn admin_fetch_daily(
    State(state): State<SharedState>,
    Query(query): Query<AdminFetchQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = query.date;
    info!("Admin daily re-ingest requested - date={}", date);
    let rows = state.fetcher.ingest_daily(date).await?;

    for key in daily_cache_keys(date) {
        if let Err(e) = state.cache.del(&key).await {
            warn!("Cache eviction failed - key={}, error={:#}", key, e);
        }
    }
    Ok(Json(json!({ "date": date, "status": "ok", "rows": rows })))
}

fn daily_cache_keys(date: NaiveDate) -> Vec<String> {
    let mut keys = vec![format!("daily:{date}:all")];
    keys.extend(Category::ALL.iter().map(|cat| daily_key(date, *cat)));
    keys
}

async fn cached_trend(state: &AppState, key: &str) -> Option<Trend> {
    match state.cache.get(key).await {
        Ok(Some(body)) => match serde_json::from_str(&body) {
            Ok(trend) => {
                debug!("Cache hit - key={}", key);
                Some(trend)
            }
            Err(e) => {
                warn!("Cache entry undecodable, treating as miss - key={}, error={}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Cache read failed - key={}, error={:#}", key, e);
            None
        }
    }
}

fn trend_list_response(date: NaiveDate, category: &str, results: Vec<Trend>) -> Json<Value> {
    Json(json!({
        "date": date,
        "category": category,
        "results": results,
    }))
}

/// Window grammar: plain integer → days; `Nd`/`Nm`/`Ny` → N days / N·30 days
/// / N·365 days; anything else → 7.
fn parse_window_days(raw: &str) -> i64 {
    let s = raw.trim().to_lowercase();
    if let Ok(n) = s.parse::<i64>() {
        if n > 0 {
            return n;
        }
    }
    if let Some(unit) = s.chars().last() {
        let num = &s[..s.len() - unit.len_utf8()];
        if let Ok(n) = num.parse::<i64>() {
            if n > 0 {
                match unit {
                    'd' => return n,
                    'm' => return n * 30,
                    'y' => return n * 365,
                    _ => {}
                }
            }
        }
    }
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_grammar() {
        assert_eq!(parse_window_days("7d"), 7);
        assert_eq!(parse_window_days("30d"), 30);
        assert_eq!(parse_window_days("3m"), 90);
        assert_eq!(parse_window_days("1y"), 365);
        assert_eq!(parse_window_days("3y"), 1095);
        assert_eq!(parse_window_days("14"), 14);
        assert_eq!(parse_window_days("2M"), 60);
    }

    #[test]
    fn window_grammar_falls_back_to_seven() {
        assert_eq!(parse_window_days("fortnight"), 7);
        assert_eq!(parse_window_days(""), 7);
        assert_eq!(parse_window_days("-3d"), 7);
        assert_eq!(parse_window_days("0"), 7);
        assert_eq!(parse_window_days("xyzq"), 7);
    }

    #[test]
    fn category_expansion() {
        let all = TrendQuery { category: Some("all".into()), ..TrendQuery::default() };
        assert_eq!(all.categories().unwrap().len(), 4);

        let one = TrendQuery { category: Some("persons".into()), ..TrendQuery::default() };
        assert_eq!(one.categories().unwrap(), vec![Category::Persons]);

        let bad = TrendQuery { category: Some("nonsense".into()), ..TrendQuery::default() };
        assert!(bad.categories().is_err());
    }

    #[test]
    fn daily_cache_keys_cover_all_variants() {
        let keys = daily_cache_keys(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(keys.len(), 5);
        assert!(keys.contains(&"daily:2024-05-01:all".to_string()));
        assert!(keys.contains(&"daily:2024-05-01:documents".to_string()));
    }
}
