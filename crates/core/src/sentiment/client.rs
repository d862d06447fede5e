use crate::config::Settings;
use crate::sentiment::error::UpstreamError;
use crate::sentiment::scorer::TextScorer;
use crate::sentiment::types::{NewsArticle, SentimentReport, SocialPost};
use crate::sentiment::SentimentSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 2;
const NEWSAPI_BASE_URL: &str = "https://newsapi.org";
const FINNHUB_BASE_URL: &str = "https://finnhub.io";
const TWITTER_BASE_URL: &str = "https://api.twitter.com";
const NEWS_PAGE_SIZE: u32 = 20;
const FINNHUB_LOOKBACK_DAYS: i64 = 3;
const FINNHUB_MAX_ITEMS: usize = 20;
const TWITTER_MAX_RESULTS: u32 = 20;

#[derive(Debug, Clone, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Clone, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    source: Option<NewsApiSource>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    datetime: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TwitterSearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Clone, Deserialize)]
struct Tweet {
    text: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    public_metrics: Option<TweetMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
}

/// News (NewsAPI, Finnhub) and social (Twitter v2) sentiment over HTTP.
#[derive(Debug)]
pub struct HttpSentimentClient {
    http: reqwest::Client,
    newsapi_key: Option<String>,
    finnhub_key: Option<String>,
    twitter_bearer_token: Option<String>,
    newsapi_base_url: String,
    finnhub_base_url: String,
    twitter_base_url: String,
    retries: u32,
    scorer: TextScorer,
}

impl HttpSentimentClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout_secs = std::env::var("SENTIMENT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("SENTIMENT_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build sentiment http client")?;

        Ok(Self {
            http,
            newsapi_key: settings.newsapi_key.clone(),
            finnhub_key: settings.finnhub_key.clone(),
            twitter_bearer_token: settings.twitter_bearer_token.clone(),
            newsapi_base_url: base_url_var("NEWSAPI_BASE_URL", NEWSAPI_BASE_URL),
            finnhub_base_url: base_url_var("FINNHUB_BASE_URL", FINNHUB_BASE_URL),
            twitter_base_url: base_url_var("TWITTER_BASE_URL", TWITTER_BASE_URL),
            retries,
            scorer: TextScorer::new(),
        })
    }

    pub fn has_news_source(&self) -> bool {
        self.newsapi_key.is_some() || self.finnhub_key.is_some()
    }

    pub fn has_social_source(&self) -> bool {
        self.twitter_bearer_token.is_some()
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        source: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let res = request
            .send()
            .await
            .map_err(|e| UpstreamError::new(source, "request", e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| UpstreamError::new(source, "body", e.to_string()))?;

        if !status.is_success() {
            let detail = format!("status={status}: {text}");
            return Err(UpstreamError::new(source, "http", detail).into());
        }

        let parsed = serde_json::from_str::<T>(&text)
            .map_err(|e| UpstreamError::new(source, "decode", e.to_string()))?;
        Ok(parsed)
    }

    async fn get_json<T, F>(&self, source: &'static str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_json_once::<T>(source, build()).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(
                        source,
                        attempt,
                        ?backoff,
                        error = %err,
                        "sentiment fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn fetch_newsapi(&self, query: &str) -> Vec<NewsArticle> {
        let Some(key) = self.newsapi_key.as_deref() else {
            tracing::debug!("NEWSAPI_KEY not configured; skipping NewsAPI");
            return Vec::new();
        };

        let url = format!("{}/v2/everything", self.newsapi_base_url);
        let page_size = NEWS_PAGE_SIZE.to_string();
        let res = self
            .get_json::<NewsApiResponse, _>("newsapi", || {
                self.http.get(&url).query(&[
                    ("q", query),
                    ("language", "en"),
                    ("sortBy", "publishedAt"),
                    ("pageSize", page_size.as_str()),
                    ("apiKey", key),
                ])
            })
            .await;

        match res {
            Ok(resp) => resp
                .articles
                .into_iter()
                .map(|a| {
                    self.score_article(
                        a.title.unwrap_or_default(),
                        a.description.unwrap_or_default(),
                        a.source.and_then(|s| s.name).unwrap_or_default(),
                        a.url.unwrap_or_default(),
                        a.published_at,
                    )
                })
                .collect(),
            Err(err) => {
                tracing::warn!(query, error = %err, "NewsAPI unavailable; continuing without it");
                Vec::new()
            }
        }
    }

    async fn fetch_finnhub(&self, query: &str) -> Vec<NewsArticle> {
        let Some(key) = self.finnhub_key.as_deref() else {
            tracing::debug!("FINNHUB_KEY not configured; skipping Finnhub");
            return Vec::new();
        };

        let symbol = query.trim().to_uppercase();
        let to = Utc::now().date_naive();
        let from = to - ChronoDuration::days(FINNHUB_LOOKBACK_DAYS);
        let (from, to) = (from.to_string(), to.to_string());
        let url = format!("{}/api/v1/company-news", self.finnhub_base_url);

        let res = self
            .get_json::<Vec<FinnhubArticle>, _>("finnhub", || {
                self.http.get(&url).query(&[
                    ("symbol", symbol.as_str()),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                    ("token", key),
                ])
            })
            .await;

        match res {
            Ok(items) => items
                .into_iter()
                .take(FINNHUB_MAX_ITEMS)
                .map(|a| {
                    let published_at = a
                        .datetime
                        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                        .map(|dt| dt.to_rfc3339());
                    self.score_article(
                        a.headline.unwrap_or_default(),
                        a.summary.unwrap_or_default(),
                        a.source.unwrap_or_default(),
                        a.url.unwrap_or_default(),
                        published_at,
                    )
                })
                .collect(),
            Err(err) => {
                tracing::warn!(
                    symbol = %symbol,
                    error = %err,
                    "Finnhub unavailable; continuing without it"
                );
                Vec::new()
            }
        }
    }

    async fn fetch_twitter(&self, query: &str) -> Vec<SocialPost> {
        let Some(token) = self.twitter_bearer_token.as_deref() else {
            tracing::debug!("TWITTER_BEARER_TOKEN not configured; skipping social source");
            return Vec::new();
        };

        let url = format!("{}/2/tweets/search/recent", self.twitter_base_url);
        let search = format!("{query} -is:retweet lang:en");
        let max_results = TWITTER_MAX_RESULTS.to_string();

        let res = self
            .get_json::<TwitterSearchResponse, _>("twitter", || {
                self.http.get(&url).bearer_auth(token).query(&[
                    ("query", search.as_str()),
                    ("max_results", max_results.as_str()),
                    ("tweet.fields", "created_at,public_metrics"),
                ])
            })
            .await;

        match res {
            Ok(resp) => resp
                .data
                .into_iter()
                .map(|t| {
                    let sentiment = self.scorer.score(&t.text);
                    let metrics = t.public_metrics.unwrap_or_default();
                    SocialPost {
                        text: t.text,
                        created_at: t.created_at,
                        sentiment_compound: sentiment.compound,
                        sentiment_label: sentiment.label,
                        like_count: metrics.like_count,
                        retweet_count: metrics.retweet_count,
                    }
                })
                .collect(),
            Err(err) => {
                tracing::warn!(
                    query,
                    error = %err,
                    "social source unavailable; continuing without it"
                );
                Vec::new()
            }
        }
    }

    fn score_article(
        &self,
        title: String,
        description: String,
        source: String,
        url: String,
        published_at: Option<String>,
    ) -> NewsArticle {
        let sentiment = self.scorer.score(&format!("{title} {description}"));
        NewsArticle {
            title,
            description,
            source,
            url,
            published_at,
            sentiment,
        }
    }
}

#[async_trait::async_trait]
impl SentimentSource for HttpSentimentClient {
    async fn analyze(&self, query: &str, include_social: bool) -> Result<SentimentReport> {
        let mut news = self.fetch_newsapi(query).await;
        news.extend(self.fetch_finnhub(query).await);

        let posts = if include_social {
            self.fetch_twitter(query).await
        } else {
            Vec::new()
        };

        let report = SentimentReport::aggregate(query, news, posts);
        tracing::debug!(
            query,
            articles = report.summary.total_articles,
            posts = report.summary.total_tweets,
            has_overall = report.overall.is_some(),
            "sentiment analyzed"
        );
        Ok(report)
    }
}

fn base_url_var(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SmtpSettings};
    use crate::test_http::CannedServer;
    use serde_json::json;

    fn unconfigured_settings() -> Settings {
        Settings {
            database_url: "sqlite::memory:".to_string(),
            alerts_file: "alerts.json".to_string(),
            export_dir: ".".to_string(),
            newsapi_key: None,
            finnhub_key: None,
            twitter_bearer_token: None,
            smtp: SmtpSettings {
                server: "localhost".to_string(),
                port: 587,
                user: None,
                password: None,
                from_email: None,
            },
            sentry_dsn: None,
        }
    }

    #[test]
    fn parses_newsapi_shape() {
        let v = json!({
            "status": "ok",
            "totalResults": 1,
            "articles": [
                {
                    "source": {"id": null, "name": "Reuters"},
                    "title": "Apple beats estimates",
                    "description": null,
                    "url": "https://example.com/a",
                    "publishedAt": "2026-04-01T10:00:00Z"
                }
            ]
        });
        let parsed: NewsApiResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(
            parsed.articles[0].source.as_ref().and_then(|s| s.name.as_deref()),
            Some("Reuters")
        );
        assert!(parsed.articles[0].description.is_none());
    }

    #[test]
    fn parses_finnhub_and_twitter_shapes() {
        let finnhub: Vec<FinnhubArticle> = serde_json::from_value(json!([
            {
                "headline": "TSLA deliveries",
                "summary": "",
                "source": "CNBC",
                "url": "u",
                "datetime": 1775037600
            }
        ]))
        .unwrap();
        assert_eq!(finnhub[0].datetime, Some(1_775_037_600));

        let twitter: TwitterSearchResponse = serde_json::from_value(json!({
            "data": [
                {
                    "id": "1",
                    "text": "$TSLA to the moon",
                    "public_metrics": {"like_count": 4, "retweet_count": 2, "reply_count": 0}
                }
            ],
            "meta": {"result_count": 1}
        }))
        .unwrap();
        assert_eq!(twitter.data[0].public_metrics.as_ref().unwrap().like_count, 4);

        let empty: TwitterSearchResponse =
            serde_json::from_value(json!({"meta": {"result_count": 0}})).unwrap();
        assert!(empty.data.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_returns_empty_report() {
        let client = HttpSentimentClient::from_settings(&unconfigured_settings()).unwrap();
        assert!(!client.has_news_source());
        assert!(!client.has_social_source());

        let report = client.analyze("AAPL", true).await.unwrap();
        assert!(report.overall.is_none());
        assert!(report.news_articles.is_empty());
        assert!(report.social_posts.is_empty());
    }

    fn client_against(newsapi: Option<&str>, finnhub: Option<&str>) -> HttpSentimentClient {
        let mut client = HttpSentimentClient::from_settings(&unconfigured_settings()).unwrap();
        client.retries = 2;
        if let Some(url) = newsapi {
            client.newsapi_key = Some("test-key".to_string());
            client.newsapi_base_url = url.to_string();
        }
        if let Some(url) = finnhub {
            client.finnhub_key = Some("test-key".to_string());
            client.finnhub_base_url = url.to_string();
        }
        client
    }

    #[tokio::test]
    async fn upstream_errors_are_retried_then_dropped() {
        let failing = CannedServer::start(500, r#"{"error":"internal"}"#).await;
        let garbled = CannedServer::start(200, "<html>not json</html>").await;
        let client = client_against(Some(&failing.base_url), Some(&garbled.base_url));

        let report = client.analyze("AAPL", false).await.unwrap();
        assert!(report.overall.is_none());
        assert!(report.news_articles.is_empty());
        assert_eq!(failing.hits(), 2);
        assert_eq!(garbled.hits(), 2);
    }

    #[tokio::test]
    async fn one_failing_source_keeps_the_other() {
        let failing = CannedServer::start(503, "").await;
        let newsapi = CannedServer::start(
            200,
            r#"{"status":"ok","articles":[{
                "source":{"id":null,"name":"Reuters"},
                "title":"Apple posts record profit",
                "description":"Great quarter with strong growth",
                "url":"https://example.com/a",
                "publishedAt":"2026-04-01T10:00:00Z"
            }]}"#,
        )
        .await;
        let client = client_against(Some(&newsapi.base_url), Some(&failing.base_url));

        let report = client.analyze("AAPL", false).await.unwrap();
        assert_eq!(report.news_articles.len(), 1);
        assert_eq!(report.news_articles[0].source, "Reuters");
        assert_eq!(report.overall.as_ref().map(|o| o.total_sources), Some(1));
        assert_eq!(newsapi.hits(), 1);
        assert_eq!(failing.hits(), 2);
    }
}
