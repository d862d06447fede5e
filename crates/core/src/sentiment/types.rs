use crate::domain::snapshot::SentimentLabel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSentiment {
    pub compound: f64,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub source: String,
    pub url: String,
    pub published_at: Option<String>,
    pub sentiment: ItemSentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub text: String,
    pub created_at: Option<String>,
    pub sentiment_compound: f64,
    pub sentiment_label: SentimentLabel,
    pub like_count: u64,
    pub retweet_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSentiment {
    pub average_score: f64,
    pub label: SentimentLabel,
    pub confidence: f64,
    pub total_sources: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    pub neutral_percentage: f64,
    pub total_articles: usize,
    pub total_tweets: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub query: String,
    pub news_articles: Vec<NewsArticle>,
    pub social_posts: Vec<SocialPost>,
    /// `None` when no item could be fetched and scored.
    pub overall: Option<OverallSentiment>,
    pub summary: SentimentSummary,
}

impl SentimentReport {
    pub fn aggregate(
        query: &str,
        news_articles: Vec<NewsArticle>,
        social_posts: Vec<SocialPost>,
    ) -> Self {
        let scores: Vec<f64> = news_articles
            .iter()
            .map(|a| a.sentiment.compound)
            .chain(social_posts.iter().map(|p| p.sentiment_compound))
            .collect();

        let (overall, summary) = if scores.is_empty() {
            (None, SentimentSummary::default())
        } else {
            let n = scores.len() as f64;
            let average_score = (scores.iter().sum::<f64>() / n).clamp(-1.0, 1.0);

            let mut positive = 0usize;
            let mut negative = 0usize;
            for score in &scores {
                match SentimentLabel::from_score(*score) {
                    SentimentLabel::Positive => positive += 1,
                    SentimentLabel::Negative => negative += 1,
                    SentimentLabel::Neutral => {}
                }
            }
            let neutral = scores.len() - positive - negative;

            (
                Some(OverallSentiment {
                    average_score,
                    label: SentimentLabel::from_score(average_score),
                    confidence: average_score.abs(),
                    total_sources: scores.len(),
                }),
                SentimentSummary {
                    positive_percentage: positive as f64 / n * 100.0,
                    negative_percentage: negative as f64 / n * 100.0,
                    neutral_percentage: neutral as f64 / n * 100.0,
                    total_articles: news_articles.len(),
                    total_tweets: social_posts.len(),
                },
            )
        };

        Self {
            query: query.to_string(),
            news_articles,
            social_posts,
            overall,
            summary,
        }
    }
}
