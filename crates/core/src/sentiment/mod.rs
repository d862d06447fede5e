pub mod client;
pub mod error;
pub mod scorer;
pub mod types;

use crate::sentiment::types::SentimentReport;

/// Fetches news/social items for a query and scores them.
///
/// Implementations degrade upstream problems (missing keys, rate limits,
/// network failures) to an empty report. An `Err` is reserved for failures the
/// caller has to account for, e.g. a fake source in tests or a broken client.
#[async_trait::async_trait]
pub trait SentimentSource: Send + Sync {
    async fn analyze(&self, query: &str, include_social: bool) -> anyhow::Result<SentimentReport>;
}
