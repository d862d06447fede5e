use crate::domain::snapshot::SentimentLabel;
use crate::sentiment::types::ItemSentiment;
use vader_sentiment::SentimentIntensityAnalyzer;

/// Thin wrapper over the VADER lexicon scorer.
pub struct TextScorer {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl TextScorer {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }

    pub fn score(&self, text: &str) -> ItemSentiment {
        if text.trim().is_empty() {
            return ItemSentiment {
                compound: 0.0,
                positive: 0.0,
                negative: 0.0,
                neutral: 1.0,
                label: SentimentLabel::Neutral,
            };
        }

        let scores = self.analyzer.polarity_scores(text);
        let get = |key: &str| scores.get(key).copied().unwrap_or(0.0);
        let compound = get("compound").clamp(-1.0, 1.0);

        ItemSentiment {
            compound,
            positive: get("pos"),
            negative: get("neg"),
            neutral: get("neu"),
            label: SentimentLabel::from_score(compound),
        }
    }
}

impl Default for TextScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TextScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TextScorer(vader)")
    }
}
