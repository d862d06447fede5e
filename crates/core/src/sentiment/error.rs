use std::fmt;

#[derive(Debug, Clone)]
pub struct UpstreamError {
    pub source: &'static str,
    pub stage: &'static str,
    pub detail: String,
}

impl UpstreamError {
    pub fn new(source: &'static str, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            source,
            stage,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upstream error (source={}, stage={}): {}",
            self.source, self.stage, self.detail
        )
    }
}

impl std::error::Error for UpstreamError {}
