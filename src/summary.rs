use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::report::AnalysisReport;

/// Free-form review attached to a report. Passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub global_score: u32,
    pub summary: String,
    pub insights: Vec<String>,
}

pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Result<Summary>> + Send + 'a>>;

pub trait SummaryService: Send + Sync {
    fn summarize<'a>(&'a self, report: &'a AnalysisReport) -> SummaryFuture<'a>;
}

/// Stand-in reviewer that always answers with the same canned review.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSummary;

impl SummaryService for PlaceholderSummary {
    fn summarize<'a>(&'a self, _report: &'a AnalysisReport) -> SummaryFuture<'a> {
        Box::pin(async move {
            Ok(Summary {
                global_score: 87,
                summary: "Good contrast, legible text and a well placed logo.".to_string(),
                insights: vec![
                    "The dominant color draws immediate attention.".to_string(),
                    "Negative space is well balanced.".to_string(),
                    "Text is correctly centered.".to_string(),
                ],
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_is_constant() {
        let report = AnalysisReport::default();
        let first = PlaceholderSummary.summarize(&report).await.expect("summary");
        let second = PlaceholderSummary.summarize(&report).await.expect("summary");
        assert_eq!(first, second);
        assert_eq!(first.global_score, 87);
        assert_eq!(first.insights.len(), 3);
    }
}
