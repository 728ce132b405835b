//! Reasoning analyzer capability boundary.
//!
//! One operation: attempt history (+ optional question context) in,
//! structured cognitive insight out. Concrete analyzers are
//! interchangeable; the deterministic heuristic doubles as the fallback
//! the orchestrator substitutes on provider failure or timeout.

use std::env;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DetectionError, Result};
use crate::models::{AttemptHistory, ReasoningSignals};

#[async_trait]
pub trait ReasoningAnalyzer: Send + Sync {
    /// Analyze cognitive progression across attempts.
    async fn analyze(
        &self,
        history: &AttemptHistory,
        question_context: Option<&str>,
    ) -> Result<ReasoningSignals>;

    fn name(&self) -> &'static str;
}

/// Deterministic analyzer computed purely from attempt count, correctness,
/// and answer-length spread. Never fails, so the pipeline always has a
/// usable reasoning signal.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, history: &AttemptHistory) -> ReasoningSignals {
        if history.attempts.is_empty() {
            return ReasoningSignals {
                conceptual_gap: "No attempts recorded".to_string(),
                learning_summary: "Student has not attempted this question".to_string(),
                confidence: 0.0,
                misconception_patterns: Vec::new(),
                confidence_correctness_gap: 0.0,
            };
        }

        let attempt_count = history.attempt_count();
        let correct_count = history.correct_count();
        let any_correct = correct_count > 0;

        let (reasoning_depth, conceptual_gap) = match (attempt_count, any_correct) {
            (1, true) => (85, "No gaps detected - solved on first attempt"),
            (1, false) => (40, "Initial misconception or insufficient understanding"),
            (2, true) => (70, "Quick recovery suggests understanding refinement"),
            (2, false) => (35, "Persistent conceptual confusion"),
            (_, true) => (55, "Difficulty with problem-solving approach, not concept"),
            (_, false) => (20, "Fundamental misunderstanding - requires intervention"),
        };

        let lengths: Vec<usize> = history.attempts.iter().map(|a| a.answer.len()).collect();
        let consistency = if lengths.len() > 1 {
            let spread = lengths.iter().max().unwrap_or(&0) - lengths.iter().min().unwrap_or(&0);
            if spread > 50 {
                "LOW"
            } else if spread > 20 {
                "MEDIUM"
            } else {
                "HIGH"
            }
        } else {
            "HIGH"
        };

        let misconception_patterns = if attempt_count >= 2 && !any_correct {
            vec!["Repeated error pattern detected".to_string()]
        } else {
            Vec::new()
        };

        let confidence_correctness_gap = if any_correct { -10.0 } else { 30.0 };

        let mut learning_summary = format!(
            "Student made {} attempt(s), succeeded on {}. \
             Learning state: {} consistency, reasoning depth {}/100.",
            attempt_count, correct_count, consistency, reasoning_depth
        );
        if !misconception_patterns.is_empty() {
            let _ = write!(
                learning_summary,
                " Concerns: {}",
                misconception_patterns.join(", ")
            );
        }

        ReasoningSignals {
            conceptual_gap: conceptual_gap.to_string(),
            learning_summary,
            confidence: (0.5 + attempt_count as f64 * 0.15).min(0.95),
            misconception_patterns,
            confidence_correctness_gap,
        }
    }
}

#[async_trait]
impl ReasoningAnalyzer for HeuristicAnalyzer {
    async fn analyze(
        &self,
        history: &AttemptHistory,
        _question_context: Option<&str>,
    ) -> Result<ReasoningSignals> {
        Ok(self.assess(history))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Configuration for the hosted reasoning provider.
#[derive(Debug, Clone)]
pub struct ApiAnalyzerConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Client-side request timeout; the orchestrator additionally bounds
    /// the whole analyzer call.
    pub request_timeout: Duration,
}

impl Default for ApiAnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("ANALYZER_API_KEY").unwrap_or_default(),
            model: "reasoning-analyst-small".to_string(),
            endpoint: "https://api.example.com/v1/messages".to_string(),
            max_tokens: 1024,
            temperature: 0.5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProviderRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<ProviderMessage>,
}

#[derive(Debug, Serialize)]
struct ProviderMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    content: Vec<ProviderContent>,
}

#[derive(Debug, Deserialize)]
struct ProviderContent {
    text: String,
}

/// Structured body the provider is prompted to return.
#[derive(Debug, Deserialize)]
struct InsightBody {
    conceptual_gap: String,
    summary: String,
    confidence: f64,
    #[serde(default)]
    misconceptions: Vec<String>,
    #[serde(default)]
    confidence_gap: f64,
}

/// Analyzer backed by a hosted reasoning model. Any transport, status, or
/// parse failure surfaces as [`DetectionError::Analyzer`] and is converted
/// to the heuristic fallback by the orchestrator.
pub struct ApiAnalyzer {
    config: ApiAnalyzerConfig,
    client: reqwest::Client,
}

impl ApiAnalyzer {
    pub fn new(config: ApiAnalyzerConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DetectionError::Analyzer(
                "ANALYZER_API_KEY not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DetectionError::Analyzer(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn build_prompt(history: &AttemptHistory, question_context: Option<&str>) -> String {
        let mut attempts_text = String::new();
        for attempt in &history.attempts {
            let _ = writeln!(
                attempts_text,
                "Attempt {} (at {}):\n  Answer: {}\n  Correct: {}",
                attempt.attempt_number, attempt.timestamp, attempt.answer, attempt.is_correct
            );
        }
        let context_text = question_context
            .map(|c| format!("Question context: {c}\n"))
            .unwrap_or_default();

        format!(
            "Analyze the following student's attempts on a question and provide \
             structured insights.\n\n{context_text}\nAttempt History:\n{attempts_text}\n\
             Respond with JSON only, using this structure:\n\
             {{\n  \"conceptual_gap\": \"what conceptual gaps exist\",\n  \
             \"summary\": \"brief learning progress summary\",\n  \
             \"confidence\": 0.0,\n  \
             \"misconceptions\": [\"pattern\"],\n  \
             \"confidence_gap\": 0.0\n}}\n\n\
             confidence is 0.0-1.0; confidence_gap is -50 to +50 where negative \
             means appropriately confident and positive means overconfident or confused."
        )
    }

    async fn call_provider(&self, prompt: &str) -> Result<String> {
        let request = ProviderRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![ProviderMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DetectionError::Analyzer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DetectionError::Analyzer(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let body: ProviderResponse = response
            .json()
            .await
            .map_err(|e| DetectionError::Analyzer(e.to_string()))?;
        body.content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| DetectionError::Analyzer("empty provider response".to_string()))
    }
}

#[async_trait]
impl ReasoningAnalyzer for ApiAnalyzer {
    async fn analyze(
        &self,
        history: &AttemptHistory,
        question_context: Option<&str>,
    ) -> Result<ReasoningSignals> {
        if history.attempts.is_empty() {
            // Nothing for the model to read; mirror the heuristic's shape.
            return Ok(HeuristicAnalyzer::new().assess(history));
        }

        debug!(
            student = %history.student_id,
            question = %history.question_id,
            attempts = history.attempt_count(),
            "requesting reasoning analysis"
        );

        let prompt = Self::build_prompt(history, question_context);
        let text = self.call_provider(&prompt).await?;
        let body: InsightBody = serde_json::from_str(&text)
            .map_err(|e| DetectionError::Analyzer(format!("unparseable insight: {e}")))?;

        Ok(ReasoningSignals {
            conceptual_gap: body.conceptual_gap,
            learning_summary: body.summary,
            confidence: body.confidence.clamp(0.0, 1.0),
            misconception_patterns: body.misconceptions,
            confidence_correctness_gap: body.confidence_gap,
        })
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn history_with(attempts: &[(&str, bool)]) -> AttemptHistory {
        let mut history = AttemptHistory::new("stu-1", "q-1");
        for (answer, correct) in attempts {
            history.push_attempt(answer.to_string(), *correct, Utc::now(), 60.0);
        }
        history
    }

    #[tokio::test]
    async fn empty_history_yields_zero_confidence() {
        let analyzer = HeuristicAnalyzer::new();
        let signals = analyzer.analyze(&history_with(&[]), None).await.unwrap();
        assert_eq!(signals.conceptual_gap, "No attempts recorded");
        assert!((signals.confidence - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn heuristic_is_deterministic() {
        let analyzer = HeuristicAnalyzer::new();
        let history = history_with(&[("x = 6", false), ("x = 5", false), ("x = 4", true)]);
        let a = analyzer.analyze(&history, None).await.unwrap();
        let b = analyzer.analyze(&history, None).await.unwrap();
        assert_eq!(a.conceptual_gap, b.conceptual_gap);
        assert_eq!(a.learning_summary, b.learning_summary);
        assert!((a.confidence - b.confidence).abs() < 1e-12);
    }

    #[tokio::test]
    async fn first_attempt_success_reads_as_no_gap() {
        let analyzer = HeuristicAnalyzer::new();
        let signals = analyzer
            .analyze(&history_with(&[("4", true)]), None)
            .await
            .unwrap();
        assert!(signals.conceptual_gap.contains("No gaps detected"));
        assert!(signals.confidence_correctness_gap < 0.0);
        assert!((signals.confidence - 0.65).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeated_failures_flag_a_misconception_pattern() {
        let analyzer = HeuristicAnalyzer::new();
        let signals = analyzer
            .analyze(
                &history_with(&[("a", false), ("b", false), ("c", false)]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(signals.misconception_patterns.len(), 1);
        assert!(signals.conceptual_gap.contains("Fundamental misunderstanding"));
        assert!(signals.confidence_correctness_gap > 0.0);
    }

    #[tokio::test]
    async fn confidence_caps_below_one() {
        let analyzer = HeuristicAnalyzer::new();
        let attempts: Vec<(&str, bool)> = vec![("a", false); 10];
        let signals = analyzer
            .analyze(&history_with(&attempts), None)
            .await
            .unwrap();
        assert!((signals.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn api_analyzer_requires_a_key() {
        let config = ApiAnalyzerConfig {
            api_key: String::new(),
            ..ApiAnalyzerConfig::default()
        };
        assert!(matches!(
            ApiAnalyzer::new(config),
            Err(DetectionError::Analyzer(_))
        ));
    }

    #[test]
    fn prompt_carries_every_attempt() {
        let history = history_with(&[("x = 6", false), ("x = 4", true)]);
        let prompt = ApiAnalyzer::build_prompt(&history, Some("Solve: 2x + 5 = 13"));
        assert!(prompt.contains("Attempt 1"));
        assert!(prompt.contains("Attempt 2"));
        assert!(prompt.contains("Solve: 2x + 5 = 13"));
        assert!(prompt.contains("conceptual_gap"));
    }
}
