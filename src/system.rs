//! The detection pipeline behind one explicit instance. `DetectionSystem`
//! owns the event collector, the analyzer handle with its heuristic fallback,
//! the scoring and classification stack, and the per-key history that feeds
//! momentum direction and intervention tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::analyzer::{HeuristicAnalyzer, ReasoningAnalyzer};
use crate::classifier::Classifier;
use crate::collector::EventCollector;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::models::{
    AttemptHistory, Classification, CompetitionContext, DropoutType, EventPayload, FeatureSet,
    InterventionSignals, LearningEvent, MomentumIndex, NavigationKind, RiskScore, Role,
};
use crate::views::{self, StudentFeedback, TeacherReport};

const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(10);

/// One role-scoped result of `analyze`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum AnalysisView {
    Student(StudentFeedback),
    Teacher(TeacherReport),
}

impl AnalysisView {
    pub fn render_markdown(&self) -> String {
        match self {
            AnalysisView::Student(feedback) => views::render_student_markdown(feedback),
            AnalysisView::Teacher(report) => views::render_teacher_markdown(report),
        }
    }
}

/// Everything one analysis pass produced, before role scoping.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub features: FeatureSet,
    pub momentum: MomentumIndex,
    pub risk: RiskScore,
    pub classification: Classification,
    pub degraded_analysis: bool,
}

/// Compact record of one past analysis, kept per (student, question) key.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSnapshot {
    pub at: DateTime<Utc>,
    pub lmi: f64,
    pub drs: f64,
    pub is_dropout: bool,
    pub dropout_types: Vec<DropoutType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterventionRecord {
    pub kind: String,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct KeyHistory {
    snapshots: Vec<AnalysisSnapshot>,
    interventions: Vec<InterventionRecord>,
}

pub struct DetectionSystem {
    collector: Arc<EventCollector>,
    analyzer: Arc<dyn ReasoningAnalyzer>,
    fallback: HeuristicAnalyzer,
    classifier: Classifier,
    analyzer_timeout: Duration,
    histories: Mutex<HashMap<(String, String), KeyHistory>>,
}

impl Default for DetectionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionSystem {
    /// A system backed by the deterministic heuristic analyzer.
    pub fn new() -> Self {
        Self::with_analyzer(Arc::new(HeuristicAnalyzer::new()), DEFAULT_ANALYZER_TIMEOUT)
    }

    pub fn with_analyzer(
        analyzer: Arc<dyn ReasoningAnalyzer>,
        analyzer_timeout: Duration,
    ) -> Self {
        Self {
            collector: Arc::new(EventCollector::new()),
            analyzer,
            fallback: HeuristicAnalyzer::new(),
            classifier: Classifier::default(),
            analyzer_timeout,
            histories: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &EventCollector {
        &self.collector
    }

    fn histories(&self) -> MutexGuard<'_, HashMap<(String, String), KeyHistory>> {
        self.histories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Recording delegates straight to the collector; nothing on this path
    // touches the analyzer.

    pub fn record_at(
        &self,
        student_id: &str,
        question_id: &str,
        payload: EventPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<Arc<LearningEvent>> {
        self.collector.record_at(student_id, question_id, payload, timestamp)
    }

    pub fn record_question_start(
        &self,
        student_id: &str,
        question_id: &str,
        question_content: Option<String>,
    ) -> Result<Arc<LearningEvent>> {
        self.collector
            .record_question_start(student_id, question_id, question_content)
    }

    pub fn record_submit(
        &self,
        student_id: &str,
        question_id: &str,
        answer: &str,
        is_correct: bool,
        time_spent_seconds: f64,
    ) -> Result<Arc<LearningEvent>> {
        self.collector
            .record_submit(student_id, question_id, answer, is_correct, time_spent_seconds)
    }

    pub fn record_revision(
        &self,
        student_id: &str,
        question_id: &str,
        original_answer: &str,
        revised_answer: &str,
        revision_reason: Option<String>,
    ) -> Result<Arc<LearningEvent>> {
        self.collector.record_revision(
            student_id,
            question_id,
            original_answer,
            revised_answer,
            revision_reason,
        )
    }

    pub fn record_navigation(
        &self,
        student_id: &str,
        question_id: &str,
        nav: NavigationKind,
        destination_question_id: Option<String>,
    ) -> Result<Arc<LearningEvent>> {
        self.collector
            .record_navigation(student_id, question_id, nav, destination_question_id)
    }

    pub fn record_hint_request(
        &self,
        student_id: &str,
        question_id: &str,
        hint_level: u32,
    ) -> Result<Arc<LearningEvent>> {
        self.collector
            .record_hint_request(student_id, question_id, hint_level)
    }

    pub fn record_focus_lost(
        &self,
        student_id: &str,
        question_id: &str,
        idle_duration_seconds: f64,
    ) -> Result<Arc<LearningEvent>> {
        self.collector
            .record_focus_lost(student_id, question_id, idle_duration_seconds)
    }

    pub fn record_focus_gained(
        &self,
        student_id: &str,
        question_id: &str,
    ) -> Result<Arc<LearningEvent>> {
        self.collector.record_focus_gained(student_id, question_id)
    }

    pub fn record_session_start(&self, student_id: &str) -> Result<Arc<LearningEvent>> {
        self.collector.record_session_start(student_id)
    }

    pub fn record_session_end(&self, student_id: &str) -> Result<Arc<LearningEvent>> {
        self.collector.record_session_end(student_id)
    }

    /// Log an intervention for a key. Subsequent analyses fold it into the
    /// intervention-response signal category.
    pub fn flag_for_intervention(
        &self,
        student_id: &str,
        question_id: &str,
        kind: &str,
        notes: Option<String>,
    ) {
        self.flag_for_intervention_at(student_id, question_id, kind, notes, Utc::now());
    }

    pub fn flag_for_intervention_at(
        &self,
        student_id: &str,
        question_id: &str,
        kind: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        let mut histories = self.histories();
        let entry = histories
            .entry((student_id.to_string(), question_id.to_string()))
            .or_default();
        entry.interventions.push(InterventionRecord {
            kind: kind.to_string(),
            notes,
            at,
        });
    }

    pub fn snapshots(&self, student_id: &str, question_id: &str) -> Vec<AnalysisSnapshot> {
        self.histories()
            .get(&(student_id.to_string(), question_id.to_string()))
            .map(|h| h.snapshots.clone())
            .unwrap_or_default()
    }

    pub fn interventions(&self, student_id: &str, question_id: &str) -> Vec<InterventionRecord> {
        self.histories()
            .get(&(student_id.to_string(), question_id.to_string()))
            .map(|h| h.interventions.clone())
            .unwrap_or_default()
    }

    /// Run the full pipeline for one key and return the role-scoped view.
    pub async fn analyze(
        &self,
        student_id: &str,
        question_id: &str,
        question_context: Option<&str>,
        competition: Option<CompetitionContext>,
        role: Role,
    ) -> Result<AnalysisView> {
        let outcome = self
            .analyze_outcome(student_id, question_id, question_context, competition)
            .await?;
        Ok(match role {
            Role::Student => AnalysisView::Student(views::student_feedback(
                &outcome.features,
                &outcome.classification,
            )),
            Role::Teacher => AnalysisView::Teacher(views::teacher_report(
                &outcome.features,
                &outcome.classification,
                &outcome.momentum,
                &outcome.risk,
                outcome.degraded_analysis,
            )),
        })
    }

    /// The unscoped pipeline: extract, analyze reasoning, score, classify,
    /// and append the per-key snapshot.
    pub async fn analyze_outcome(
        &self,
        student_id: &str,
        question_id: &str,
        question_context: Option<&str>,
        competition: Option<CompetitionContext>,
    ) -> Result<AnalysisOutcome> {
        let extractor = FeatureExtractor::new(&self.collector);
        let mut features = extractor.comprehensive(student_id, question_id, competition);
        let history = self.collector.build_attempt_history(student_id, question_id);

        let (reasoning, degraded_analysis) = match tokio::time::timeout(
            self.analyzer_timeout,
            self.analyzer.analyze(&history, question_context),
        )
        .await
        {
            Ok(Ok(signals)) => (signals, false),
            Ok(Err(err)) => {
                warn!(
                    analyzer = self.analyzer.name(),
                    error = %err,
                    "analyzer failed, using heuristic fallback"
                );
                (self.fallback.assess(&history), true)
            }
            Err(_) => {
                warn!(
                    analyzer = self.analyzer.name(),
                    timeout_ms = self.analyzer_timeout.as_millis() as u64,
                    "analyzer timed out, using heuristic fallback"
                );
                (self.fallback.assess(&history), true)
            }
        };
        features.reasoning = reasoning;

        let key = (student_id.to_string(), question_id.to_string());
        let lmi_trend: Vec<f64> = {
            let histories = self.histories();
            if let Some(entry) = histories.get(&key) {
                if let Some(record) = entry.interventions.last() {
                    features.intervention = intervention_signals(record, &history);
                }
                entry.snapshots.iter().map(|s| s.lmi).collect()
            } else {
                Vec::new()
            }
        };

        let scoring = self.classifier.scoring();
        let momentum = scoring.momentum_index(&features, &lmi_trend);
        let risk = scoring.risk_score(&features, &momentum);
        let classification = self.classifier.classify(&features, &momentum, &risk)?;

        debug!(
            student_id,
            question_id,
            lmi = momentum.score,
            drs = risk.score,
            is_dropout = classification.is_dropout,
            "analysis complete"
        );

        self.histories()
            .entry(key)
            .or_default()
            .snapshots
            .push(AnalysisSnapshot {
                at: features.as_of,
                lmi: momentum.score,
                drs: risk.score,
                is_dropout: classification.is_dropout,
                dropout_types: classification.dropout_types.clone(),
            });

        Ok(AnalysisOutcome {
            features,
            momentum,
            risk,
            classification,
            degraded_analysis,
        })
    }
}

/// Fold the latest intervention record into the intervention-response
/// category by contrasting correctness before and after it.
fn intervention_signals(
    record: &InterventionRecord,
    history: &AttemptHistory,
) -> InterventionSignals {
    let (before, after): (Vec<_>, Vec<_>) = history
        .attempts
        .iter()
        .partition(|attempt| attempt.timestamp <= record.at);

    let ratio = |attempts: &[&crate::models::Attempt]| {
        if attempts.is_empty() {
            0.0
        } else {
            attempts.iter().filter(|a| a.is_correct).count() as f64 / attempts.len() as f64
        }
    };

    let pre_ratio = ratio(&before);
    let post_ratio = ratio(&after);
    let post_intervention_progress = post_ratio * 100.0;
    let recovery_score = ((post_ratio - pre_ratio).max(0.0) * 100.0).min(100.0);

    InterventionSignals {
        intervention_triggered: true,
        intervention_type: Some(record.kind.clone()),
        intervention_timestamp: Some(record.at),
        post_intervention_progress,
        recovery_score,
        intervention_success_flag: !after.is_empty() && post_ratio > pre_ratio,
    }
}
