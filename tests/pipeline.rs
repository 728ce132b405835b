//! End-to-end pipeline tests: seed a scenario, run the analysis, and check
//! the classification and views that come out the other side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use dropout_early_warning::analyzer::ReasoningAnalyzer;
use dropout_early_warning::error::{DetectionError, Result};
use dropout_early_warning::models::{
    AttemptHistory, DropoutType, EventPayload, ReasoningSignals, Role,
};
use dropout_early_warning::scenarios::{self, ScenarioKind};
use dropout_early_warning::system::{AnalysisView, DetectionSystem};
use dropout_early_warning::views;

fn submit(answer: &str, is_correct: bool, time_spent_seconds: f64) -> EventPayload {
    EventPayload::QuestionSubmit {
        answer: answer.to_string(),
        is_correct,
        time_spent_seconds,
    }
}

#[tokio::test]
async fn identical_logs_classify_identically() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let system = DetectionSystem::new();
        let seeded = scenarios::seed(&system, ScenarioKind::Cognitive).await.unwrap();
        let outcome = system
            .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
            .await
            .unwrap();
        runs.push(outcome);
    }

    let (a, b) = (&runs[0], &runs[1]);
    assert_eq!(a.classification.is_dropout, b.classification.is_dropout);
    assert_eq!(a.classification.dropout_types, b.classification.dropout_types);
    assert_eq!(a.classification.primary_reason, b.classification.primary_reason);
    assert_eq!(a.classification.recommendation, b.classification.recommendation);
    assert!((a.momentum.score - b.momentum.score).abs() < 1e-12);
    assert!((a.risk.score - b.risk.score).abs() < 1e-12);
    assert!((a.classification.confidence - b.classification.confidence).abs() < 1e-12);
}

#[tokio::test]
async fn out_of_order_events_are_rejected() {
    let system = DetectionSystem::new();
    let later = Utc.with_ymd_and_hms(2026, 3, 5, 9, 10, 0).unwrap();
    let earlier = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();

    system
        .record_at("stu-1", "q-1", submit("x = 4", true, 45.0), later)
        .unwrap();
    let err = system
        .record_at("stu-1", "q-2", submit("x = 5", false, 30.0), earlier)
        .unwrap_err();
    assert!(matches!(err, DetectionError::OrderingViolation { .. }));
    // The rejected event never landed.
    assert_eq!(system.collector().event_count(), 1);
}

#[tokio::test]
async fn scores_and_confidence_stay_in_bounds() {
    for kind in ScenarioKind::all() {
        let system = DetectionSystem::new();
        let seeded = scenarios::seed(&system, kind).await.unwrap();
        let outcome = system
            .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
            .await
            .unwrap();

        assert!(
            (0.0..=100.0).contains(&outcome.momentum.score),
            "{}: lmi {}",
            kind.name(),
            outcome.momentum.score
        );
        assert!(
            (0.0..=1.0).contains(&outcome.risk.score),
            "{}: drs {}",
            kind.name(),
            outcome.risk.score
        );
        assert!(
            (0.3..=1.0).contains(&outcome.classification.confidence),
            "{}: confidence {}",
            kind.name(),
            outcome.classification.confidence
        );
    }
}

#[tokio::test]
async fn unseen_key_gets_a_neutral_healthy_baseline() {
    let system = DetectionSystem::new();
    let outcome = system
        .analyze_outcome("nobody", "nothing", None, None)
        .await
        .unwrap();

    assert!(!outcome.classification.is_dropout);
    assert!(outcome.classification.dropout_types.is_empty());
    assert!((outcome.momentum.score - 50.0).abs() < 1e-9);
    assert!((outcome.risk.score - 0.0).abs() < 1e-9);
    assert!((outcome.classification.confidence - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn healthy_scenario_raises_no_flags() {
    let system = DetectionSystem::new();
    let seeded = scenarios::seed(&system, ScenarioKind::Healthy).await.unwrap();
    let outcome = system
        .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
        .await
        .unwrap();

    assert!(!outcome.classification.is_dropout);
    assert!(outcome.classification.dropout_types.is_empty());
    assert!(outcome.momentum.score > 70.0);
    assert!(outcome.risk.score < 0.3);
}

#[tokio::test]
async fn cognitive_scenario_is_flagged_with_low_momentum() {
    let system = DetectionSystem::new();
    let seeded = scenarios::seed(&system, ScenarioKind::Cognitive).await.unwrap();
    let outcome = system
        .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
        .await
        .unwrap();

    assert!(outcome.classification.is_dropout);
    assert!(outcome
        .classification
        .dropout_types
        .contains(&DropoutType::Cognitive));
    assert!(outcome.momentum.score < 50.0);
}

#[tokio::test]
async fn silent_collapse_is_flagged_despite_healthy_surface_signals() {
    let system = DetectionSystem::new();
    let seeded = scenarios::seed(&system, ScenarioKind::Silent).await.unwrap();
    let outcome = system
        .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
        .await
        .unwrap();

    assert!(outcome
        .classification
        .dropout_types
        .contains(&DropoutType::Silent));
    assert!(outcome.features.disengagement.consistency_score > 50.0);
    assert!(!outcome.features.disengagement.average_gap_increasing);
}

#[tokio::test]
async fn student_view_leaks_no_risk_detail() {
    let system = DetectionSystem::new();
    let seeded = scenarios::seed(&system, ScenarioKind::Cognitive).await.unwrap();

    let view = system
        .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Student)
        .await
        .unwrap();
    assert!(matches!(view, AnalysisView::Student(_)));

    let markdown = view.render_markdown().to_lowercase();
    let json = serde_json::to_string(&view).unwrap().to_lowercase();
    for text in [markdown, json] {
        assert!(!text.contains("dropout"));
        assert!(!text.contains("risk"));
        assert!(!text.contains("urgent"));
        assert!(!text.contains("critical"));
    }
}

#[tokio::test]
async fn views_render_byte_identically_from_one_analysis() {
    let system = DetectionSystem::new();
    let seeded = scenarios::seed(&system, ScenarioKind::Struggling).await.unwrap();
    let outcome = system
        .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
        .await
        .unwrap();

    let feedback = views::student_feedback(&outcome.features, &outcome.classification);
    assert_eq!(
        views::render_student_markdown(&feedback),
        views::render_student_markdown(&feedback)
    );

    let report = views::teacher_report(
        &outcome.features,
        &outcome.classification,
        &outcome.momentum,
        &outcome.risk,
        outcome.degraded_analysis,
    );
    assert_eq!(
        views::render_teacher_markdown(&report),
        views::render_teacher_markdown(&report)
    );
}

struct FailingAnalyzer;

#[async_trait]
impl ReasoningAnalyzer for FailingAnalyzer {
    async fn analyze(
        &self,
        _history: &AttemptHistory,
        _question_context: Option<&str>,
    ) -> Result<ReasoningSignals> {
        Err(DetectionError::Analyzer("provider unreachable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn analyzer_failure_degrades_gracefully_and_is_annotated() {
    let system =
        DetectionSystem::with_analyzer(Arc::new(FailingAnalyzer), Duration::from_millis(100));
    let seeded = scenarios::seed(&system, ScenarioKind::Cognitive).await.unwrap();

    let outcome = system
        .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
        .await
        .unwrap();
    assert!(outcome.degraded_analysis);
    // The heuristic fallback still classifies the scenario.
    assert!(outcome.classification.is_dropout);

    let view = system
        .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Teacher)
        .await
        .unwrap();
    assert!(view.render_markdown().contains("degraded to heuristics"));
}

#[tokio::test]
async fn struggling_walkthrough_produces_both_views() {
    let system = DetectionSystem::new();
    let seeded = scenarios::seed(&system, ScenarioKind::Struggling).await.unwrap();

    let teacher = system
        .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Teacher)
        .await
        .unwrap();
    let teacher_markdown = teacher.render_markdown();
    assert!(teacher_markdown.contains("Dropout risk detected"));
    assert!(teacher_markdown.contains("## Intervention"));

    let student = system
        .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Student)
        .await
        .unwrap();
    let student_markdown = student.render_markdown();
    assert!(student_markdown.contains("## Support Available"));
}
