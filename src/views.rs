//! Role-scoped views over one analysis. The student view is supportive and
//! never exposes risk scoring; the teacher view carries the full diagnostic
//! detail. Both are pure functions of their inputs, so rendering the same
//! analysis twice yields byte-identical output.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    Classification, FeatureSet, LearningState, MomentumIndex, RiskLevel, RiskScore,
};

/// Concrete supportive actions surfaced to the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportAction {
    OfferHint,
    SuggestResource,
    MotivationalCheckIn,
    ConceptualSupport,
}

impl SupportAction {
    pub fn label(self) -> &'static str {
        match self {
            SupportAction::OfferHint => "A hint is available for this question",
            SupportAction::SuggestResource => "Review the related practice material",
            SupportAction::MotivationalCheckIn => "Take a short break, then come back fresh",
            SupportAction::ConceptualSupport => "Revisit the underlying concept before retrying",
        }
    }
}

/// What the student sees. No risk scores, no classification labels.
#[derive(Debug, Clone, Serialize)]
pub struct StudentFeedback {
    pub question_id: String,
    pub generated_at: DateTime<Utc>,
    pub progress_summary: String,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
    pub support_actions: Vec<SupportAction>,
    pub difficulty_suggestion: String,
    pub encouragement: String,
}

const ENCOURAGEMENTS: [&str; 4] = [
    "Keep going, effort is how understanding is built.",
    "Every attempt teaches you something, even the wrong ones.",
    "You are closer than you think. Stay with it.",
    "Wrestling with a hard problem is exactly how learning feels.",
];

pub fn student_feedback(features: &FeatureSet, classification: &Classification) -> StudentFeedback {
    let progress = &features.learning_progress;

    let mut strengths = Vec::new();
    if progress.improvement_score > 60.0 {
        strengths.push("Your answers are getting measurably better with each attempt".to_string());
    }
    if progress.attempt_count >= 3 && !features.stagnation.is_stalled {
        strengths.push("You keep trying instead of giving up".to_string());
    }
    if features.disengagement.consistency_score > 70.0 {
        strengths.push("You work at a steady, regular pace".to_string());
    }
    if strengths.is_empty() {
        strengths.push("Every attempt you make is a step forward".to_string());
    }

    let mut growth_areas = Vec::new();
    if progress.no_progress_flag {
        growth_areas
            .push("Try rethinking your approach rather than making small edits".to_string());
    }
    if features.reasoning.confidence_correctness_gap > 20.0 {
        growth_areas.push("Slow down and double-check your reasoning before submitting".to_string());
    }
    if progress.semantic_change_score < 40.0 && progress.attempt_count >= 2 {
        growth_areas.push("Your revisions are mostly cosmetic. What would a different method look like?".to_string());
    }

    let mut support_actions = Vec::new();
    if features.stagnation.is_stalled {
        support_actions.push(SupportAction::OfferHint);
    }
    if !features.reasoning.misconception_patterns.is_empty() {
        support_actions.push(SupportAction::SuggestResource);
    }
    if features.disengagement.average_gap_increasing {
        support_actions.push(SupportAction::MotivationalCheckIn);
    }
    if progress.semantic_change_score < 40.0 && progress.attempt_count >= 3 {
        support_actions.push(SupportAction::ConceptualSupport);
    }

    let difficulty_suggestion = match progress.learning_state {
        LearningState::Progressing => {
            "You are ready for more challenging problems.".to_string()
        }
        LearningState::Plateau => {
            "Staying at this level for a few more problems will cement what you know.".to_string()
        }
        LearningState::Stalled => {
            "A slightly easier problem could help rebuild momentum before returning here."
                .to_string()
        }
    };

    let encouragement =
        ENCOURAGEMENTS[progress.attempt_count % ENCOURAGEMENTS.len()].to_string();

    let progress_summary = if progress.attempt_count == 0 {
        "You have not attempted this question yet.".to_string()
    } else {
        format!(
            "You have made {} attempt(s) on this question. {}",
            progress.attempt_count,
            match progress.learning_state {
                LearningState::Progressing => "Your recent attempts show real improvement.",
                LearningState::Plateau => "Your results are holding steady.",
                LearningState::Stalled => "This one is putting up a fight.",
            }
        )
    };

    StudentFeedback {
        question_id: features.question_id.clone(),
        generated_at: classification.classified_at,
        progress_summary,
        strengths,
        growth_areas,
        support_actions,
        difficulty_suggestion,
        encouragement,
    }
}

/// Intervention guidance attached to the teacher report.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionGuidance {
    pub should_intervene: bool,
    pub recommendation: String,
    pub urgency: &'static str,
    pub follow_up_hours: u32,
}

/// What the teacher sees: full scores, signals, and guidance.
#[derive(Debug, Clone, Serialize)]
pub struct TeacherReport {
    pub student_id: String,
    pub question_id: String,
    pub generated_at: DateTime<Utc>,
    pub is_dropout: bool,
    pub dropout_type_labels: Vec<&'static str>,
    pub primary_reason: String,
    pub lmi_score: f64,
    pub lmi_direction: String,
    pub lmi_interpretation: &'static str,
    pub drs_score: f64,
    pub drs_level: &'static str,
    pub drs_interpretation: &'static str,
    pub confidence: f64,
    pub risk_factor_labels: Vec<&'static str>,
    pub features: FeatureSet,
    pub intervention: InterventionGuidance,
    /// True when the reasoning analyzer fell back to heuristics.
    pub degraded_analysis: bool,
}

fn lmi_interpretation(score: f64) -> &'static str {
    if score > 70.0 {
        "Healthy learning momentum."
    } else if score >= 40.0 {
        "At-risk momentum. Monitor closely."
    } else {
        "Risk trajectory. Intervention warranted."
    }
}

fn drs_interpretation(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Minimal dropout risk at present.",
        RiskLevel::Medium => "Moderate risk. Keep this student on the radar.",
        RiskLevel::High => "High risk. Plan an intervention soon.",
        RiskLevel::Critical => "Critical risk. Intervene immediately.",
    }
}

fn follow_up_hours(drs: f64) -> u32 {
    if drs > 0.8 {
        1
    } else if drs > 0.6 {
        6
    } else if drs > 0.3 {
        24
    } else {
        72
    }
}

pub fn teacher_report(
    features: &FeatureSet,
    classification: &Classification,
    momentum: &MomentumIndex,
    risk: &RiskScore,
    degraded_analysis: bool,
) -> TeacherReport {
    let intervention = InterventionGuidance {
        should_intervene: classification.is_dropout,
        recommendation: classification.recommendation.clone(),
        urgency: risk.level.label(),
        follow_up_hours: follow_up_hours(risk.score),
    };

    TeacherReport {
        student_id: features.student_id.clone(),
        question_id: features.question_id.clone(),
        generated_at: classification.classified_at,
        is_dropout: classification.is_dropout,
        dropout_type_labels: classification
            .dropout_types
            .iter()
            .map(|t| t.label())
            .collect(),
        primary_reason: classification.primary_reason.clone(),
        lmi_score: momentum.score,
        lmi_direction: format!("{:?}", momentum.direction).to_uppercase(),
        lmi_interpretation: lmi_interpretation(momentum.score),
        drs_score: risk.score,
        drs_level: risk.level.label(),
        drs_interpretation: drs_interpretation(risk.level),
        confidence: classification.confidence,
        risk_factor_labels: classification
            .risk_factors
            .iter()
            .map(|f| f.label())
            .collect(),
        features: features.clone(),
        intervention,
        degraded_analysis,
    }
}

pub fn render_student_markdown(feedback: &StudentFeedback) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Your Progress on {}", feedback.question_id);
    let _ = writeln!(output, "{}", feedback.progress_summary);
    let _ = writeln!(output);
    let _ = writeln!(output, "## What You Are Doing Well");
    for strength in feedback.strengths.iter() {
        let _ = writeln!(output, "- {}", strength);
    }

    if !feedback.growth_areas.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Ideas to Try Next");
        for area in feedback.growth_areas.iter() {
            let _ = writeln!(output, "- {}", area);
        }
    }

    if !feedback.support_actions.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Support Available");
        for action in feedback.support_actions.iter() {
            let _ = writeln!(output, "- {}", action.label());
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "{}", feedback.difficulty_suggestion);
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", feedback.encouragement);

    output
}

pub fn render_teacher_markdown(report: &TeacherReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Learning Analysis: {} / {}",
        report.student_id, report.question_id
    );
    let _ = writeln!(output, "Generated at {}", report.generated_at);
    if report.degraded_analysis {
        let _ = writeln!(
            output,
            "Note: reasoning analysis degraded to heuristics for this report."
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Status");
    if report.is_dropout {
        let _ = writeln!(
            output,
            "Dropout risk detected: {}",
            report.dropout_type_labels.join(", ")
        );
    } else {
        let _ = writeln!(output, "No dropout risk detected.");
    }
    let _ = writeln!(output, "{}", report.primary_reason);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Scores");
    let _ = writeln!(
        output,
        "- Learning Momentum Index: {:.1} ({}). {}",
        report.lmi_score, report.lmi_direction, report.lmi_interpretation
    );
    let _ = writeln!(
        output,
        "- Dropout Risk Score: {:.2} ({}). {}",
        report.drs_score, report.drs_level, report.drs_interpretation
    );
    let _ = writeln!(output, "- Classification confidence: {:.2}", report.confidence);

    if !report.risk_factor_labels.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Primary Risk Factors");
        for label in report.risk_factor_labels.iter() {
            let _ = writeln!(output, "- {}", label);
        }
    }

    let features = &report.features;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Signals");
    let _ = writeln!(
        output,
        "- Progress: {} attempts, improvement {:.0}, semantic change {:.0}%, state {:?}",
        features.learning_progress.attempt_count,
        features.learning_progress.improvement_score,
        features.learning_progress.semantic_change_score,
        features.learning_progress.learning_state
    );
    let _ = writeln!(
        output,
        "- Stagnation: {:.1} min on task, {} repeats, stalled {}, severity {:.0}",
        features.stagnation.stagnation_duration_minutes,
        features.stagnation.repeat_attempt_count,
        features.stagnation.is_stalled,
        features.stagnation.stagnation_severity
    );
    let _ = writeln!(
        output,
        "- Integrity: score {:.0}, continuity {:?}, sudden jump {}, assistance likelihood {:.2}",
        features.integrity.integrity_score,
        features.integrity.reasoning_continuity,
        features.integrity.sudden_jump_flag,
        features.integrity.external_assistance_likelihood
    );
    let _ = writeln!(
        output,
        "- Reasoning: confidence {:.2}, {} misconception pattern(s)",
        features.reasoning.confidence,
        features.reasoning.misconception_patterns.len()
    );
    if !features.reasoning.conceptual_gap.is_empty() {
        let _ = writeln!(output, "  Gap: {}", features.reasoning.conceptual_gap);
    }
    if !features.reasoning.learning_summary.is_empty() {
        let _ = writeln!(output, "  Summary: {}", features.reasoning.learning_summary);
    }
    match (
        features.competition.latest_rank,
        features.competition.rank_delta,
    ) {
        (Some(rank), Some(delta)) => {
            let _ = writeln!(
                output,
                "- Competition: rank {} (delta {:+}), pressure {}",
                rank, delta, features.competition.competition_pressure_flag
            );
        }
        _ => {
            let _ = writeln!(output, "- Competition: no rank context supplied");
        }
    }
    let _ = writeln!(
        output,
        "- Engagement: consistency {:.0}, gaps widening {}",
        features.disengagement.consistency_score,
        features.disengagement.average_gap_increasing
    );
    if features.intervention.intervention_triggered {
        let _ = writeln!(
            output,
            "- Intervention: {} recorded, recovery {:.0}, successful {}",
            features
                .intervention
                .intervention_type
                .as_deref()
                .unwrap_or("unspecified"),
            features.intervention.recovery_score,
            features.intervention.intervention_success_flag
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Intervention");
    if report.intervention.should_intervene {
        let _ = writeln!(output, "{}", report.intervention.recommendation);
        let _ = writeln!(
            output,
            "Urgency {}. Follow up within {} hour(s).",
            report.intervention.urgency, report.intervention.follow_up_hours
        );
    } else {
        let _ = writeln!(output, "{}", report.intervention.recommendation);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::models::{
        CompetitionSignals, DisengagementSignals, DropoutType, IntegritySignals,
        InterventionSignals, LearningProgressSignals, MomentumDirection, ReasoningSignals,
        RiskFactor, StagnationSignals,
    };

    fn sample_features() -> FeatureSet {
        let mut progress = LearningProgressSignals::default();
        progress.attempt_count = 4;
        progress.improvement_score = 10.0;
        progress.semantic_change_score = 20.0;
        progress.no_progress_flag = true;
        progress.learning_state = LearningState::Stalled;

        let mut stagnation = StagnationSignals::default();
        stagnation.is_stalled = true;
        stagnation.stagnation_duration_minutes = 22.0;
        stagnation.repeat_attempt_count = 4;
        stagnation.stagnation_severity = 84.0;

        FeatureSet {
            student_id: "stu-9".to_string(),
            question_id: "q-7".to_string(),
            as_of: Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            learning_progress: progress,
            stagnation,
            integrity: IntegritySignals::default(),
            reasoning: ReasoningSignals {
                conceptual_gap: "Fundamental misunderstanding - requires intervention".to_string(),
                learning_summary: String::new(),
                confidence: 0.9,
                misconception_patterns: vec!["Repeated error pattern detected".to_string()],
                confidence_correctness_gap: 0.3,
            },
            competition: CompetitionSignals::default(),
            disengagement: DisengagementSignals::default(),
            intervention: InterventionSignals::default(),
        }
    }

    fn sample_classification(features: &FeatureSet) -> Classification {
        Classification {
            is_dropout: true,
            dropout_types: vec![DropoutType::Cognitive],
            primary_reason: "Cognitive: Fundamental misunderstanding - requires intervention"
                .to_string(),
            recommendation: "URGENT: Provide step-by-step concept review and worked examples. \
                             Identify and address root misconceptions."
                .to_string(),
            lmi_score: 12.0,
            drs_score: 0.82,
            confidence: 0.9,
            risk_factors: vec![RiskFactor::Stagnation, RiskFactor::DecliningMomentum],
            classified_at: features.as_of,
        }
    }

    fn sample_momentum(features: &FeatureSet) -> MomentumIndex {
        MomentumIndex {
            score: 12.0,
            direction: MomentumDirection::Decelerating,
            decay_rate: 0.21,
            computed_at: features.as_of,
        }
    }

    fn sample_risk(features: &FeatureSet) -> RiskScore {
        RiskScore {
            score: 0.82,
            confidence: 0.8,
            level: RiskLevel::Critical,
            primary_factors: vec![RiskFactor::Stagnation, RiskFactor::DecliningMomentum],
            computed_at: features.as_of,
        }
    }

    #[test]
    fn student_view_never_mentions_risk_language() {
        let features = sample_features();
        let classification = sample_classification(&features);
        let feedback = student_feedback(&features, &classification);

        let rendered = render_student_markdown(&feedback);
        let json = serde_json::to_string(&feedback).unwrap();
        for text in [rendered.to_lowercase(), json.to_lowercase()] {
            assert!(!text.contains("dropout"));
            assert!(!text.contains("risk"));
            assert!(!text.contains("0.82"));
            assert!(!text.contains("critical"));
        }
    }

    #[test]
    fn student_view_surfaces_support_actions_for_stall() {
        let features = sample_features();
        let classification = sample_classification(&features);
        let feedback = student_feedback(&features, &classification);
        assert!(feedback.support_actions.contains(&SupportAction::OfferHint));
        assert!(feedback
            .support_actions
            .contains(&SupportAction::SuggestResource));
        assert!(feedback
            .support_actions
            .contains(&SupportAction::ConceptualSupport));
        assert!(feedback.difficulty_suggestion.contains("easier"));
    }

    #[test]
    fn teacher_report_carries_full_detail() {
        let features = sample_features();
        let classification = sample_classification(&features);
        let report = teacher_report(
            &features,
            &classification,
            &sample_momentum(&features),
            &sample_risk(&features),
            false,
        );

        assert!(report.is_dropout);
        assert_eq!(report.dropout_type_labels, vec!["COGNITIVE"]);
        assert_eq!(report.drs_level, "CRITICAL");
        assert_eq!(report.intervention.follow_up_hours, 1);
        assert!(report.intervention.should_intervene);

        let rendered = render_teacher_markdown(&report);
        assert!(rendered.contains("Dropout risk detected: COGNITIVE"));
        assert!(rendered.contains("Learning Momentum Index: 12.0"));
        assert!(rendered.contains("Stagnation on problem"));
        assert!(rendered.contains("URGENT:"));
    }

    #[test]
    fn degraded_analysis_is_annotated() {
        let features = sample_features();
        let classification = sample_classification(&features);
        let report = teacher_report(
            &features,
            &classification,
            &sample_momentum(&features),
            &sample_risk(&features),
            true,
        );
        let rendered = render_teacher_markdown(&report);
        assert!(rendered.contains("degraded to heuristics"));
    }

    #[test]
    fn follow_up_windows_track_risk() {
        assert_eq!(follow_up_hours(0.9), 1);
        assert_eq!(follow_up_hours(0.7), 6);
        assert_eq!(follow_up_hours(0.5), 24);
        assert_eq!(follow_up_hours(0.1), 72);
    }

    #[test]
    fn rendering_is_idempotent() {
        let features = sample_features();
        let classification = sample_classification(&features);
        let feedback = student_feedback(&features, &classification);
        assert_eq!(
            render_student_markdown(&feedback),
            render_student_markdown(&feedback)
        );

        let report = teacher_report(
            &features,
            &classification,
            &sample_momentum(&features),
            &sample_risk(&features),
            false,
        );
        assert_eq!(
            render_teacher_markdown(&report),
            render_teacher_markdown(&report)
        );
    }

    #[test]
    fn encouragement_rotates_with_attempt_count() {
        let features = sample_features();
        let classification = sample_classification(&features);
        let first = student_feedback(&features, &classification);

        let mut more = sample_features();
        more.learning_progress.attempt_count += 1;
        let second = student_feedback(&more, &classification);
        assert_ne!(first.encouragement, second.encouragement);
    }
}
