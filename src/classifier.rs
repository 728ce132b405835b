use tracing::debug;

use crate::error::Result;
use crate::models::{
    Classification, DropoutType, FeatureSet, MomentumDirection, MomentumIndex, RiskFactor,
    RiskLevel, RiskScore,
};
use crate::scoring::{ScoringConfig, ScoringEngine};

/// Everything a rule predicate may read.
pub struct RuleContext<'a> {
    pub features: &'a FeatureSet,
    pub momentum: &'a MomentumIndex,
    pub risk: &'a RiskScore,
    pub config: &'a ScoringConfig,
}

/// One independently testable detection rule. Several rules may target the
/// same dropout type; types are non-exclusive across rules.
pub struct DropoutRule {
    pub dropout_type: DropoutType,
    pub name: &'static str,
    pub predicate: fn(&RuleContext) -> bool,
}

/// The full rule table. Adding a dropout type means appending rows here,
/// not adding a dispatch branch.
pub fn rules() -> Vec<DropoutRule> {
    vec![
        DropoutRule {
            dropout_type: DropoutType::Cognitive,
            name: "low-momentum-shallow-revision",
            predicate: |ctx| {
                ctx.momentum.score < ctx.config.lmi_at_risk
                    && ctx.features.learning_progress.semantic_change_score < 30.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Cognitive,
            name: "repeated-misconceptions",
            predicate: |ctx| {
                ctx.features.reasoning.misconception_patterns.len() >= 2
                    && ctx.features.learning_progress.improvement_score < 40.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Cognitive,
            name: "no-semantic-movement",
            predicate: |ctx| {
                let progress = &ctx.features.learning_progress;
                progress.attempt_count >= 3
                    && progress.semantic_change_score < 20.0
                    && progress.improvement_score < 35.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Cognitive,
            name: "stalled-with-uncertain-reasoning",
            predicate: |ctx| {
                ctx.features.stagnation.is_stalled && ctx.features.reasoning.confidence < 0.4
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Behavioral,
            name: "inconsistent-and-slowing",
            predicate: |ctx| {
                let d = &ctx.features.disengagement;
                d.consistency_score < 40.0 && d.average_gap_increasing
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Behavioral,
            name: "assisted-and-inconsistent",
            predicate: |ctx| {
                ctx.features.integrity.external_assistance_likelihood > 0.7
                    && ctx.features.disengagement.consistency_score < 50.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Behavioral,
            name: "abandonment-length-gap",
            predicate: |ctx| {
                ctx.features
                    .disengagement
                    .attempt_gaps_seconds
                    .iter()
                    .any(|&gap| gap > 600.0)
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Engagement,
            name: "infrequent-and-inconsistent",
            predicate: |ctx| {
                ctx.features.learning_progress.attempt_frequency < 0.2
                    && ctx.features.disengagement.consistency_score < 50.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Engagement,
            name: "pressure-without-improvement",
            predicate: |ctx| {
                ctx.features.competition.competition_pressure_flag
                    && ctx.features.learning_progress.improvement_score < 40.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Engagement,
            name: "no-progress-low-consistency",
            predicate: |ctx| {
                ctx.features.learning_progress.no_progress_flag
                    && ctx.features.disengagement.consistency_score < 60.0
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Engagement,
            name: "widening-gaps",
            predicate: |ctx| {
                ctx.features.disengagement.average_gap_increasing
                    && ctx.features.learning_progress.attempt_count >= 3
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Silent,
            name: "momentum-collapsing-quietly",
            predicate: |ctx| {
                let progress = &ctx.features.learning_progress;
                let disengagement = &ctx.features.disengagement;
                ctx.momentum.direction == MomentumDirection::Decelerating
                    && ctx.momentum.score < 50.0
                    && disengagement.consistency_score > 50.0
                    && !disengagement.average_gap_increasing
                    && (progress.semantic_change_score < 25.0 || progress.no_progress_flag)
            },
        },
        DropoutRule {
            dropout_type: DropoutType::Silent,
            name: "high-risk-without-red-flags",
            predicate: |ctx| {
                ctx.momentum.score < 35.0
                    && ctx.risk.score > 0.7
                    && ctx.features.disengagement.attempt_gaps_seconds.is_empty()
            },
        },
    ]
}

/// Support kinds an intervention recommendation can lead with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportKind {
    Conceptual,
    Strategic,
    Motivational,
    IntegrityCheck,
    General,
}

/// Pick the support kind from the highest-priority detected risk factor.
pub fn support_kind(factors: &[RiskFactor]) -> SupportKind {
    if factors.contains(&RiskFactor::DecliningMomentum) {
        SupportKind::Conceptual
    } else if factors.contains(&RiskFactor::Stagnation) {
        SupportKind::Strategic
    } else if factors.contains(&RiskFactor::CompetitionPressure)
        || factors.contains(&RiskFactor::EngagementDecline)
    {
        SupportKind::Motivational
    } else if factors.contains(&RiskFactor::AuthenticityConcern) {
        SupportKind::IntegrityCheck
    } else {
        SupportKind::General
    }
}

fn support_text(kind: SupportKind) -> &'static str {
    match kind {
        SupportKind::Conceptual => {
            "Provide step-by-step concept review and worked examples. \
             Identify and address root misconceptions."
        }
        SupportKind::Strategic => {
            "Teach problem-solving strategies. Break down complex problems. \
             Provide hints before full solutions."
        }
        SupportKind::Motivational => {
            "Acknowledge effort. Set achievable milestones. \
             Connect learning to personal goals."
        }
        SupportKind::IntegrityCheck => {
            "Review learning authenticity. Provide supportive feedback. \
             Adjust problem difficulty if needed."
        }
        SupportKind::General => "General learning support and encouragement.",
    }
}

fn urgency_prefix(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => "URGENT: ",
        RiskLevel::High => "HIGH PRIORITY: ",
        RiskLevel::Medium => "MEDIUM: ",
        RiskLevel::Low => "LOW: ",
    }
}

fn direction_label(direction: MomentumDirection) -> &'static str {
    match direction {
        MomentumDirection::Accelerating => "ACCELERATING",
        MomentumDirection::Stable => "STABLE",
        MomentumDirection::Decelerating => "DECELERATING",
    }
}

fn reason_for(dropout_type: DropoutType, ctx: &RuleContext) -> String {
    match dropout_type {
        DropoutType::Cognitive => {
            let gap = if ctx.features.reasoning.conceptual_gap.is_empty() {
                "Conceptual understanding declining"
            } else {
                &ctx.features.reasoning.conceptual_gap
            };
            format!("Cognitive: {gap}")
        }
        DropoutType::Behavioral => format!(
            "Behavioral: Inconsistent engagement pattern detected (consistency: {:.0}%)",
            ctx.features.disengagement.consistency_score
        ),
        DropoutType::Engagement => {
            if ctx.features.competition.competition_pressure_flag {
                "Engagement: Declining motivation under competition pressure".to_string()
            } else {
                "Engagement: Effort and focus declining over time".to_string()
            }
        }
        DropoutType::Silent => format!(
            "Silent: Learning momentum collapsing despite apparent activity \
             (LMI: {:.1}, trend: {})",
            ctx.momentum.score,
            direction_label(ctx.momentum.direction)
        ),
    }
}

/// Evaluates the rule table over one feature set and composes the final
/// multi-label classification.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    scoring: ScoringEngine,
}

impl Classifier {
    pub fn new(scoring: ScoringEngine) -> Self {
        Self { scoring }
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    /// Classify one feature set against its precomputed scores. The caller
    /// runs the scoring engine first so the same momentum and risk values
    /// feed both the classification and the views.
    pub fn classify(
        &self,
        features: &FeatureSet,
        momentum: &MomentumIndex,
        risk: &RiskScore,
    ) -> Result<Classification> {
        self.scoring.validate(features)?;

        if features.learning_progress.attempt_count == 0 {
            // Nothing recorded yet: healthy by definition, low evidence.
            return Ok(Classification {
                is_dropout: false,
                dropout_types: Vec::new(),
                primary_reason: "No attempts recorded for this question".to_string(),
                recommendation: "Continue monitoring. No immediate intervention needed."
                    .to_string(),
                lmi_score: momentum.score,
                drs_score: risk.score,
                confidence: risk.confidence,
                risk_factors: Vec::new(),
                classified_at: features.as_of,
            });
        }

        let ctx = RuleContext {
            features,
            momentum,
            risk,
            config: self.scoring.config(),
        };

        let mut dropout_types: Vec<DropoutType> = Vec::new();
        for rule in rules() {
            if (rule.predicate)(&ctx) {
                debug!(rule = rule.name, dropout_type = ?rule.dropout_type, "rule fired");
                if !dropout_types.contains(&rule.dropout_type) {
                    dropout_types.push(rule.dropout_type);
                }
            }
        }
        let is_dropout = !dropout_types.is_empty();

        let primary_reason = if is_dropout {
            dropout_types
                .iter()
                .map(|&t| reason_for(t, &ctx))
                .collect::<Vec<_>>()
                .join(" | ")
        } else {
            "Student showing healthy learning progression".to_string()
        };

        let recommendation = if is_dropout {
            let kind = support_kind(&risk.primary_factors);
            format!("{}{}", urgency_prefix(risk.level), support_text(kind))
        } else {
            "Continue monitoring. No immediate intervention needed.".to_string()
        };

        let confidence = classification_confidence(
            is_dropout,
            dropout_types.len(),
            risk,
            momentum,
            self.scoring.config(),
        );

        Ok(Classification {
            is_dropout,
            dropout_types,
            primary_reason,
            recommendation,
            lmi_score: momentum.score,
            drs_score: risk.score,
            confidence,
            risk_factors: risk.primary_factors.clone(),
            classified_at: features.as_of,
        })
    }
}

fn classification_confidence(
    is_dropout: bool,
    type_count: usize,
    risk: &RiskScore,
    momentum: &MomentumIndex,
    config: &ScoringConfig,
) -> f64 {
    let mut confidence = risk.confidence;

    if type_count >= 2 {
        confidence += 0.1;
    }

    // Score agreement boost, conflict penalty.
    if is_dropout {
        if momentum.score < config.lmi_at_risk && risk.score > config.drs_medium {
            confidence += 0.15;
        }
        if risk.score < 0.5 {
            confidence = (confidence - 0.1).max(0.5);
        }
    } else if momentum.score > config.lmi_healthy && risk.score < config.drs_low {
        confidence += 0.15;
    }

    confidence.clamp(0.3, 1.0)
}
