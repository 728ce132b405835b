use tracing::debug;

use crate::error::{DetectionError, Result};
use crate::models::{
    FeatureSet, LearningState, MomentumDirection, MomentumIndex, ReasoningContinuity, RiskFactor,
    RiskLevel, RiskScore,
};

/// Weights for the six dropout-risk components. Must sum to 1.
#[derive(Debug, Clone)]
pub struct RiskWeights {
    pub momentum: f64,
    pub stagnation: f64,
    pub behavioral: f64,
    pub integrity: f64,
    pub competition: f64,
    pub engagement: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            momentum: 0.35,
            stagnation: 0.25,
            behavioral: 0.15,
            integrity: 0.10,
            competition: 0.10,
            engagement: 0.05,
        }
    }
}

/// Scoring constants. Empirically chosen defaults, exposed as configuration
/// rather than hard-coded requirements.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub weights: RiskWeights,
    /// LMI above this reads healthy.
    pub lmi_healthy: f64,
    /// LMI below this reads at-risk.
    pub lmi_at_risk: f64,
    pub drs_low: f64,
    pub drs_medium: f64,
    pub drs_high: f64,
    pub stalled_penalty: f64,
    pub long_stagnation_minutes: f64,
    pub long_stagnation_penalty: f64,
    pub medium_stagnation_minutes: f64,
    pub medium_stagnation_penalty: f64,
    pub semantic_bonus_max: f64,
    /// Component score above which a factor is reported.
    pub factor_cutoff: f64,
    /// LMI delta beyond which momentum direction changes.
    pub momentum_delta: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            lmi_healthy: 70.0,
            lmi_at_risk: 40.0,
            drs_low: 0.3,
            drs_medium: 0.6,
            drs_high: 0.8,
            stalled_penalty: 40.0,
            long_stagnation_minutes: 30.0,
            long_stagnation_penalty: 25.0,
            medium_stagnation_minutes: 15.0,
            medium_stagnation_penalty: 15.0,
            semantic_bonus_max: 15.0,
            factor_cutoff: 0.6,
            momentum_delta: 5.0,
        }
    }
}

/// Combines signals into the Learning Momentum Index and the Dropout Risk
/// Score. Stateless; per-key trend history is owned by the orchestrator and
/// passed in for momentum direction.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Fail fast on malformed signal fields. Distinct from the tolerant
    /// degradation of thin categories: a NaN or out-of-range value means a
    /// bug upstream, not a small sample.
    pub fn validate(&self, features: &FeatureSet) -> Result<()> {
        let checks: [(&str, f64, f64, f64); 7] = [
            (
                "learning_progress.improvement_score",
                features.learning_progress.improvement_score,
                0.0,
                100.0,
            ),
            (
                "learning_progress.semantic_change_score",
                features.learning_progress.semantic_change_score,
                0.0,
                100.0,
            ),
            (
                "stagnation.stagnation_duration_minutes",
                features.stagnation.stagnation_duration_minutes,
                0.0,
                f64::MAX,
            ),
            (
                "integrity.integrity_score",
                features.integrity.integrity_score,
                0.0,
                100.0,
            ),
            (
                "integrity.external_assistance_likelihood",
                features.integrity.external_assistance_likelihood,
                0.0,
                1.0,
            ),
            (
                "reasoning.confidence",
                features.reasoning.confidence,
                0.0,
                1.0,
            ),
            (
                "disengagement.consistency_score",
                features.disengagement.consistency_score,
                0.0,
                100.0,
            ),
        ];

        for (field, value, min, max) in checks {
            if !value.is_finite() || value < min || value > max {
                return Err(DetectionError::InvalidFeatureState(format!(
                    "{field} = {value}"
                )));
            }
        }
        Ok(())
    }

    /// Learning Momentum Index over one feature set, with direction taken
    /// from the two most recent per-key trend values.
    pub fn momentum_index(&self, features: &FeatureSet, lmi_trend: &[f64]) -> MomentumIndex {
        let progress = &features.learning_progress;

        if progress.attempt_count == 0 {
            // Neutral baseline: nothing to score yet.
            return MomentumIndex {
                score: 50.0,
                direction: MomentumDirection::Stable,
                decay_rate: 0.05,
                computed_at: features.as_of,
            };
        }

        let state_multiplier = match progress.learning_state {
            LearningState::Progressing => 1.2,
            LearningState::Plateau => 1.0,
            LearningState::Stalled => 0.5,
        };

        let semantic_bonus =
            progress.semantic_change_score / 100.0 * self.config.semantic_bonus_max;

        let stagnation = &features.stagnation;
        let stagnation_penalty = if stagnation.is_stalled {
            self.config.stalled_penalty
        } else if stagnation.stagnation_duration_minutes > self.config.long_stagnation_minutes {
            self.config.long_stagnation_penalty
        } else if stagnation.stagnation_duration_minutes > self.config.medium_stagnation_minutes {
            self.config.medium_stagnation_penalty
        } else {
            0.0
        };

        let integrity_multiplier = features.integrity.integrity_score / 100.0;
        let analyzer_confidence = features.reasoning.confidence;

        let score = ((progress.improvement_score * state_multiplier + semantic_bonus)
            * integrity_multiplier
            * analyzer_confidence
            - stagnation_penalty)
            .clamp(0.0, 100.0);

        let direction = if lmi_trend.len() >= 2 {
            let delta = lmi_trend[lmi_trend.len() - 1] - lmi_trend[lmi_trend.len() - 2];
            if delta > self.config.momentum_delta {
                MomentumDirection::Accelerating
            } else if delta < -self.config.momentum_delta {
                MomentumDirection::Decelerating
            } else {
                MomentumDirection::Stable
            }
        } else {
            MomentumDirection::Stable
        };

        let decay_rate = 0.05 + (progress.attempt_count.saturating_sub(2)) as f64 * 0.08;

        debug!(score, ?direction, "computed momentum index");

        MomentumIndex {
            score,
            direction,
            decay_rate,
            computed_at: features.as_of,
        }
    }

    /// Dropout Risk Score: weighted sum of six component risks.
    pub fn risk_score(&self, features: &FeatureSet, momentum: &MomentumIndex) -> RiskScore {
        if features.learning_progress.attempt_count == 0 {
            return RiskScore {
                score: 0.0,
                confidence: 0.3,
                level: RiskLevel::Low,
                primary_factors: Vec::new(),
                computed_at: features.as_of,
            };
        }

        let components = [
            (RiskFactor::DecliningMomentum, self.momentum_component(momentum)),
            (RiskFactor::Stagnation, self.stagnation_component(features)),
            (RiskFactor::ReducedConsistency, self.behavioral_component(features)),
            (RiskFactor::AuthenticityConcern, self.integrity_component(features)),
            (RiskFactor::CompetitionPressure, self.competition_component(features)),
            (RiskFactor::EngagementDecline, self.engagement_component(features)),
        ];

        let w = &self.config.weights;
        let weights = [
            w.momentum,
            w.stagnation,
            w.behavioral,
            w.integrity,
            w.competition,
            w.engagement,
        ];

        let score: f64 = components
            .iter()
            .zip(weights)
            .map(|((_, component), weight)| component * weight)
            .sum();
        let score = score.clamp(0.0, 1.0);

        let confidence = self.risk_confidence(features);
        let level = self.risk_level(score);
        let primary_factors = self.rank_factors(&components);

        debug!(score, ?level, "computed risk score");

        RiskScore {
            score,
            confidence,
            level,
            primary_factors,
            computed_at: features.as_of,
        }
    }

    pub fn risk_level(&self, score: f64) -> RiskLevel {
        if score >= self.config.drs_high {
            RiskLevel::Critical
        } else if score >= self.config.drs_medium {
            RiskLevel::High
        } else if score >= self.config.drs_low {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// High momentum means low risk.
    fn momentum_component(&self, momentum: &MomentumIndex) -> f64 {
        (1.0 - momentum.score / 100.0).clamp(0.0, 1.0)
    }

    fn stagnation_component(&self, features: &FeatureSet) -> f64 {
        let stagnation = &features.stagnation;
        if stagnation.is_stalled {
            return 0.95;
        }
        let duration = (stagnation.stagnation_duration_minutes / 60.0).min(1.0);
        let repeats = (stagnation.repeat_attempt_count as f64 / 5.0).min(1.0);
        (duration + repeats) / 2.0
    }

    fn behavioral_component(&self, features: &FeatureSet) -> f64 {
        let disengagement = &features.disengagement;
        let mut risk = (1.0 - disengagement.consistency_score / 100.0) * 0.4;
        if disengagement.average_gap_increasing {
            risk += 0.3;
        }
        if disengagement
            .session_attempt_counts
            .first()
            .is_some_and(|&count| count < 3)
        {
            risk += 0.3;
        }
        risk.min(1.0)
    }

    fn integrity_component(&self, features: &FeatureSet) -> f64 {
        let integrity = &features.integrity;
        let mut risk = 0.0;
        if integrity.sudden_jump_flag {
            risk += 0.4;
        }
        risk += integrity.external_assistance_likelihood * 0.3;
        risk += match integrity.reasoning_continuity {
            ReasoningContinuity::High => 0.0,
            ReasoningContinuity::Medium => 0.2,
            ReasoningContinuity::Low => 0.4,
        };
        risk.min(1.0)
    }

    fn competition_component(&self, features: &FeatureSet) -> f64 {
        let competition = &features.competition;
        let mut risk = 0.0;
        if competition.competition_pressure_flag {
            risk += 0.5;
        }
        if let Some(delta) = competition.rank_delta {
            if delta > 0 {
                risk += (delta as f64 / 100.0).min(0.4);
            }
        }
        risk += (1.0 - competition.relative_progress_index / 100.0) * 0.3;
        risk.min(1.0)
    }

    fn engagement_component(&self, features: &FeatureSet) -> f64 {
        let progress = &features.learning_progress;
        let mut risk: f64 = 0.0;
        if progress.no_progress_flag {
            risk += 0.6;
        }
        if progress.attempt_frequency < 0.1 {
            risk += 0.3;
        }
        risk.min(1.0)
    }

    /// Evidence-strength confidence: more attempts and analyzer certainty
    /// raise it; a progress/stagnation conflict lowers it.
    fn risk_confidence(&self, features: &FeatureSet) -> f64 {
        let mut confidence = 0.5;
        confidence += (features.learning_progress.attempt_count as f64 * 0.05).min(0.3);
        confidence += features.reasoning.confidence * 0.1;

        let progress_ok = features.learning_progress.improvement_score > 50.0;
        if progress_ok && features.stagnation.is_stalled {
            confidence -= 0.15;
        }

        confidence.clamp(0.3, 1.0)
    }

    /// Components past the cutoff, ranked descending, top three.
    fn rank_factors(&self, components: &[(RiskFactor, f64)]) -> Vec<RiskFactor> {
        let mut flagged: Vec<(RiskFactor, f64)> = components
            .iter()
            .filter(|(_, score)| *score > self.config.factor_cutoff)
            .copied()
            .collect();
        flagged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        flagged.into_iter().take(3).map(|(factor, _)| factor).collect()
    }
}
