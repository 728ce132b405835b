use std::sync::Arc;

use chrono::Utc;

use crate::collector::EventCollector;
use crate::models::{
    AttemptHistory, ChangeType, CompetitionContext, CompetitionSignals, DisengagementSignals,
    EventPayload, FeatureSet, IntegritySignals, InterventionSignals, LearningEvent,
    LearningProgressSignals, LearningState, ReasoningContinuity, ReasoningSignals,
    StagnationSignals,
};

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Projects the event log for one (student, question) pair into the seven
/// signal categories. Every extraction is a pure read; categories lacking
/// their minimum sample degrade to neutral values instead of erroring.
pub struct FeatureExtractor<'a> {
    collector: &'a EventCollector,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(collector: &'a EventCollector) -> Self {
        Self { collector }
    }

    fn submit_events(&self, student_id: &str, question_id: &str) -> Vec<Arc<LearningEvent>> {
        self.collector
            .events_for_pair(student_id, question_id)
            .into_iter()
            .filter(|e| matches!(e.payload, EventPayload::QuestionSubmit { .. }))
            .collect()
    }

    /// Learning progress: is the student actually moving forward?
    pub fn learning_progress(&self, student_id: &str, question_id: &str) -> LearningProgressSignals {
        let history = self.collector.build_attempt_history(student_id, question_id);
        let attempt_count = history.attempt_count();
        if attempt_count == 0 {
            return LearningProgressSignals::default();
        }

        let submits = self.submit_events(student_id, question_id);
        let time_spent_per_attempt: Vec<f64> =
            history.attempts.iter().map(|a| a.time_spent_seconds).collect();

        let attempt_frequency = if submits.len() >= 2 {
            let minutes = (submits[submits.len() - 1].timestamp - submits[0].timestamp)
                .num_milliseconds() as f64
                / 60_000.0;
            attempt_count as f64 / minutes.max(1.0)
        } else {
            0.0
        };

        let improvement_score = improvement_score(&history);
        let change_types = classify_change_types(&history);
        let semantic_change_score = semantic_change_score(&change_types);
        let no_progress_flag = semantic_change_score < 30.0 && attempt_count >= 3;
        let learning_state = learning_state(improvement_score, attempt_count);

        LearningProgressSignals {
            attempt_count,
            attempt_frequency,
            time_spent_per_attempt,
            improvement_score: improvement_score.clamp(0.0, 100.0),
            change_types,
            semantic_change_score: semantic_change_score.clamp(0.0, 100.0),
            no_progress_flag,
            learning_state,
        }
    }

    /// Stagnation: is the student stuck for too long?
    pub fn stagnation(&self, student_id: &str, question_id: &str) -> StagnationSignals {
        let history = self.collector.build_attempt_history(student_id, question_id);
        let submits = self.submit_events(student_id, question_id);
        if submits.is_empty() {
            return StagnationSignals::default();
        }

        let duration_minutes = if submits.len() > 1 {
            (submits[submits.len() - 1].timestamp - submits[0].timestamp).num_milliseconds() as f64
                / 60_000.0
        } else {
            0.0
        };

        let repeat_attempt_count = history.attempt_count();
        let revisit_frequency = repeat_attempt_count.saturating_sub(1) as f64;

        let is_stalled = repeat_attempt_count >= 3
            && duration_minutes >= 15.0
            && history.correctness_ratio() < 0.5;

        let severity =
            (repeat_attempt_count as f64 * 20.0 + duration_minutes / 5.0).min(100.0);

        StagnationSignals {
            stagnation_duration_minutes: duration_minutes,
            repeat_attempt_count,
            revisit_frequency,
            is_stalled,
            stagnation_severity: severity,
        }
    }

    /// Integrity: does this learning look consistent and authentic?
    pub fn integrity(&self, student_id: &str, question_id: &str) -> IntegritySignals {
        let history = self.collector.build_attempt_history(student_id, question_id);
        if history.attempts.is_empty() {
            return IntegritySignals::default();
        }

        let correctness: Vec<f64> = history
            .attempts
            .iter()
            .map(|a| if a.is_correct { 1.0 } else { 0.0 })
            .collect();
        let sudden_jump_flag = correctness
            .windows(2)
            .any(|pair| pair[1] > pair[0] + 0.5);

        let answer_lengths: Vec<f64> = history
            .attempts
            .iter()
            .map(|a| a.answer.len() as f64)
            .collect();

        let (reasoning_continuity, external_assistance_likelihood) = if answer_lengths.len() > 1 {
            let variance = sample_variance(&answer_lengths);
            let avg = mean(&answer_lengths);
            if variance > avg * 2.0 && sudden_jump_flag {
                (ReasoningContinuity::Low, 0.6)
            } else if variance > avg {
                (ReasoningContinuity::Medium, 0.3)
            } else {
                (ReasoningContinuity::High, 0.1)
            }
        } else {
            (ReasoningContinuity::High, 0.1)
        };

        let mut integrity_score: f64 = 100.0;
        if sudden_jump_flag {
            integrity_score -= 20.0;
        }
        if external_assistance_likelihood > 0.5 {
            integrity_score -= 15.0;
        }

        IntegritySignals {
            integrity_score: integrity_score.max(0.0),
            reasoning_continuity,
            sudden_jump_flag,
            external_assistance_likelihood,
        }
    }

    /// Competition context: is rank pressure driving disengagement?
    /// A missing context degrades to neutral rank values.
    pub fn competition(
        &self,
        student_id: &str,
        question_id: &str,
        context: Option<CompetitionContext>,
    ) -> CompetitionSignals {
        let (latest_rank, previous_rank) = match context {
            Some(c) => (Some(c.latest_rank), Some(c.previous_rank)),
            None => (None, None),
        };
        let rank_delta = match (latest_rank, previous_rank) {
            (Some(latest), Some(previous)) => Some(latest - previous),
            _ => None,
        };

        let history = self.collector.build_attempt_history(student_id, question_id);
        let relative_progress_index = if history.attempts.is_empty() {
            0.0
        } else {
            history.correctness_ratio() * 100.0
        };

        let competition_pressure_flag =
            rank_delta.map(|d| d > 0).unwrap_or(false) || relative_progress_index < 30.0;

        CompetitionSignals {
            latest_rank,
            previous_rank,
            rank_delta,
            relative_progress_index,
            competition_pressure_flag,
        }
    }

    /// Behavioral disengagement: is effort reducing over time?
    pub fn disengagement(&self, student_id: &str, question_id: &str) -> DisengagementSignals {
        let submits = self.submit_events(student_id, question_id);

        let attempt_gaps_seconds: Vec<f64> = submits
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1_000.0)
            .collect();

        // Single-session simplification; session boundaries are not split out.
        let session_attempt_counts = vec![submits.len()];

        let consistency_score = if attempt_gaps_seconds.is_empty() {
            100.0
        } else {
            (100.0 - mean(&attempt_gaps_seconds) / 60.0).clamp(0.0, 100.0)
        };

        let average_gap_increasing = if attempt_gaps_seconds.len() > 1 {
            let half = attempt_gaps_seconds.len() / 2;
            let first = mean(&attempt_gaps_seconds[..half]);
            let second = mean(&attempt_gaps_seconds[half..]);
            second > first * 1.2
        } else {
            false
        };

        DisengagementSignals {
            attempt_gaps_seconds,
            session_attempt_counts,
            consistency_score,
            average_gap_increasing,
        }
    }

    /// Extract all seven categories. The reasoning category carries its
    /// neutral shape here; the orchestrator fills it from the analyzer.
    /// The intervention category is likewise populated by the orchestrator
    /// from its intervention log.
    pub fn comprehensive(
        &self,
        student_id: &str,
        question_id: &str,
        competition: Option<CompetitionContext>,
    ) -> FeatureSet {
        FeatureSet {
            student_id: student_id.to_string(),
            question_id: question_id.to_string(),
            as_of: Utc::now(),
            learning_progress: self.learning_progress(student_id, question_id),
            stagnation: self.stagnation(student_id, question_id),
            integrity: self.integrity(student_id, question_id),
            reasoning: ReasoningSignals::default(),
            competition: self.competition(student_id, question_id, competition),
            disengagement: self.disengagement(student_id, question_id),
            intervention: InterventionSignals::default(),
        }
    }
}

/// Contrast of second-half vs first-half correctness, scaled to 0-100.
/// A single attempt scores 100 when correct, else 0.
fn improvement_score(history: &AttemptHistory) -> f64 {
    let correctness: Vec<f64> = history
        .attempts
        .iter()
        .map(|a| if a.is_correct { 1.0 } else { 0.0 })
        .collect();
    match correctness.len() {
        0 => 0.0,
        1 => {
            if correctness[0] > 0.0 {
                100.0
            } else {
                0.0
            }
        }
        n => {
            let early = mean(&correctness[..n / 2]);
            let late = mean(&correctness[n / 2..]);
            (late - early).max(0.0) * 100.0
        }
    }
}

fn normalize_answer(text: &str) -> String {
    text.split_whitespace().collect::<String>().to_lowercase()
}

/// Whitespace-and-case-insensitive equality marks a revision superficial.
fn is_superficial_change(previous: &str, current: &str) -> bool {
    normalize_answer(previous) == normalize_answer(current)
}

fn classify_change_types(history: &AttemptHistory) -> Vec<ChangeType> {
    history
        .attempts
        .windows(2)
        .map(|pair| {
            if is_superficial_change(&pair[0].answer, &pair[1].answer) {
                ChangeType::Superficial
            } else if pair[1].is_correct {
                ChangeType::Corrective
            } else {
                ChangeType::Structural
            }
        })
        .collect()
}

/// Percentage of transitions that carry meaningful content change.
fn semantic_change_score(change_types: &[ChangeType]) -> f64 {
    if change_types.is_empty() {
        return 0.0;
    }
    let semantic = change_types
        .iter()
        .filter(|ct| !matches!(ct, ChangeType::Superficial))
        .count();
    semantic as f64 / change_types.len() as f64 * 100.0
}

fn learning_state(improvement_score: f64, attempt_count: usize) -> LearningState {
    if improvement_score > 60.0 && attempt_count <= 3 {
        LearningState::Progressing
    } else if attempt_count > 5 && improvement_score < 30.0 {
        LearningState::Stalled
    } else {
        LearningState::Plateau
    }
}
