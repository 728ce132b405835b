use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of learning events the collector tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionEnd,
    QuestionStart,
    QuestionSubmit,
    AnswerRevision,
    Navigation,
    FocusLost,
    FocusGained,
    HintRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    Next,
    Back,
    Skip,
}

/// Event-specific data, typed per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStart,
    SessionEnd,
    QuestionStart {
        question_content: Option<String>,
    },
    QuestionSubmit {
        answer: String,
        is_correct: bool,
        time_spent_seconds: f64,
    },
    AnswerRevision {
        original_answer: String,
        revised_answer: String,
        revision_reason: Option<String>,
    },
    Navigation {
        nav: NavigationKind,
        destination_question_id: Option<String>,
    },
    FocusLost {
        idle_duration_seconds: f64,
    },
    FocusGained,
    HintRequest {
        hint_level: u32,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::SessionStart => EventType::SessionStart,
            EventPayload::SessionEnd => EventType::SessionEnd,
            EventPayload::QuestionStart { .. } => EventType::QuestionStart,
            EventPayload::QuestionSubmit { .. } => EventType::QuestionSubmit,
            EventPayload::AnswerRevision { .. } => EventType::AnswerRevision,
            EventPayload::Navigation { .. } => EventType::Navigation,
            EventPayload::FocusLost { .. } => EventType::FocusLost,
            EventPayload::FocusGained => EventType::FocusGained,
            EventPayload::HintRequest { .. } => EventType::HintRequest,
        }
    }
}

/// A single recorded interaction. Never mutated after the collector
/// accepts it; consumers receive shared references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningEvent {
    pub event_id: Uuid,
    pub student_id: String,
    pub question_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl LearningEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// One answer submission within an attempt history.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// 1-based, strictly increasing within a history.
    pub attempt_number: usize,
    pub answer: String,
    pub is_correct: bool,
    pub timestamp: DateTime<Utc>,
    pub time_spent_seconds: f64,
}

/// Ordered projection of submit events for one (student, question) pair.
/// Derived from the event log on demand, never stored independently.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptHistory {
    pub student_id: String,
    pub question_id: String,
    pub attempts: Vec<Attempt>,
}

impl AttemptHistory {
    pub fn new(student_id: impl Into<String>, question_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            question_id: question_id.into(),
            attempts: Vec::new(),
        }
    }

    pub fn push_attempt(
        &mut self,
        answer: String,
        is_correct: bool,
        timestamp: DateTime<Utc>,
        time_spent_seconds: f64,
    ) {
        let attempt_number = self.attempts.len() + 1;
        self.attempts.push(Attempt {
            attempt_number,
            answer,
            is_correct,
            timestamp,
            time_spent_seconds,
        });
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn correct_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_correct).count()
    }

    pub fn correctness_ratio(&self) -> f64 {
        self.correct_count() as f64 / self.attempts.len().max(1) as f64
    }

    pub fn correct_on_first_attempt(&self) -> bool {
        self.attempts.len() == 1 && self.attempts[0].is_correct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Formatting-only revision; normalized texts are equal.
    Superficial,
    /// Content changed and the later attempt is correct.
    Corrective,
    /// Content changed without converging on a correct answer.
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningState {
    Progressing,
    Plateau,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningContinuity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumDirection {
    Accelerating,
    Stable,
    Decelerating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropoutType {
    Cognitive,
    Behavioral,
    Engagement,
    Silent,
}

impl DropoutType {
    pub fn label(self) -> &'static str {
        match self {
            DropoutType::Cognitive => "COGNITIVE",
            DropoutType::Behavioral => "BEHAVIORAL",
            DropoutType::Engagement => "ENGAGEMENT",
            DropoutType::Silent => "SILENT",
        }
    }
}

/// Named contributors to the dropout risk score, ranked when reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    DecliningMomentum,
    Stagnation,
    ReducedConsistency,
    AuthenticityConcern,
    CompetitionPressure,
    EngagementDecline,
}

impl RiskFactor {
    pub fn label(self) -> &'static str {
        match self {
            RiskFactor::DecliningMomentum => "Declining learning momentum",
            RiskFactor::Stagnation => "Stagnation on problem",
            RiskFactor::ReducedConsistency => "Reduced effort and consistency",
            RiskFactor::AuthenticityConcern => "Authenticity concerns",
            RiskFactor::CompetitionPressure => "Competition pressure",
            RiskFactor::EngagementDecline => "Engagement declining",
        }
    }
}

// Signal categories. One struct per category; all derived per analysis call.

#[derive(Debug, Clone, Serialize)]
pub struct LearningProgressSignals {
    pub attempt_count: usize,
    /// Attempts per minute between first and last submit.
    pub attempt_frequency: f64,
    pub time_spent_per_attempt: Vec<f64>,
    /// 0-100, contrast of second-half vs first-half correctness.
    pub improvement_score: f64,
    pub change_types: Vec<ChangeType>,
    /// 0-100, percentage of non-superficial transitions.
    pub semantic_change_score: f64,
    pub no_progress_flag: bool,
    pub learning_state: LearningState,
}

impl Default for LearningProgressSignals {
    fn default() -> Self {
        Self {
            attempt_count: 0,
            attempt_frequency: 0.0,
            time_spent_per_attempt: Vec::new(),
            improvement_score: 0.0,
            change_types: Vec::new(),
            semantic_change_score: 0.0,
            no_progress_flag: false,
            learning_state: LearningState::Plateau,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagnationSignals {
    pub stagnation_duration_minutes: f64,
    pub repeat_attempt_count: usize,
    pub revisit_frequency: f64,
    pub is_stalled: bool,
    /// 0-100.
    pub stagnation_severity: f64,
}

impl Default for StagnationSignals {
    fn default() -> Self {
        Self {
            stagnation_duration_minutes: 0.0,
            repeat_attempt_count: 0,
            revisit_frequency: 0.0,
            is_stalled: false,
            stagnation_severity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegritySignals {
    /// 0-100, starts at 100 and loses points per concern.
    pub integrity_score: f64,
    pub reasoning_continuity: ReasoningContinuity,
    pub sudden_jump_flag: bool,
    /// 0-1.
    pub external_assistance_likelihood: f64,
}

impl Default for IntegritySignals {
    fn default() -> Self {
        Self {
            integrity_score: 100.0,
            reasoning_continuity: ReasoningContinuity::High,
            sudden_jump_flag: false,
            external_assistance_likelihood: 0.0,
        }
    }
}

/// Cognitive-insight signals produced by the reasoning analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningSignals {
    pub conceptual_gap: String,
    pub learning_summary: String,
    /// 0-1.
    pub confidence: f64,
    pub misconception_patterns: Vec<String>,
    /// Negative = appropriately confident, positive = overconfident.
    pub confidence_correctness_gap: f64,
}

impl Default for ReasoningSignals {
    fn default() -> Self {
        Self {
            conceptual_gap: String::new(),
            learning_summary: String::new(),
            confidence: 0.0,
            misconception_patterns: Vec::new(),
            confidence_correctness_gap: 0.0,
        }
    }
}

/// Rank context supplied by an external collaborator. Its absence
/// degrades the competition category to neutral values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompetitionContext {
    pub latest_rank: i64,
    pub previous_rank: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompetitionSignals {
    pub latest_rank: Option<i64>,
    pub previous_rank: Option<i64>,
    /// Positive = rank worsened.
    pub rank_delta: Option<i64>,
    /// 0-100.
    pub relative_progress_index: f64,
    pub competition_pressure_flag: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisengagementSignals {
    pub attempt_gaps_seconds: Vec<f64>,
    pub session_attempt_counts: Vec<usize>,
    /// 0-100, penalized by the normalized average gap.
    pub consistency_score: f64,
    pub average_gap_increasing: bool,
}

impl Default for DisengagementSignals {
    fn default() -> Self {
        Self {
            attempt_gaps_seconds: Vec::new(),
            session_attempt_counts: Vec::new(),
            consistency_score: 100.0,
            average_gap_increasing: false,
        }
    }
}

/// Populated from the orchestrator's intervention log, not from events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterventionSignals {
    pub intervention_triggered: bool,
    pub intervention_type: Option<String>,
    pub intervention_timestamp: Option<DateTime<Utc>>,
    /// 0-100.
    pub post_intervention_progress: f64,
    /// 0-100.
    pub recovery_score: f64,
    pub intervention_success_flag: bool,
}

/// All seven signal categories for one (student, question) pair at one
/// as-of instant.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSet {
    pub student_id: String,
    pub question_id: String,
    pub as_of: DateTime<Utc>,
    pub learning_progress: LearningProgressSignals,
    pub stagnation: StagnationSignals,
    pub integrity: IntegritySignals,
    pub reasoning: ReasoningSignals,
    pub competition: CompetitionSignals,
    pub disengagement: DisengagementSignals,
    pub intervention: InterventionSignals,
}

/// Learning Momentum Index: 0-100 directional-improvement score.
/// Above 70 reads healthy, 40-70 at-risk, below 40 a risk trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct MomentumIndex {
    pub score: f64,
    pub direction: MomentumDirection,
    pub decay_rate: f64,
    pub computed_at: DateTime<Utc>,
}

/// Dropout Risk Score: 0-1 weighted aggregate over six components.
#[derive(Debug, Clone, Serialize)]
pub struct RiskScore {
    pub score: f64,
    /// 0.3-1.0.
    pub confidence: f64,
    pub level: RiskLevel,
    /// Top three contributing components, ranked descending.
    pub primary_factors: Vec<RiskFactor>,
    pub computed_at: DateTime<Utc>,
}

/// Final multi-label classification. Types are non-exclusive.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub is_dropout: bool,
    pub dropout_types: Vec<DropoutType>,
    pub primary_reason: String,
    pub recommendation: String,
    pub lmi_score: f64,
    pub drs_score: f64,
    /// 0.3-1.0.
    pub confidence: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub classified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_maps_to_event_type() {
        let payload = EventPayload::QuestionSubmit {
            answer: "x = 4".to_string(),
            is_correct: true,
            time_spent_seconds: 45.0,
        };
        assert_eq!(payload.event_type(), EventType::QuestionSubmit);
        assert_eq!(EventPayload::FocusGained.event_type(), EventType::FocusGained);
    }

    #[test]
    fn attempt_numbers_increase_from_one() {
        let mut history = AttemptHistory::new("stu-1", "q-1");
        history.push_attempt("a".to_string(), false, Utc::now(), 30.0);
        history.push_attempt("b".to_string(), true, Utc::now(), 40.0);
        assert_eq!(history.attempts[0].attempt_number, 1);
        assert_eq!(history.attempts[1].attempt_number, 2);
        assert_eq!(history.attempt_count(), 2);
        assert!((history.correctness_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn first_attempt_success_detected() {
        let mut history = AttemptHistory::new("stu-1", "q-1");
        history.push_attempt("4".to_string(), true, Utc::now(), 45.0);
        assert!(history.correct_on_first_attempt());
        history.push_attempt("4".to_string(), true, Utc::now(), 5.0);
        assert!(!history.correct_on_first_attempt());
    }
}
