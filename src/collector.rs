use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DetectionError, Result};
use crate::models::{
    AttemptHistory, EventPayload, EventType, LearningEvent, NavigationKind,
};

#[derive(Default)]
struct CollectorInner {
    /// Append-only log; indices below hold positions into this vector.
    events: Vec<Arc<LearningEvent>>,
    by_student: HashMap<String, Vec<usize>>,
    by_question: HashMap<String, Vec<usize>>,
    by_pair: HashMap<(String, String), Vec<usize>>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Append-only, time-ordered log of immutable learning events with
/// secondary indices by student, by question, and by (student, question).
///
/// Ordering is enforced globally across all keys: a new event whose
/// timestamp precedes the most recently recorded event is rejected with
/// [`DetectionError::OrderingViolation`]. A single writer lock serializes
/// the ordering check and the indexed append.
#[derive(Default)]
pub struct EventCollector {
    inner: Mutex<CollectorInner>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CollectorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event with a server-assigned timestamp.
    pub fn record(
        &self,
        student_id: &str,
        question_id: &str,
        payload: EventPayload,
    ) -> Result<Arc<LearningEvent>> {
        self.record_at(student_id, question_id, payload, Utc::now())
    }

    /// Record an event at an explicit timestamp. Used by ingestion
    /// replays and scenario seeding; the ordering check still applies.
    pub fn record_at(
        &self,
        student_id: &str,
        question_id: &str,
        payload: EventPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<Arc<LearningEvent>> {
        let mut inner = self.lock();

        if let Some(last) = inner.last_timestamp {
            if timestamp < last {
                return Err(DetectionError::OrderingViolation {
                    incoming: timestamp,
                    last,
                });
            }
        }
        inner.last_timestamp = Some(timestamp);

        let event = Arc::new(LearningEvent {
            event_id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            question_id: question_id.to_string(),
            timestamp,
            payload,
        });

        let position = inner.events.len();
        inner.events.push(Arc::clone(&event));
        inner
            .by_student
            .entry(student_id.to_string())
            .or_default()
            .push(position);
        inner
            .by_question
            .entry(question_id.to_string())
            .or_default()
            .push(position);
        inner
            .by_pair
            .entry((student_id.to_string(), question_id.to_string()))
            .or_default()
            .push(position);

        debug!(
            student = student_id,
            question = question_id,
            event_type = ?event.event_type(),
            "recorded event"
        );

        Ok(event)
    }

    pub fn record_question_start(
        &self,
        student_id: &str,
        question_id: &str,
        question_content: Option<String>,
    ) -> Result<Arc<LearningEvent>> {
        self.record(
            student_id,
            question_id,
            EventPayload::QuestionStart { question_content },
        )
    }

    pub fn record_submit(
        &self,
        student_id: &str,
        question_id: &str,
        answer: &str,
        is_correct: bool,
        time_spent_seconds: f64,
    ) -> Result<Arc<LearningEvent>> {
        self.record(
            student_id,
            question_id,
            EventPayload::QuestionSubmit {
                answer: answer.to_string(),
                is_correct,
                time_spent_seconds,
            },
        )
    }

    pub fn record_revision(
        &self,
        student_id: &str,
        question_id: &str,
        original_answer: &str,
        revised_answer: &str,
        revision_reason: Option<String>,
    ) -> Result<Arc<LearningEvent>> {
        self.record(
            student_id,
            question_id,
            EventPayload::AnswerRevision {
                original_answer: original_answer.to_string(),
                revised_answer: revised_answer.to_string(),
                revision_reason,
            },
        )
    }

    pub fn record_navigation(
        &self,
        student_id: &str,
        question_id: &str,
        nav: NavigationKind,
        destination_question_id: Option<String>,
    ) -> Result<Arc<LearningEvent>> {
        self.record(
            student_id,
            question_id,
            EventPayload::Navigation {
                nav,
                destination_question_id,
            },
        )
    }

    pub fn record_focus_lost(
        &self,
        student_id: &str,
        question_id: &str,
        idle_duration_seconds: f64,
    ) -> Result<Arc<LearningEvent>> {
        self.record(
            student_id,
            question_id,
            EventPayload::FocusLost {
                idle_duration_seconds,
            },
        )
    }

    pub fn record_focus_gained(
        &self,
        student_id: &str,
        question_id: &str,
    ) -> Result<Arc<LearningEvent>> {
        self.record(student_id, question_id, EventPayload::FocusGained)
    }

    pub fn record_hint_request(
        &self,
        student_id: &str,
        question_id: &str,
        hint_level: u32,
    ) -> Result<Arc<LearningEvent>> {
        self.record(
            student_id,
            question_id,
            EventPayload::HintRequest { hint_level },
        )
    }

    pub fn record_session_start(&self, student_id: &str) -> Result<Arc<LearningEvent>> {
        self.record(student_id, "session", EventPayload::SessionStart)
    }

    pub fn record_session_end(&self, student_id: &str) -> Result<Arc<LearningEvent>> {
        self.record(student_id, "session", EventPayload::SessionEnd)
    }

    /// All time-ordered events for a (student, question) pair.
    pub fn events_for_pair(&self, student_id: &str, question_id: &str) -> Vec<Arc<LearningEvent>> {
        let inner = self.lock();
        inner
            .by_pair
            .get(&(student_id.to_string(), question_id.to_string()))
            .map(|positions| {
                positions
                    .iter()
                    .map(|&p| Arc::clone(&inner.events[p]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn events_for_student(&self, student_id: &str) -> Vec<Arc<LearningEvent>> {
        let inner = self.lock();
        inner
            .by_student
            .get(student_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&p| Arc::clone(&inner.events[p]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn events_for_question(&self, question_id: &str) -> Vec<Arc<LearningEvent>> {
        let inner = self.lock();
        inner
            .by_question
            .get(question_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&p| Arc::clone(&inner.events[p]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn events_by_type(&self, event_type: EventType) -> Vec<Arc<LearningEvent>> {
        let inner = self.lock();
        inner
            .events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .map(Arc::clone)
            .collect()
    }

    pub fn all_events(&self) -> Vec<Arc<LearningEvent>> {
        self.lock().events.iter().map(Arc::clone).collect()
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Project submit events for one key into an attempt history with
    /// 1-based attempt numbers in log order.
    pub fn build_attempt_history(&self, student_id: &str, question_id: &str) -> AttemptHistory {
        let mut history = AttemptHistory::new(student_id, question_id);
        for event in self.events_for_pair(student_id, question_id) {
            if let EventPayload::QuestionSubmit {
                answer,
                is_correct,
                time_spent_seconds,
            } = &event.payload
            {
                history.push_attempt(
                    answer.clone(),
                    *is_correct,
                    event.timestamp,
                    *time_spent_seconds,
                );
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn rejects_timestamp_before_last_event() {
        let collector = EventCollector::new();
        let t0 = base_time();
        collector
            .record_at("stu-1", "q-1", EventPayload::SessionStart, t0)
            .unwrap();

        let earlier = t0 - Duration::seconds(5);
        let err = collector
            .record_at("stu-2", "q-9", EventPayload::SessionStart, earlier)
            .unwrap_err();
        assert!(matches!(err, DetectionError::OrderingViolation { .. }));
        assert_eq!(collector.event_count(), 1);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let collector = EventCollector::new();
        let t0 = base_time();
        collector
            .record_at("stu-1", "q-1", EventPayload::FocusGained, t0)
            .unwrap();
        collector
            .record_at("stu-1", "q-1", EventPayload::FocusGained, t0)
            .unwrap();
        assert_eq!(collector.event_count(), 2);
    }

    #[test]
    fn indices_partition_events_by_key() {
        let collector = EventCollector::new();
        let t0 = base_time();
        collector
            .record_at("stu-1", "q-1", EventPayload::SessionStart, t0)
            .unwrap();
        collector
            .record_at(
                "stu-1",
                "q-2",
                EventPayload::QuestionStart {
                    question_content: None,
                },
                t0 + Duration::seconds(1),
            )
            .unwrap();
        collector
            .record_at("stu-2", "q-1", EventPayload::SessionStart, t0 + Duration::seconds(2))
            .unwrap();

        assert_eq!(collector.events_for_student("stu-1").len(), 2);
        assert_eq!(collector.events_for_question("q-1").len(), 2);
        assert_eq!(collector.events_for_pair("stu-1", "q-1").len(), 1);
        assert_eq!(collector.events_for_pair("stu-3", "q-1").len(), 0);
        assert_eq!(collector.events_by_type(EventType::SessionStart).len(), 2);
    }

    #[test]
    fn attempt_history_keeps_submit_order_and_numbers() {
        let collector = EventCollector::new();
        let t0 = base_time();
        collector
            .record_at(
                "stu-1",
                "q-1",
                EventPayload::QuestionStart {
                    question_content: Some("Solve: 2x + 5 = 13".to_string()),
                },
                t0,
            )
            .unwrap();
        collector
            .record_at(
                "stu-1",
                "q-1",
                EventPayload::QuestionSubmit {
                    answer: "x = 6".to_string(),
                    is_correct: false,
                    time_spent_seconds: 120.0,
                },
                t0 + Duration::seconds(120),
            )
            .unwrap();
        collector
            .record_at(
                "stu-1",
                "q-1",
                EventPayload::QuestionSubmit {
                    answer: "x = 4".to_string(),
                    is_correct: true,
                    time_spent_seconds: 90.0,
                },
                t0 + Duration::seconds(240),
            )
            .unwrap();

        let history = collector.build_attempt_history("stu-1", "q-1");
        assert_eq!(history.attempt_count(), 2);
        assert_eq!(history.attempts[0].attempt_number, 1);
        assert_eq!(history.attempts[0].answer, "x = 6");
        assert_eq!(history.attempts[1].attempt_number, 2);
        assert!(history.attempts[1].is_correct);
    }

    #[test]
    fn convenience_recorders_carry_typed_payloads() {
        let collector = EventCollector::new();
        collector.record_session_start("stu-1").unwrap();
        collector
            .record_question_start("stu-1", "q-1", Some("What is 2+2?".to_string()))
            .unwrap();
        collector
            .record_submit("stu-1", "q-1", "4", true, 45.0)
            .unwrap();
        collector
            .record_revision("stu-1", "q-1", "4", "four", Some("wording".to_string()))
            .unwrap();
        collector
            .record_navigation("stu-1", "q-1", NavigationKind::Next, Some("q-2".to_string()))
            .unwrap();
        collector.record_focus_lost("stu-1", "q-1", 30.0).unwrap();
        collector.record_focus_gained("stu-1", "q-1").unwrap();
        collector.record_hint_request("stu-1", "q-1", 1).unwrap();
        collector.record_session_end("stu-1").unwrap();

        assert_eq!(collector.event_count(), 9);
        assert_eq!(collector.events_by_type(EventType::QuestionSubmit).len(), 1);
        assert_eq!(collector.events_by_type(EventType::HintRequest).len(), 1);
    }
}
