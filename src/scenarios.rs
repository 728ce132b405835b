//! Built-in demo scenarios. Each seeder writes a deterministic event
//! timeline through `record_at`, so repeated runs produce identical
//! analyses. The silent scenario also runs interim analyses to build the
//! momentum trend its detection depends on.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::Result;
use crate::models::{EventPayload, NavigationKind};
use crate::system::DetectionSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Healthy,
    Cognitive,
    Behavioral,
    Engagement,
    Silent,
    Struggling,
}

impl ScenarioKind {
    pub fn all() -> [ScenarioKind; 6] {
        [
            ScenarioKind::Healthy,
            ScenarioKind::Cognitive,
            ScenarioKind::Behavioral,
            ScenarioKind::Engagement,
            ScenarioKind::Silent,
            ScenarioKind::Struggling,
        ]
    }

    pub fn parse(name: &str) -> Option<ScenarioKind> {
        match name {
            "healthy" => Some(ScenarioKind::Healthy),
            "cognitive" => Some(ScenarioKind::Cognitive),
            "behavioral" => Some(ScenarioKind::Behavioral),
            "engagement" => Some(ScenarioKind::Engagement),
            "silent" => Some(ScenarioKind::Silent),
            "struggling" => Some(ScenarioKind::Struggling),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::Healthy => "healthy",
            ScenarioKind::Cognitive => "cognitive",
            ScenarioKind::Behavioral => "behavioral",
            ScenarioKind::Engagement => "engagement",
            ScenarioKind::Silent => "silent",
            ScenarioKind::Struggling => "struggling",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ScenarioKind::Healthy => "one correct attempt, no concerns",
            ScenarioKind::Cognitive => "repeated near-identical wrong answers over a long stretch",
            ScenarioKind::Behavioral => "a long abandonment gap between attempts",
            ScenarioKind::Engagement => "attempt gaps widening over the session",
            ScenarioKind::Silent => "steady activity while momentum quietly collapses",
            ScenarioKind::Struggling => "full walkthrough with hints, revisions, and focus loss",
        }
    }
}

/// Where the seeded events landed.
#[derive(Debug, Clone)]
pub struct SeededScenario {
    pub kind: ScenarioKind,
    pub student_id: String,
    pub question_id: String,
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn submit(answer: &str, is_correct: bool, time_spent_seconds: f64) -> EventPayload {
    EventPayload::QuestionSubmit {
        answer: answer.to_string(),
        is_correct,
        time_spent_seconds,
    }
}

/// Seed the named scenario into the system and return its key.
pub async fn seed(system: &DetectionSystem, kind: ScenarioKind) -> Result<SeededScenario> {
    let start = base_time();
    let at = |seconds: i64| start + Duration::seconds(seconds);

    let (student_id, question_id) = match kind {
        ScenarioKind::Healthy => {
            let (student, question) = ("amara", "algebra-01");
            system.record_at(
                student,
                question,
                EventPayload::QuestionStart {
                    question_content: Some("Solve 2x + 3 = 11".to_string()),
                },
                at(0),
            )?;
            system.record_at(student, question, submit("x = 4", true, 45.0), at(45))?;
            (student, question)
        }
        ScenarioKind::Cognitive => {
            let (student, question) = ("dev", "algebra-02");
            system.record_at(
                student,
                question,
                EventPayload::QuestionStart {
                    question_content: Some("Solve 3x - 5 = 10".to_string()),
                },
                at(0),
            )?;
            // Same wrong answer reworded, stretched past the stall threshold.
            system.record_at(student, question, submit("x = 3", false, 120.0), at(120))?;
            system.record_at(student, question, submit("x =  3", false, 90.0), at(480))?;
            system.record_at(student, question, submit("X = 3", false, 80.0), at(840))?;
            system.record_at(student, question, submit("x = 3 ", false, 70.0), at(1200))?;
            (student, question)
        }
        ScenarioKind::Behavioral => {
            let (student, question) = ("lena", "geometry-01");
            system.record_at(student, question, submit("area = 20", false, 60.0), at(0))?;
            system.record_at(
                student,
                question,
                EventPayload::FocusLost {
                    idle_duration_seconds: 650.0,
                },
                at(30),
            )?;
            system.record_at(student, question, EventPayload::FocusGained, at(690))?;
            // Abandonment-length gap before the next attempt.
            system.record_at(student, question, submit("area = 24", false, 50.0), at(700))?;
            system.record_at(student, question, submit("area = 26", false, 40.0), at(800))?;
            (student, question)
        }
        ScenarioKind::Engagement => {
            let (student, question) = ("tomas", "fractions-01");
            system.record_at(student, question, submit("1/2", false, 40.0), at(0))?;
            system.record_at(student, question, submit("2/3", false, 35.0), at(60))?;
            system.record_at(student, question, submit("3/4", false, 30.0), at(150))?;
            system.record_at(student, question, submit("4/5", false, 25.0), at(330))?;
            system.record_at(student, question, submit("5/6", false, 20.0), at(630))?;
            (student, question)
        }
        ScenarioKind::Silent => {
            let (student, question) = ("nina", "calculus-01");
            // A strong first attempt establishes a high momentum baseline.
            system.record_at(student, question, submit("dy/dx = 2x", true, 50.0), at(0))?;
            system.analyze_outcome(student, question, None, None).await?;
            // Effort continues on schedule while the answers stop moving.
            system.record_at(
                student,
                question,
                submit("dy/dx =  2x", false, 48.0),
                at(180),
            )?;
            system.analyze_outcome(student, question, None, None).await?;
            system.record_at(
                student,
                question,
                submit("DY/DX = 2x", false, 47.0),
                at(360),
            )?;
            (student, question)
        }
        ScenarioKind::Struggling => {
            let (student, question) = ("maya", "word-problem-01");
            system.record_at(
                student,
                question,
                EventPayload::QuestionStart {
                    question_content: Some(
                        "A train travels 120 km in 90 minutes. Average speed in km/h?".to_string(),
                    ),
                },
                at(0),
            )?;
            system.record_at(student, question, submit("90 km/h", false, 150.0), at(150))?;
            system.record_at(
                student,
                question,
                EventPayload::HintRequest { hint_level: 1 },
                at(300),
            )?;
            system.record_at(
                student,
                question,
                EventPayload::AnswerRevision {
                    original_answer: "90 km/h".to_string(),
                    revised_answer: "90  km/h".to_string(),
                    revision_reason: Some("double-checking units".to_string()),
                },
                at(420),
            )?;
            system.record_at(student, question, submit("90  km/h", false, 120.0), at(540))?;
            system.record_at(
                student,
                question,
                EventPayload::FocusLost {
                    idle_duration_seconds: 200.0,
                },
                at(600),
            )?;
            system.record_at(student, question, EventPayload::FocusGained, at(800))?;
            system.record_at(student, question, submit("90 KM/H", false, 100.0), at(1020))?;
            system.record_at(
                student,
                question,
                EventPayload::Navigation {
                    nav: NavigationKind::Back,
                    destination_question_id: Some("word-problem-00".to_string()),
                },
                at(1100),
            )?;
            system.record_at(student, question, submit("90 km/h ", false, 90.0), at(1260))?;
            (student, question)
        }
    };

    Ok(SeededScenario {
        kind,
        student_id: student_id.to_string(),
        question_id: question_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DropoutType;

    #[tokio::test]
    async fn every_scenario_seeds_cleanly() {
        for kind in ScenarioKind::all() {
            let system = DetectionSystem::new();
            let seeded = seed(&system, kind).await.unwrap();
            assert!(system.collector().event_count() > 0, "{}", seeded.kind.name());
        }
    }

    #[tokio::test]
    async fn scenario_names_round_trip() {
        for kind in ScenarioKind::all() {
            assert_eq!(ScenarioKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(ScenarioKind::parse("unknown"), None);
    }

    #[tokio::test]
    async fn cognitive_scenario_flags_cognitive_dropout() {
        let system = DetectionSystem::new();
        let seeded = seed(&system, ScenarioKind::Cognitive).await.unwrap();
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
    async fn behavioral_scenario_flags_behavioral_dropout() {
        let system = DetectionSystem::new();
        let seeded = seed(&system, ScenarioKind::Behavioral).await.unwrap();
        let outcome = system
            .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
            .await
            .unwrap();
        assert!(outcome
            .classification
            .dropout_types
            .contains(&DropoutType::Behavioral));
    }

    #[tokio::test]
    async fn engagement_scenario_flags_engagement_dropout() {
        let system = DetectionSystem::new();
        let seeded = seed(&system, ScenarioKind::Engagement).await.unwrap();
        let outcome = system
            .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
            .await
            .unwrap();
        assert!(outcome
            .classification
            .dropout_types
            .contains(&DropoutType::Engagement));
        assert!(outcome.features.disengagement.average_gap_increasing);
    }

    #[tokio::test]
    async fn silent_scenario_flags_silent_dropout_on_next_analysis() {
        let system = DetectionSystem::new();
        let seeded = seed(&system, ScenarioKind::Silent).await.unwrap();
        let outcome = system
            .analyze_outcome(&seeded.student_id, &seeded.question_id, None, None)
            .await
            .unwrap();
        assert!(outcome
            .classification
            .dropout_types
            .contains(&DropoutType::Silent));
        // The collapse hides behind healthy surface signals.
        assert!(outcome.features.disengagement.consistency_score > 50.0);
        assert!(!outcome.features.disengagement.average_gap_increasing);
    }
}
