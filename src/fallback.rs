//! Demo records shown when the backend cannot be reached.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{GoalStatus, MoodEntry, Record, RecordId, TherapyGoal, TherapySession};

/// Where a store's current records came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Loaded from (or confirmed by) the remote backend.
    #[default]
    Primary,
    /// Substituted demo data after a failed load.
    Fallback,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Primary => "primary",
            DataSource::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supplies substitute records for an owner.
pub trait FallbackSupplier<R: Record>: Send + Sync {
    /// Records to show, every one stamped with `owner_id`.
    fn records(&self, owner_id: &str, now: DateTime<Utc>) -> Vec<R>;
}

/// Built-in demo content for every record type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoData;

fn demo_id(collection: &str, n: usize) -> RecordId {
    RecordId::confirmed(format!("demo-{}-{}", collection, n))
}

impl FallbackSupplier<MoodEntry> for DemoData {
    fn records(&self, owner_id: &str, now: DateTime<Utc>) -> Vec<MoodEntry> {
        let moods: [(&str, u8, &str, &[&str]); 4] = [
            ("Happy", 8, "Had a great walk in the park", &["exercise", "outdoors"]),
            ("Calm", 6, "Ten minutes of breathing before bed", &["meditation"]),
            ("Anxious", 4, "Big presentation tomorrow", &["work"]),
            ("Grateful", 7, "Dinner with old friends", &["social"]),
        ];

        moods
            .iter()
            .enumerate()
            .map(|(i, (mood, intensity, note, activities))| {
                let at = now - Duration::days(i as i64);
                MoodEntry {
                    id: demo_id(MoodEntry::COLLECTION, i + 1),
                    user_id: owner_id.to_string(),
                    mood: mood.to_string(),
                    intensity: Some(*intensity),
                    note: Some(note.to_string()),
                    activities: activities.iter().map(|a| a.to_string()).collect(),
                    created_at: at,
                    updated_at: at,
                }
            })
            .collect()
    }
}

impl FallbackSupplier<TherapyGoal> for DemoData {
    fn records(&self, owner_id: &str, now: DateTime<Utc>) -> Vec<TherapyGoal> {
        let goals = [
            (
                "Practice daily mindfulness",
                "Spend 10 minutes each day on a guided meditation",
                40,
                GoalStatus::Active,
            ),
            (
                "Improve sleep routine",
                "In bed by 11pm on weeknights",
                70,
                GoalStatus::Active,
            ),
            (
                "Reach out to a friend weekly",
                "Send at least one message or call each week",
                100,
                GoalStatus::Completed,
            ),
        ];

        goals
            .iter()
            .enumerate()
            .map(|(i, (title, description, progress, status))| {
                let created = now - Duration::days(30 - 7 * i as i64);
                TherapyGoal {
                    id: demo_id(TherapyGoal::COLLECTION, i + 1),
                    user_id: owner_id.to_string(),
                    title: title.to_string(),
                    description: Some(description.to_string()),
                    status: *status,
                    progress: *progress,
                    target_date: NaiveDate::from_ymd_opt(2025, 12, 31),
                    created_at: created,
                    updated_at: created,
                    completed_at: (*status == GoalStatus::Completed).then_some(created),
                }
            })
            .collect()
    }
}

impl FallbackSupplier<TherapySession> for DemoData {
    fn records(&self, owner_id: &str, now: DateTime<Utc>) -> Vec<TherapySession> {
        let sessions = [
            (
                "Managing work stress",
                "Identified triggers and practiced box breathing",
                "Anxious",
                "Calm",
                25,
            ),
            (
                "Weekly reflection",
                "Reviewed progress on sleep goal",
                "Tired",
                "Hopeful",
                15,
            ),
        ];

        sessions
            .iter()
            .enumerate()
            .map(|(i, (title, summary, before, after, minutes))| {
                let at = now - Duration::days(2 + 5 * i as i64);
                TherapySession {
                    id: demo_id(TherapySession::COLLECTION, i + 1),
                    user_id: owner_id.to_string(),
                    title: title.to_string(),
                    summary: Some(summary.to_string()),
                    mood_before: Some(before.to_string()),
                    mood_after: Some(after.to_string()),
                    duration_minutes: *minutes,
                    created_at: at,
                    updated_at: at,
                    completed_at: Some(at + Duration::minutes(*minutes as i64)),
                }
            })
            .collect()
    }
}
