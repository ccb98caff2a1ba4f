use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Record, RecordId};
use crate::error::ValidationError;

/// A single mood check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub id: RecordId,
    pub user_id: String,
    /// Mood label, e.g. "Happy" or "Anxious".
    pub mood: String,
    /// Strength of the mood from 1 to 10.
    #[serde(default)]
    pub intensity: Option<u8>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when logging a mood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodDraft {
    pub user_id: String,
    pub mood: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activities: Vec<String>,
}

impl MoodDraft {
    pub fn new(user_id: impl Into<String>, mood: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            mood: mood.into(),
            intensity: None,
            note: None,
            activities: Vec::new(),
        }
    }

    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activities.push(activity.into());
        self
    }
}

impl Record for MoodEntry {
    type Draft = MoodDraft;

    const COLLECTION: &'static str = "mood_entries";
    const LABEL: &'static str = "mood entries";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn draft_owner(draft: &MoodDraft) -> &str {
        &draft.user_id
    }

    fn materialize(id: RecordId, draft: &MoodDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: draft.user_id.clone(),
            mood: draft.mood.trim().to_string(),
            intensity: draft.intensity,
            note: draft.note.clone(),
            activities: draft.activities.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn validate(draft: &MoodDraft) -> Result<(), ValidationError> {
        if draft.mood.trim().is_empty() {
            return Err(ValidationError::new("mood", "Please select a mood"));
        }
        if let Some(intensity) = draft.intensity {
            if !(1..=10).contains(&intensity) {
                return Err(ValidationError::new(
                    "intensity",
                    "Intensity must be between 1 and 10",
                ));
            }
        }
        Ok(())
    }
}

/// Aggregate view over a set of mood entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoodSummary {
    pub total: usize,
    /// Entry count per mood label.
    pub counts: BTreeMap<String, usize>,
    pub most_common: Option<String>,
    pub average_intensity: Option<f64>,
}

impl MoodSummary {
    pub fn from_entries(entries: &[MoodEntry]) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in entries {
            *counts.entry(entry.mood.clone()).or_default() += 1;
        }

        // Ties resolve to the alphabetically first label.
        let most_common = counts
            .iter()
            .fold(None::<(&String, usize)>, |best, (mood, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((mood, count)),
            })
            .map(|(mood, _)| mood.clone());

        let intensities: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.intensity.map(f64::from))
            .collect();
        let average_intensity = if intensities.is_empty() {
            None
        } else {
            Some(intensities.iter().sum::<f64>() / intensities.len() as f64)
        };

        Self {
            total: entries.len(),
            counts,
            most_common,
            average_intensity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mood: &str, intensity: Option<u8>) -> MoodEntry {
        let draft = MoodDraft {
            intensity,
            ..MoodDraft::new("u1", mood)
        };
        MoodEntry::materialize(RecordId::confirmed(mood), &draft, Utc::now())
    }

    #[test]
    fn test_validate_rejects_blank_mood() {
        let err = MoodEntry::validate(&MoodDraft::new("u1", "   ")).unwrap_err();
        assert_eq!(err.field, "mood");
    }

    #[test]
    fn test_validate_rejects_out_of_range_intensity() {
        let draft = MoodDraft::new("u1", "Calm").with_intensity(11);
        let err = MoodEntry::validate(&draft).unwrap_err();
        assert_eq!(err.field, "intensity");

        let draft = MoodDraft::new("u1", "Calm").with_intensity(7);
        assert!(MoodEntry::validate(&draft).is_ok());
    }

    #[test]
    fn test_materialize_stamps_timestamps() {
        let now = Utc::now();
        let draft = MoodDraft::new("u1", " Happy ").with_note("sunny walk");
        let entry = MoodEntry::materialize(RecordId::confirmed("m1"), &draft, now);

        assert_eq!(entry.mood, "Happy");
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.updated_at, now);
        assert_eq!(entry.note.as_deref(), Some("sunny walk"));
    }

    #[test]
    fn test_row_omits_id() {
        let row = entry("Happy", None).to_row();
        assert!(row.get("id").is_none());
        assert_eq!(row["mood"], "Happy");
    }

    #[test]
    fn test_summary() {
        let entries = vec![
            entry("Happy", Some(8)),
            entry("Calm", Some(6)),
            entry("Happy", None),
        ];
        let summary = MoodSummary::from_entries(&entries);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.counts["Happy"], 2);
        assert_eq!(summary.most_common.as_deref(), Some("Happy"));
        assert_eq!(summary.average_intensity, Some(7.0));
    }

    #[test]
    fn test_summary_empty() {
        let summary = MoodSummary::from_entries(&[]);
        assert_eq!(summary, MoodSummary::default());
    }
}
