use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Recency, Record, RecordId};
use crate::error::ValidationError;

/// Progress state of a therapy goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Paused => "paused",
            GoalStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(GoalStatus::Active),
            "paused" => Ok(GoalStatus::Paused),
            "completed" => Ok(GoalStatus::Completed),
            _ => Err(format!("Unknown goal status: {}", s)),
        }
    }
}

/// A goal the user works toward across therapy sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapyGoal {
    pub id: RecordId,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: GoalStatus,
    /// Percent complete, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TherapyGoal {
    /// Set progress, completing the goal when it reaches 100.
    pub fn set_progress(&mut self, progress: u8, now: DateTime<Utc>) {
        self.progress = progress.min(100);
        self.updated_at = now;
        if self.progress == 100 {
            self.status = GoalStatus::Completed;
            self.completed_at.get_or_insert(now);
        } else if self.status == GoalStatus::Completed {
            self.status = GoalStatus::Active;
            self.completed_at = None;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDraft {
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl GoalDraft {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            target_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_target_date(mut self, target_date: NaiveDate) -> Self {
        self.target_date = Some(target_date);
        self
    }
}

impl Record for TherapyGoal {
    type Draft = GoalDraft;

    const COLLECTION: &'static str = "therapy_goals";
    const ORDER: Recency = Recency::OldestFirst;
    const LABEL: &'static str = "therapy goals";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn draft_owner(draft: &GoalDraft) -> &str {
        &draft.user_id
    }

    fn materialize(id: RecordId, draft: &GoalDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: draft.user_id.clone(),
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            status: GoalStatus::Active,
            progress: 0,
            target_date: draft.target_date,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn validate(draft: &GoalDraft) -> Result<(), ValidationError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::new("title", "Goal title cannot be empty"));
        }
        Ok(())
    }
}

/// A completed or in-progress therapy chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapySession {
    pub id: RecordId,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub mood_before: Option<String>,
    #[serde(default)]
    pub mood_after: Option<String>,
    #[serde(default)]
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TherapySession {
    /// Close the session, recording its length from when it started.
    pub fn complete(
        &mut self,
        summary: Option<String>,
        mood_after: Option<String>,
        now: DateTime<Utc>,
    ) {
        if summary.is_some() {
            self.summary = summary;
        }
        if mood_after.is_some() {
            self.mood_after = mood_after;
        }
        self.duration_minutes = u32::try_from((now - self.created_at).num_minutes()).unwrap_or(0);
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDraft {
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood_before: Option<String>,
    #[serde(default)]
    pub duration_minutes: u32,
}

impl SessionDraft {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            mood_before: None,
            duration_minutes: 0,
        }
    }

    pub fn with_mood_before(mut self, mood: impl Into<String>) -> Self {
        self.mood_before = Some(mood.into());
        self
    }
}

impl Record for TherapySession {
    type Draft = SessionDraft;

    const COLLECTION: &'static str = "therapy_sessions";
    const LABEL: &'static str = "therapy sessions";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn draft_owner(draft: &SessionDraft) -> &str {
        &draft.user_id
    }

    fn materialize(id: RecordId, draft: &SessionDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: draft.user_id.clone(),
            title: draft.title.trim().to_string(),
            summary: None,
            mood_before: draft.mood_before.clone(),
            mood_after: None,
            duration_minutes: draft.duration_minutes,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn validate(draft: &SessionDraft) -> Result<(), ValidationError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::new(
                "title",
                "Session title cannot be empty",
            ));
        }
        Ok(())
    }
}
