//! Command-line subcommands.
//!
//! Every command prints one JSON document; [`CliResult`] carries it along
//! with the process exit code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Subcommand;
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::AppError;
use crate::functions::{SpeechRequest, Voice};
use crate::meditation::{MeditationKind, ScriptGenerator};
use crate::records::{GoalDraft, MoodDraft, MoodSummary, RecordId, SessionDraft};
use crate::store::ActionOutcome;

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Mood check-ins
    #[command(subcommand)]
    Moods(MoodCommand),

    /// Therapy goals
    #[command(subcommand)]
    Goals(GoalCommand),

    /// Therapy sessions
    #[command(subcommand)]
    Sessions(SessionCommand),

    /// Generate a guided meditation script
    Meditate {
        /// breathing, body-scan, loving-kindness, sleep or anxiety-relief
        #[arg(long, default_value = "breathing")]
        kind: MeditationKind,

        #[arg(long, default_value = "10")]
        minutes: u32,

        /// Seed for a reproducible script
        #[arg(long)]
        seed: Option<u64>,

        /// Narrate the script into this file (premium)
        #[arg(long)]
        narrate: Option<PathBuf>,

        #[arg(long, default_value = "nova")]
        voice: Voice,
    },

    /// Check the signed-in user's subscription
    Premium,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MoodCommand {
    /// List mood entries with a summary
    List,

    /// Log a mood
    Add {
        #[arg(long)]
        mood: String,

        /// 1 to 10
        #[arg(long)]
        intensity: Option<u8>,

        #[arg(long)]
        note: Option<String>,

        /// Repeat for several activities
        #[arg(long = "activity")]
        activities: Vec<String>,
    },

    /// Delete a mood entry by id
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum GoalCommand {
    /// List therapy goals
    List,

    /// Create a goal
    Add {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// YYYY-MM-DD
        #[arg(long)]
        target_date: Option<NaiveDate>,
    },

    /// Record progress on a goal
    Progress {
        #[arg(long)]
        id: String,

        /// Percent complete, 0 to 100
        #[arg(long)]
        progress: u8,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List therapy sessions
    List,

    /// Start a session
    Start {
        #[arg(long)]
        title: String,

        #[arg(long)]
        mood_before: Option<String>,
    },

    /// Finish a session with an optional summary
    Complete {
        #[arg(long)]
        id: String,

        #[arg(long)]
        summary: Option<String>,

        #[arg(long)]
        mood_after: Option<String>,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    pub output: Value,
}

impl CliResult {
    pub fn success(output: Value) -> Self {
        Self {
            exit_code: 0,
            output,
        }
    }

    pub fn error(output: Value) -> Self {
        Self {
            exit_code: 1,
            output,
        }
    }

    fn from_app_error(error: AppError) -> Self {
        Self::error(json!({ "status": "error", "error": error.to_string() }))
    }
}

fn outcome<T: Serialize>(outcome: ActionOutcome<T>) -> CliResult {
    match outcome {
        ActionOutcome::Done(record) => CliResult::success(json!({
            "status": "done",
            "record": record,
        })),
        ActionOutcome::Failed(message) => CliResult::error(json!({
            "status": "failed",
            "error": message,
        })),
        ActionOutcome::Skipped => CliResult::error(json!({
            "status": "skipped",
            "error": AppError::NotSignedIn.to_string(),
        })),
    }
}

/// Execute a command against the application state.
pub async fn execute_command(command: Command, state: &AppState) -> CliResult {
    match command {
        Command::Moods(command) => execute_moods(command, state).await,
        Command::Goals(command) => execute_goals(command, state).await,
        Command::Sessions(command) => execute_sessions(command, state).await,
        Command::Meditate {
            kind,
            minutes,
            seed,
            narrate,
            voice,
        } => execute_meditate(state, kind, minutes, seed, narrate, voice).await,
        Command::Premium => execute_premium(state).await,
    }
}

async fn execute_moods(command: MoodCommand, state: &AppState) -> CliResult {
    let user = state.user_id().await;

    match command {
        MoodCommand::List => {
            let report = state.moods.fetch_if_stale(user.as_deref()).await;
            let summary = MoodSummary::from_entries(&report.records);
            CliResult::success(json!({ "report": report, "summary": summary }))
        }
        MoodCommand::Add {
            mood,
            intensity,
            note,
            activities,
        } => {
            let draft = MoodDraft {
                intensity,
                note,
                activities,
                ..MoodDraft::new(user.unwrap_or_default(), mood)
            };
            outcome(state.moods.add(draft).await)
        }
        MoodCommand::Delete { id } => {
            outcome(state.moods.delete(&RecordId::confirmed(id)).await)
        }
    }
}

async fn execute_goals(command: GoalCommand, state: &AppState) -> CliResult {
    let user = state.user_id().await;

    match command {
        GoalCommand::List => {
            let report = state.goals.fetch_if_stale(user.as_deref()).await;
            CliResult::success(json!({ "report": report }))
        }
        GoalCommand::Add {
            title,
            description,
            target_date,
        } => {
            let mut draft = GoalDraft::new(user.unwrap_or_default(), title);
            if let Some(description) = description {
                draft = draft.with_description(description);
            }
            if let Some(target_date) = target_date {
                draft = draft.with_target_date(target_date);
            }
            outcome(state.goals.add(draft).await)
        }
        GoalCommand::Progress { id, progress } => {
            let report = state.goals.fetch_if_stale(user.as_deref()).await;
            let id = RecordId::confirmed(id);
            let Some(mut goal) = report.records.into_iter().find(|g| g.id == id) else {
                return CliResult::error(json!({
                    "status": "failed",
                    "error": format!("No goal with id {}", id),
                }));
            };
            goal.set_progress(progress, chrono::Utc::now());
            outcome(state.goals.update(goal).await)
        }
    }
}

async fn execute_sessions(command: SessionCommand, state: &AppState) -> CliResult {
    let user = state.user_id().await;

    match command {
        SessionCommand::List => {
            let report = state.sessions.fetch_if_stale(user.as_deref()).await;
            CliResult::success(json!({ "report": report }))
        }
        SessionCommand::Start { title, mood_before } => {
            let mut draft = SessionDraft::new(user.unwrap_or_default(), title);
            if let Some(mood) = mood_before {
                draft = draft.with_mood_before(mood);
            }
            outcome(state.sessions.add(draft).await)
        }
        SessionCommand::Complete {
            id,
            summary,
            mood_after,
        } => {
            let report = state.sessions.fetch_if_stale(user.as_deref()).await;
            let id = RecordId::confirmed(id);
            let Some(mut session) = report.records.into_iter().find(|s| s.id == id) else {
                return CliResult::error(json!({
                    "status": "failed",
                    "error": format!("No session with id {}", id),
                }));
            };
            session.complete(summary, mood_after, chrono::Utc::now());
            outcome(state.sessions.update(session).await)
        }
    }
}

async fn execute_meditate(
    state: &AppState,
    kind: MeditationKind,
    minutes: u32,
    seed: Option<u64>,
    narrate: Option<PathBuf>,
    voice: Voice,
) -> CliResult {
    let mut generator = match seed {
        Some(seed) => ScriptGenerator::seeded(seed),
        None => ScriptGenerator::from_entropy(),
    };
    let script = match generator.generate(kind, minutes) {
        Ok(script) => script,
        Err(e) => return CliResult::from_app_error(e.into()),
    };

    let Some(path) = narrate else {
        return CliResult::success(json!({ "script": script }));
    };

    let Some(user) = state.user_id().await else {
        return CliResult::from_app_error(AppError::NotSignedIn);
    };
    if let Err(e) = state.refresh_entitlement().await {
        return CliResult::from_app_error(e);
    }

    let request = SpeechRequest::new(script.text(), user).with_voice(voice);
    let audio = match state.narrate(request).await {
        Ok(audio) => audio,
        Err(e) => return CliResult::from_app_error(e),
    };

    if let Err(e) = tokio::fs::write(&path, &audio.bytes).await {
        return CliResult::from_app_error(AppError::Internal {
            message: format!("Failed to write {}: {}", path.display(), e),
        });
    }

    CliResult::success(json!({
        "script": script,
        "audio": { "path": path, "bytes": audio.bytes.len() },
        "usage": audio.usage,
    }))
}

async fn execute_premium(state: &AppState) -> CliResult {
    match state.refresh_entitlement().await {
        Ok(_) => CliResult::success(json!({ "session": state.session().await })),
        Err(e) => CliResult::from_app_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Credentials, MemoryBackend};
    use crate::config::Config;
    use crate::persist::MemoryKv;
    use clap::Parser;
    use std::sync::Arc;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    #[test]
    fn test_parse_mood_add() {
        let cli = TestCli::try_parse_from([
            "mindful-sync",
            "moods",
            "add",
            "--mood",
            "Calm",
            "--intensity",
            "6",
            "--activity",
            "walk",
            "--activity",
            "tea",
        ])
        .unwrap();

        match cli.command {
            Command::Moods(MoodCommand::Add {
                mood,
                intensity,
                activities,
                ..
            }) => {
                assert_eq!(mood, "Calm");
                assert_eq!(intensity, Some(6));
                assert_eq!(activities, vec!["walk", "tea"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_meditate_kind() {
        let cli = TestCli::try_parse_from([
            "mindful-sync",
            "meditate",
            "--kind",
            "body-scan",
            "--minutes",
            "20",
            "--seed",
            "4",
        ])
        .unwrap();

        match cli.command {
            Command::Meditate {
                kind,
                minutes,
                seed,
                narrate,
                voice,
            } => {
                assert_eq!(kind, MeditationKind::BodyScan);
                assert_eq!(minutes, 20);
                assert_eq!(seed, Some(4));
                assert!(narrate.is_none());
                assert_eq!(voice, Voice::Nova);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(TestCli::try_parse_from(["mindful-sync", "meditate", "--kind", "yoga"]).is_err());
    }

    fn demo_state() -> AppState {
        AppState::new(
            Config::offline(),
            Credentials::new(""),
            Arc::new(MemoryBackend::unreachable()),
            Arc::new(MemoryKv::new()),
        )
    }

    #[tokio::test]
    async fn test_demo_listing_shows_fallback() {
        let state = demo_state();
        state.sign_in("u1", None).await;

        let result = execute_command(Command::Moods(MoodCommand::List), &state).await;

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output["report"]["source"], "fallback");
        assert_eq!(result.output["summary"]["total"], 4);
    }

    #[tokio::test]
    async fn test_add_while_signed_out_is_skipped() {
        let state = demo_state();
        let command = Command::Goals(GoalCommand::Add {
            title: "Sleep earlier".to_string(),
            description: None,
            target_date: None,
        });

        let result = execute_command(command, &state).await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output["status"], "skipped");
    }

    #[tokio::test]
    async fn test_meditate_without_narration() {
        let command = Command::Meditate {
            kind: MeditationKind::Sleep,
            minutes: 4,
            seed: Some(1),
            narrate: None,
            voice: Voice::Nova,
        };

        let result = execute_command(command, &demo_state()).await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output["script"]["kind"], "sleep");
        assert_eq!(
            result.output["script"]["segments"].as_array().unwrap().len(),
            4
        );
    }

    #[tokio::test]
    async fn test_complete_session() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "therapy_sessions",
            vec![serde_json::json!({
                "id": "s1",
                "user_id": "u1",
                "title": "Evening check-in",
                "created_at": "2024-05-01T09:00:00Z",
                "updated_at": "2024-05-01T09:00:00Z"
            })],
        );
        let state = AppState::new(
            Config::offline(),
            Credentials::new(""),
            backend.clone(),
            Arc::new(MemoryKv::new()),
        );
        state.sign_in("u1", None).await;

        let command = Command::Sessions(SessionCommand::Complete {
            id: "s1".to_string(),
            summary: Some("Felt lighter".to_string()),
            mood_after: Some("Calm".to_string()),
        });
        let result = execute_command(command, &state).await;

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output["record"]["summary"], "Felt lighter");
        assert_eq!(result.output["record"]["mood_after"], "Calm");
        assert!(!result.output["record"]["completed_at"].is_null());
    }

    #[tokio::test]
    async fn test_complete_unknown_session_fails() {
        let state = demo_state();
        state.sign_in("u1", None).await;

        let command = Command::Sessions(SessionCommand::Complete {
            id: "missing".to_string(),
            summary: None,
            mood_after: None,
        });
        let result = execute_command(command, &state).await;

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output["status"], "failed");
    }

    #[test]
    fn test_skipped_outcome_is_an_error() {
        let result = outcome::<u8>(ActionOutcome::Skipped);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output["status"], "skipped");
    }
}
