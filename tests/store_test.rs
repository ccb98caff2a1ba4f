//! Integration tests for domain stores
//!
//! Runs stores against the in-process backend with a manual clock, so
//! failures, latency and freshness windows are all under test control.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use mindful_sync::backend::{MemoryBackend, Operation};
use mindful_sync::fallback::{DataSource, DemoData};
use mindful_sync::persist::{MemoryKv, SnapshotPersistence};
use mindful_sync::records::{GoalDraft, MoodDraft, MoodEntry, Record, RecordId, TherapyGoal};
use mindful_sync::store::{ActionOutcome, Clock, DomainStore, ManualClock, Notifier, Severity};

fn mood_row(id: &str, user: &str, mood: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "user_id": user,
        "mood": mood,
        "intensity": 5,
        "created_at": created_at,
        "updated_at": created_at
    })
}

fn goal_row(id: &str, user: &str, title: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "user_id": user,
        "title": title,
        "status": "active",
        "progress": 10,
        "created_at": created_at,
        "updated_at": created_at
    })
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

fn mood_store(backend: &Arc<MemoryBackend>, clock: &Arc<ManualClock>) -> DomainStore<MoodEntry> {
    DomainStore::<MoodEntry>::new(backend.clone(), Arc::new(DemoData))
        .with_clock(clock.clone())
        .with_freshness(Duration::from_secs(300))
}

fn goal_store(backend: &Arc<MemoryBackend>, clock: &Arc<ManualClock>) -> DomainStore<TherapyGoal> {
    DomainStore::<TherapyGoal>::new(backend.clone(), Arc::new(DemoData))
        .with_clock(clock.clone())
        .with_freshness(Duration::from_secs(3600))
}

fn ids<R: Record>(records: &[R]) -> Vec<RecordId> {
    records.iter().map(|r| r.id().clone()).collect()
}

#[cfg(test)]
mod fetch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_fetch_is_not_fallback() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = clock();
        let store = mood_store(&backend, &clock);

        let report = store.fetch(Some("u1")).await;

        assert!(report.records.is_empty());
        assert_eq!(report.source, DataSource::Primary);
        assert!(!store.is_using_fallback().await);

        let state = store.state().await;
        assert_eq!(state.owner_id(), Some("u1"));
        assert_eq!(state.last_fetched(), Some(clock.now()));
        assert!(state.error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_filters_owner_and_orders_newest_first() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![
                mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z"),
                mood_row("m2", "u2", "Sad", "2024-05-02T09:00:00Z"),
                mood_row("m3", "u1", "Happy", "2024-05-03T09:00:00Z"),
            ],
        );
        let store = mood_store(&backend, &clock());

        let report = store.fetch(Some("u1")).await;

        assert_eq!(
            ids(&report.records),
            vec![RecordId::confirmed("m3"), RecordId::confirmed("m1")]
        );
        assert!(report.records.iter().all(|r| r.user_id == "u1"));
    }

    #[tokio::test]
    async fn test_goals_are_ordered_oldest_first() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "therapy_goals",
            vec![
                goal_row("g2", "u1", "Sleep earlier", "2024-05-02T09:00:00Z"),
                goal_row("g1", "u1", "Journal daily", "2024-05-01T09:00:00Z"),
            ],
        );
        let store = goal_store(&backend, &clock());

        let report = store.fetch(Some("u1")).await;
        assert_eq!(
            ids(&report.records),
            vec![RecordId::confirmed("g1"), RecordId::confirmed("g2")]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_uses_fallback_stamped_with_owner() {
        let backend = Arc::new(MemoryBackend::unreachable());
        let clock = clock();
        let notifier = Notifier::default();
        let mut notifications = notifier.subscribe();
        let store = mood_store(&backend, &clock).with_notifier(notifier);

        let report = store.fetch(Some("u1")).await;

        assert!(report.is_using_fallback());
        assert_eq!(report.records.len(), 4);
        assert!(report.records.iter().all(|r| r.user_id == "u1"));
        assert!(report.error.as_deref().unwrap().contains("mood entries"));

        let state = store.state().await;
        assert!(state.is_using_fallback());
        assert!(state.last_fetched().is_none());
        assert!(!state.is_loading());

        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_recovered_fetch_replaces_fallback() {
        let backend = Arc::new(MemoryBackend::unreachable());
        backend.seed(
            "mood_entries",
            vec![mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z")],
        );
        let store = mood_store(&backend, &clock());

        assert!(store.fetch(Some("u1")).await.is_using_fallback());

        backend.recover();
        let report = store.fetch(Some("u1")).await;

        assert!(!report.is_using_fallback());
        assert_eq!(ids(&report.records), vec![RecordId::confirmed("m1")]);
        assert!(store.state().await.error().is_none());
    }

    #[tokio::test]
    async fn test_loading_flag_tracks_in_flight_fetch() {
        let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(100)));
        let store = mood_store(&backend, &clock());

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch(Some("u1")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.is_loading().await);

        task.await.unwrap();
        assert!(!store.is_loading().await);
    }
}

#[cfg(test)]
mod freshness_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_second_fetch_inside_window_makes_no_call() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = clock();
        let store = mood_store(&backend, &clock);

        let first = store.fetch_if_stale(Some("u1")).await;
        clock.advance(chrono::Duration::seconds(299));
        let second = store.fetch_if_stale(Some("u1")).await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(backend.calls(Operation::Select), 1);
    }

    #[tokio::test]
    async fn test_fetch_after_window_goes_remote() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = clock();
        let store = mood_store(&backend, &clock);

        store.fetch_if_stale(Some("u1")).await;
        clock.advance(chrono::Duration::seconds(301));
        let report = store.fetch_if_stale(Some("u1")).await;

        assert!(!report.from_cache);
        assert_eq!(backend.calls(Operation::Select), 2);
    }

    #[tokio::test]
    async fn test_other_owner_goes_remote() {
        let backend = Arc::new(MemoryBackend::new());
        let store = mood_store(&backend, &clock());

        store.fetch_if_stale(Some("u1")).await;
        store.fetch_if_stale(Some("u2")).await;

        assert_eq!(backend.calls(Operation::Select), 2);
        assert_eq!(store.state().await.owner_id(), Some("u2"));
    }

    #[tokio::test]
    async fn test_fallback_is_never_fresh() {
        let backend = Arc::new(MemoryBackend::unreachable());
        let store = mood_store(&backend, &clock());

        store.fetch_if_stale(Some("u1")).await;
        store.fetch_if_stale(Some("u1")).await;

        assert_eq!(backend.calls(Operation::Select), 2);
    }

    #[tokio::test]
    async fn test_failure_after_success_keeps_old_timestamp() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = clock();
        let store = mood_store(&backend, &clock);

        store.fetch(Some("u1")).await;
        let fetched_at = store.state().await.last_fetched();

        clock.advance(chrono::Duration::seconds(10));
        backend.fail(Operation::Select);
        store.fetch(Some("u1")).await;

        assert_eq!(store.state().await.last_fetched(), fetched_at);
    }

    #[tokio::test]
    async fn test_add_after_fallback_is_not_fresh() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![
                mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z"),
                mood_row("m2", "u1", "Tired", "2024-05-02T09:00:00Z"),
            ],
        );
        let store = mood_store(&backend, &clock());

        store.fetch(Some("u1")).await;
        backend.fail(Operation::Select);
        store.fetch(Some("u1")).await;
        backend.recover();
        assert!(store.add(MoodDraft::new("u1", "Hopeful")).await.is_done());

        let report = store.fetch_if_stale(Some("u1")).await;

        assert!(!report.from_cache);
        assert_eq!(backend.calls(Operation::Select), 3);
        assert_eq!(report.records.len(), 3);
    }
}

#[cfg(test)]
mod add_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_successful_add_holds_exactly_one_server_record() {
        let backend = Arc::new(MemoryBackend::new());
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        let outcome = store
            .add(MoodDraft::new("u1", "Happy").with_intensity(7))
            .await;

        let added = outcome.into_option().unwrap();
        let server_id = backend.rows("mood_entries")[0]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let state = store.state().await;
        assert_eq!(ids(state.records()), vec![RecordId::confirmed(server_id)]);
        assert_eq!(state.pending_count(), 0);
        assert_eq!(added.intensity, Some(7));
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_failed_add_restores_previous_collection() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![
                mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z"),
                mood_row("m2", "u1", "Tired", "2024-05-02T09:00:00Z"),
            ],
        );
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;
        let before = ids(&store.records().await);

        backend.fail(Operation::Insert);
        let outcome = store.add(MoodDraft::new("u1", "Happy")).await;

        assert!(outcome.error().is_some());
        assert_eq!(ids(&store.records().await), before);
        assert!(!store.is_loading().await);
    }

    #[tokio::test]
    async fn test_failed_add_on_empty_store() {
        let backend = Arc::new(MemoryBackend::new());
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        backend.fail(Operation::Insert);
        store.add(MoodDraft::new("u1", "Happy")).await;

        let state = store.state().await;
        assert!(state.records().is_empty());
        assert!(state.error().is_some());
    }

    #[tokio::test]
    async fn test_add_without_owner_is_skipped() {
        let backend = Arc::new(MemoryBackend::new());
        let store = mood_store(&backend, &clock());

        let outcome = store.add(MoodDraft::new("", "Happy")).await;

        assert_eq!(outcome, ActionOutcome::Skipped);
        assert_eq!(backend.calls(Operation::Insert), 0);
    }

    #[tokio::test]
    async fn test_invalid_draft_makes_no_call() {
        let backend = Arc::new(MemoryBackend::new());
        let store = mood_store(&backend, &clock());

        let outcome = store
            .add(MoodDraft::new("u1", "Happy").with_intensity(11))
            .await;

        assert!(outcome.error().unwrap().contains("intensity"));
        assert_eq!(backend.calls(Operation::Insert), 0);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_both_confirm() {
        let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(30)));
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        let (a, b) = tokio::join!(
            store.add(MoodDraft::new("u1", "Happy")),
            store.add(MoodDraft::new("u1", "Calm"))
        );

        assert!(a.is_done() && b.is_done());
        let state = store.state().await;
        assert_eq!(state.records().len(), 2);
        assert_eq!(state.pending_count(), 0);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_concurrent_add_alongside_skipped_add() {
        let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(30)));
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        let (a, b) = tokio::join!(
            store.add(MoodDraft::new("u1", "Happy")),
            store.add(MoodDraft::new("", "Skipped"))
        );

        assert!(a.is_done());
        assert_eq!(b, ActionOutcome::Skipped);
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_after_fallback_replaces_demo_records() {
        let backend = Arc::new(MemoryBackend::unreachable());
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;
        assert!(store.is_using_fallback().await);

        backend.recover();
        let added = store
            .add(MoodDraft::new("u1", "Hopeful"))
            .await
            .into_option()
            .unwrap();

        let state = store.state().await;
        assert_eq!(state.source(), DataSource::Primary);
        assert_eq!(ids(state.records()), vec![added.id.clone()]);
    }

    #[tokio::test]
    async fn test_leaving_fallback_keeps_other_pending_adds() {
        let backend =
            Arc::new(MemoryBackend::unreachable().with_latency(Duration::from_millis(60)));
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;
        backend.recover();

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.add(MoodDraft::new("u1", "Happy")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let store = store.clone();
            tokio::spawn(async move { store.add(MoodDraft::new("u1", "Calm")).await })
        };

        let added = first.await.unwrap().into_option().unwrap();
        let state = store.state().await;
        assert_eq!(state.source(), DataSource::Primary);
        assert_eq!(state.pending_count(), 1);
        assert_eq!(state.records().len(), 2);
        assert!(state.get(&added.id).is_some());

        assert!(second.await.unwrap().is_done());
        let state = store.state().await;
        assert_eq!(state.records().len(), 2);
        assert_eq!(state.pending_count(), 0);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_confirmation_after_reset_is_dropped() {
        let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(80)));
        let store = mood_store(&backend, &clock());

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.add(MoodDraft::new("u1", "Happy")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.reset().await;

        assert!(task.await.unwrap().is_done());
        let state = store.state().await;
        assert!(state.records().is_empty());
        assert!(!state.is_loading());
    }
}

#[cfg(test)]
mod update_delete_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_update_merges_returned_record() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "therapy_goals",
            vec![goal_row("g1", "u1", "Journal daily", "2024-05-01T09:00:00Z")],
        );
        let clock = clock();
        let store = goal_store(&backend, &clock);
        store.fetch(Some("u1")).await;

        let mut goal = store.records().await.remove(0);
        goal.set_progress(100, Utc::now());
        let updated = store.update(goal).await.into_option().unwrap();

        assert_eq!(updated.progress, 100);
        assert_eq!(store.records().await[0].progress, 100);
        assert_eq!(backend.rows("therapy_goals")[0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_update_of_absent_record_changes_nothing_locally() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = clock();
        let store = goal_store(&backend, &clock);
        store.fetch(Some("u1")).await;

        let goal = TherapyGoal::materialize(
            RecordId::confirmed("ghost"),
            &GoalDraft::new("u1", "Nothing"),
            Utc::now(),
        );
        let outcome = store.update(goal).await;

        assert!(outcome.is_done());
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_local_record() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "therapy_goals",
            vec![goal_row("g1", "u1", "Journal daily", "2024-05-01T09:00:00Z")],
        );
        let store = goal_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        backend.fail(Operation::Update);
        let mut goal = store.records().await.remove(0);
        goal.set_progress(50, Utc::now());
        let outcome = store.update(goal).await;

        assert!(outcome.error().is_some());
        assert_eq!(store.records().await[0].progress, 10);
        assert!(store.state().await.error().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![
                mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z"),
                mood_row("m2", "u1", "Tired", "2024-05-02T09:00:00Z"),
            ],
        );
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        let removed = store
            .delete(&RecordId::confirmed("m1"))
            .await
            .into_option()
            .unwrap();

        assert_eq!(removed.unwrap().mood, "Calm");
        assert_eq!(ids(&store.records().await), vec![RecordId::confirmed("m2")]);
        assert_eq!(backend.rows("mood_entries").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_absent_record_is_a_local_noop() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z")],
        );
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        let outcome = store.delete(&RecordId::confirmed("missing")).await;

        assert_eq!(outcome, ActionOutcome::Done(None));
        assert_eq!(store.records().await.len(), 1);
        assert_eq!(backend.calls(Operation::Delete), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z")],
        );
        let store = mood_store(&backend, &clock());
        store.fetch(Some("u1")).await;

        backend.fail(Operation::Delete);
        let outcome = store.delete(&RecordId::confirmed("m1")).await;

        assert!(outcome.error().is_some());
        assert_eq!(store.records().await.len(), 1);
        assert!(!store.is_loading().await);
    }
}

#[cfg(test)]
mod persistence_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn persisted_store(
        backend: &Arc<MemoryBackend>,
        kv: &Arc<MemoryKv>,
    ) -> DomainStore<MoodEntry> {
        mood_store(backend, &clock()).with_persistence(SnapshotPersistence::new(kv.clone(), "test"))
    }

    #[tokio::test]
    async fn test_snapshot_restores_into_new_store() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z")],
        );
        let kv = Arc::new(MemoryKv::new());

        persisted_store(&backend, &kv).fetch(Some("u1")).await;

        let restored = persisted_store(&backend, &kv);
        assert!(restored.restore("u1").await);

        let state = restored.state().await;
        assert_eq!(ids(state.records()), vec![RecordId::confirmed("m1")]);
        assert!(state.last_fetched().is_none());

        // Restored data is not fresh.
        restored.fetch_if_stale(Some("u1")).await;
        assert_eq!(backend.calls(Operation::Select), 2);
    }

    #[tokio::test]
    async fn test_snapshot_for_other_owner_is_ignored() {
        let backend = Arc::new(MemoryBackend::new());
        let kv = Arc::new(MemoryKv::new());
        persisted_store(&backend, &kv).fetch(Some("u1")).await;

        assert!(!persisted_store(&backend, &kv).restore("u2").await);
    }

    #[tokio::test]
    async fn test_fallback_data_is_never_persisted() {
        let backend = Arc::new(MemoryBackend::unreachable());
        let kv = Arc::new(MemoryKv::new());

        persisted_store(&backend, &kv).fetch(Some("u1")).await;

        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_added_record_is_persisted() {
        let backend = Arc::new(MemoryBackend::new());
        let kv = Arc::new(MemoryKv::new());
        let store = persisted_store(&backend, &kv);
        store.fetch(Some("u1")).await;

        store.add(MoodDraft::new("u1", "Happy")).await;

        let restored = persisted_store(&backend, &kv);
        assert!(restored.restore("u1").await);
        assert_eq!(restored.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_after_fallback_keeps_last_good_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "mood_entries",
            vec![
                mood_row("m1", "u1", "Calm", "2024-05-01T09:00:00Z"),
                mood_row("m2", "u1", "Tired", "2024-05-02T09:00:00Z"),
            ],
        );
        let kv = Arc::new(MemoryKv::new());
        let store = persisted_store(&backend, &kv);

        store.fetch(Some("u1")).await;
        backend.fail(Operation::Select);
        store.fetch(Some("u1")).await;
        backend.recover();
        store.add(MoodDraft::new("u1", "Hopeful")).await;

        let restored = persisted_store(&backend, &kv);
        assert!(restored.restore("u1").await);
        assert_eq!(
            ids(&restored.records().await),
            vec![RecordId::confirmed("m2"), RecordId::confirmed("m1")]
        );
    }

    #[tokio::test]
    async fn test_restore_does_not_overwrite_loaded_store() {
        let backend = Arc::new(MemoryBackend::new());
        let kv = Arc::new(MemoryKv::new());
        let store = persisted_store(&backend, &kv);
        store.fetch(Some("u1")).await;

        assert!(!store.restore("u1").await);
    }
}
