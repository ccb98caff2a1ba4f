//! Application root.
//!
//! [`AppState`] is built once by the caller and handed to whatever needs
//! data. It owns the backend, the signed-in session and one store per record
//! type; nothing here is a global.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::backend::{Credentials, RemoteCollection};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::fallback::DemoData;
use crate::functions::{FunctionsClient, SpeechAudio, SpeechRequest};
use crate::persist::{KeyValueStore, SnapshotPersistence};
use crate::records::{MoodEntry, TherapyGoal, TherapySession};
use crate::store::{Clock, DomainStore, Notification, Notifier, SystemClock};

/// Who is signed in and what they are entitled to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub user_id: Option<String>,
    pub is_premium: bool,
}

impl AuthSession {
    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Counts of what a refresh left in each store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub moods: usize,
    pub goals: usize,
    pub sessions: usize,
    /// True when any store is showing demo data.
    pub using_fallback: bool,
}

/// Explicitly constructed application state.
pub struct AppState {
    pub config: Config,
    pub credentials: Credentials,
    pub notifier: Notifier,
    pub moods: DomainStore<MoodEntry>,
    pub goals: DomainStore<TherapyGoal>,
    pub sessions: DomainStore<TherapySession>,
    functions: Option<FunctionsClient>,
    session: Arc<RwLock<AuthSession>>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        credentials: Credentials,
        backend: Arc<dyn RemoteCollection>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_clock(config, credentials, backend, kv, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        credentials: Credentials,
        backend: Arc<dyn RemoteCollection>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = Notifier::default();
        let persistence = SnapshotPersistence::new(kv, config.cache.namespace.clone());

        let moods: DomainStore<MoodEntry> =
            DomainStore::new(Arc::clone(&backend), Arc::new(DemoData))
                .with_notifier(notifier.clone())
                .with_clock(Arc::clone(&clock))
                .with_persistence(persistence.clone())
                .with_freshness(config.freshness.mood());
        let goals: DomainStore<TherapyGoal> =
            DomainStore::new(Arc::clone(&backend), Arc::new(DemoData))
                .with_notifier(notifier.clone())
                .with_clock(Arc::clone(&clock))
                .with_persistence(persistence.clone())
                .with_freshness(config.freshness.therapy());
        let sessions: DomainStore<TherapySession> =
            DomainStore::new(backend, Arc::new(DemoData))
                .with_notifier(notifier.clone())
                .with_clock(clock)
                .with_persistence(persistence)
                .with_freshness(config.freshness.therapy());

        Self {
            config,
            credentials,
            notifier,
            moods,
            goals,
            sessions,
            functions: None,
            session: Arc::new(RwLock::new(AuthSession::default())),
        }
    }

    /// Enable serverless function calls (speech, subscription)
    pub fn with_functions(mut self, functions: FunctionsClient) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub async fn session(&self) -> AuthSession {
        self.session.read().await.clone()
    }

    pub async fn user_id(&self) -> Option<String> {
        self.session.read().await.user_id.clone()
    }

    /// Record the signed-in user; the access token authorizes later requests.
    ///
    /// Switching to a different user drops the previous user's records and
    /// entitlement.
    pub async fn sign_in(&self, user_id: impl Into<String>, access_token: Option<String>) {
        let user_id = user_id.into();
        self.credentials.set_access_token(access_token).await;

        let switched = {
            let mut session = self.session.write().await;
            let switched = session.user_id.as_deref() != Some(user_id.as_str());
            if switched {
                session.is_premium = false;
            }
            session.user_id = Some(user_id.clone());
            switched
        };

        if switched {
            tokio::join!(self.moods.reset(), self.goals.reset(), self.sessions.reset());
        }
        info!(user = %user_id, switched, "Signed in");
    }

    /// Forget the user, their in-memory records and their snapshots
    pub async fn sign_out(&self) {
        *self.session.write().await = AuthSession::default();
        self.credentials.set_access_token(None).await;

        tokio::join!(self.moods.reset(), self.goals.reset(), self.sessions.reset());
        tokio::join!(
            self.moods.clear_persisted(),
            self.goals.clear_persisted(),
            self.sessions.clear_persisted()
        );
        info!("Signed out");
    }

    /// Load last-known-good snapshots for the signed-in user
    pub async fn restore_cached(&self) -> usize {
        let Some(user) = self.user_id().await else {
            return 0;
        };

        let (moods, goals, sessions) = tokio::join!(
            self.moods.restore(&user),
            self.goals.restore(&user),
            self.sessions.restore(&user)
        );
        [moods, goals, sessions].iter().filter(|r| **r).count()
    }

    /// Refresh every store that has gone stale
    pub async fn refresh_all(&self) -> RefreshSummary {
        let user = self.user_id().await;
        let owner = user.as_deref();

        let (moods, goals, sessions) = tokio::join!(
            self.moods.fetch_if_stale(owner),
            self.goals.fetch_if_stale(owner),
            self.sessions.fetch_if_stale(owner)
        );

        RefreshSummary {
            moods: moods.records.len(),
            goals: goals.records.len(),
            sessions: sessions.records.len(),
            using_fallback: moods.is_using_fallback()
                || goals.is_using_fallback()
                || sessions.is_using_fallback(),
        }
    }

    /// Re-read the premium flag from the subscription function
    pub async fn refresh_entitlement(&self) -> AppResult<bool> {
        let user = self.user_id().await.ok_or(AppError::NotSignedIn)?;
        let functions = self.functions()?;

        let status = functions.subscription_status(&user).await?;

        let mut session = self.session.write().await;
        if session.user_id.as_deref() == Some(user.as_str()) {
            session.is_premium = status.is_premium;
        } else {
            warn!("Session changed while checking subscription, ignoring result");
        }
        Ok(status.is_premium)
    }

    /// Fail unless the signed-in user has premium access
    pub async fn require_premium(&self, feature: &str) -> AppResult<()> {
        let session = self.session.read().await;
        if !session.is_signed_in() {
            return Err(AppError::NotSignedIn);
        }
        if !session.is_premium {
            return Err(AppError::PremiumRequired {
                feature: feature.to_string(),
            });
        }
        Ok(())
    }

    /// Narrate text for a premium user
    pub async fn narrate(&self, request: SpeechRequest) -> AppResult<SpeechAudio> {
        self.require_premium("narration").await?;
        request.validate()?;
        let functions = self.functions()?;
        Ok(functions.text_to_speech(&request).await?)
    }

    fn functions(&self) -> AppResult<&FunctionsClient> {
        self.functions.as_ref().ok_or_else(|| AppError::Config {
            message: "Serverless functions are not configured".to_string(),
        })
    }

    /// Mark the session premium without asking the backend (tests, demo mode)
    pub async fn set_premium(&self, is_premium: bool) {
        self.session.write().await.is_premium = is_premium;
    }
}
