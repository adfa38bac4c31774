//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the registry of live sessions.
//!
//! Sessions live in memory until they are deleted or sit idle longer than the
//! configured timeout, at which point the background sweep drops them.

use crate::config::Config;
use crate::error::ApiError;
use course_designer_core::ports::{PortError, PortResult};
use course_designer_core::state::SessionState;
use course_designer_core::workflow::CourseWorkflow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;
use uuid::Uuid;

/// One server-held session. The inner lock is what the workflow drives.
pub type SharedSession = Arc<Mutex<SessionState>>;

struct SessionEntry {
    session: SharedSession,
    last_seen: Instant,
}

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub workflow: CourseWorkflow,
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, workflow: CourseWorkflow) -> Self {
        Self {
            config,
            workflow,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a session seeded with the saved-course list and registers it.
    pub async fn create_session(&self) -> PortResult<(Uuid, SharedSession)> {
        let state = self.workflow.start_session().await?;
        let session_id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(state));
        self.sessions.lock().await.insert(
            session_id,
            SessionEntry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        Ok((session_id, session))
    }

    /// Looks a session up and marks it as recently used.
    pub async fn session(&self, session_id: Uuid) -> Result<SharedSession, ApiError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        entry.last_seen = Instant::now();
        Ok(entry.session.clone())
    }

    /// Forgets a session. Work already running against it finishes but is no
    /// longer reachable.
    pub async fn remove_session(&self, session_id: Uuid) -> Result<(), ApiError> {
        self.sessions
            .lock()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| session_not_found(session_id))
    }

    /// Drops every session idle for at least `idle` and returns how many went.
    /// A session a request is still holding is kept regardless of age.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry.last_seen.elapsed() < idle || Arc::strong_count(&entry.session) > 1
        });
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn session_not_found(session_id: Uuid) -> ApiError {
    PortError::NotFound(format!("Session {} not found", session_id)).into()
}

/// Periodically evicts idle sessions. Returns `None` when eviction is disabled.
pub fn spawn_idle_session_sweep(app_state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let idle = app_state.config.session_idle_timeout?;
    let period = (idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));

    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let evicted = app_state.evict_idle(idle).await;
            if evicted > 0 {
                info!(evicted, "Evicted idle sessions");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_designer_core::{
        CourseExpander, ImageModel, ImageOrchestrator, ImageSettings, MemoryCourseStore,
        OutlineGenerator, SavedCourseStore, StructuredRequest, TextGenerationService,
    };
    use serde_json::Value;

    struct NoText;

    #[async_trait::async_trait]
    impl TextGenerationService for NoText {
        async fn generate_json(&self, _request: &StructuredRequest) -> PortResult<Value> {
            Err(PortError::Generation("unused".to_string()))
        }
    }

    fn app_state(vars: &'static [(&'static str, &'static str)]) -> Arc<AppState> {
        let config = Config::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
        .unwrap();
        let text: Arc<dyn TextGenerationService> = Arc::new(NoText);
        let models: Vec<Arc<dyn ImageModel>> = Vec::new();
        let images = Arc::new(ImageOrchestrator::new(models, None, ImageSettings::default()));
        let store: Arc<dyn SavedCourseStore> = Arc::new(MemoryCourseStore::new());
        let workflow = CourseWorkflow::new(
            OutlineGenerator::new(text.clone()),
            CourseExpander::new(text, images.clone()),
            images,
            store,
        );
        Arc::new(AppState::new(Arc::new(config), workflow))
    }

    #[tokio::test]
    async fn removed_sessions_are_gone() {
        let state = app_state(&[]);
        let (id, _) = state.create_session().await.unwrap();

        state.remove_session(id).await.unwrap();

        assert!(state.session(id).await.is_err());
        assert!(state.remove_session(id).await.is_err());
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted_and_active_ones_kept() {
        let state = app_state(&[]);
        let (idle_id, idle) = state.create_session().await.unwrap();
        drop(idle);
        let (touched_id, touched) = state.create_session().await.unwrap();
        drop(touched);
        let (_, held) = state.create_session().await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        state.session(touched_id).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(state.evict_idle(Duration::from_secs(60)).await, 1);
        assert!(state.session(idle_id).await.is_err());
        assert!(state.session(touched_id).await.is_ok());
        assert_eq!(state.session_count().await, 2);
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_follows_the_configured_timeout() {
        let state = app_state(&[("SESSION_IDLE_TIMEOUT_SECS", "120")]);
        let (_, session) = state.create_session().await.unwrap();
        drop(session);
        let sweep = spawn_idle_session_sweep(state.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(state.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(state.session_count().await, 0);
        sweep.abort();

        let disabled = app_state(&[("SESSION_IDLE_TIMEOUT_SECS", "0")]);
        assert!(spawn_idle_session_sweep(disabled).is_none());
    }
}
