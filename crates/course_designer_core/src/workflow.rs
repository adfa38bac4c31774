//! crates/course_designer_core/src/workflow.rs
//!
//! Drives a session through course creation: asks for an outline, expands the
//! approved outline, saves the result, and reopens saved courses.
//!
//! The session lock is only held between awaits on provider calls, so another
//! task can read progress while a course is being generated. Each call records
//! the session epoch it started under; once a reset or a newer request moves the
//! epoch on, its results and failures are no longer written to the session.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{ContentDepth, Course, ImageKey, ImageSlot, SavedCourse};
use crate::expander::CourseExpander;
use crate::images::ImageOrchestrator;
use crate::outline::OutlineGenerator;
use crate::ports::{PortError, PortResult, SavedCourseStore};
use crate::state::{SessionAction, SessionState, TransitionError};

pub const OUTLINE_FAILED: &str = "Failed to generate outline";
pub const COURSE_FAILED: &str = "Failed to generate course";
pub const LOAD_FAILED: &str = "Failed to load course. Please try again.";

#[derive(Clone)]
pub struct CourseWorkflow {
    outline: OutlineGenerator,
    expander: CourseExpander,
    images: Arc<ImageOrchestrator>,
    store: Arc<dyn SavedCourseStore>,
}

impl CourseWorkflow {
    pub fn new(
        outline: OutlineGenerator,
        expander: CourseExpander,
        images: Arc<ImageOrchestrator>,
        store: Arc<dyn SavedCourseStore>,
    ) -> Self {
        Self {
            outline,
            expander,
            images,
            store,
        }
    }

    pub fn outline_generator(&self) -> &OutlineGenerator {
        &self.outline
    }

    pub fn expander(&self) -> &CourseExpander {
        &self.expander
    }

    pub fn images(&self) -> &ImageOrchestrator {
        &self.images
    }

    pub fn store(&self) -> &Arc<dyn SavedCourseStore> {
        &self.store
    }

    /// A fresh session holding the current saved-course list.
    pub async fn start_session(&self) -> PortResult<SessionState> {
        Ok(SessionState::new(self.store.list().await?))
    }

    pub async fn request_outline(
        &self,
        session: &Mutex<SessionState>,
        prompt: &str,
        num_modules: usize,
        depth: ContentDepth,
    ) -> PortResult<()> {
        let epoch = {
            let mut state = session.lock().await;
            state.apply(SessionAction::SubmitOutlineRequest {
                prompt: prompt.to_string(),
                depth,
            })?;
            state.epoch()
        };

        match self.outline.generate(prompt, num_modules, depth).await {
            Ok(outline) => {
                session
                    .lock()
                    .await
                    .apply(SessionAction::OutlineReceived { epoch, outline })?;
                Ok(())
            }
            Err(e) => {
                error!("Error generating outline: {}", e);
                fail_current(session, epoch, OUTLINE_FAILED).await;
                Err(e)
            }
        }
    }

    /// Expands the approved outline, saves the course, and opens it.
    pub async fn approve_outline(&self, session: &Mutex<SessionState>) -> PortResult<()> {
        let (epoch, prompt, outline, depth) = {
            let mut state = session.lock().await;
            state.apply(SessionAction::ApproveOutline)?;
            state.apply(SessionAction::SetProgress {
                progress: 10.0,
                message: "Generating course content...".to_string(),
            })?;
            (
                state.epoch(),
                state.user_prompt().to_string(),
                state.outline().map(<[_]>::to_vec).unwrap_or_default(),
                state.content_depth(),
            )
        };

        let course = match self.expander.expand(&prompt, &outline, depth).await {
            Ok(course) => course,
            Err(e) => {
                error!("Error generating course: {}", e);
                fail_current(session, epoch, COURSE_FAILED).await;
                return Err(e);
            }
        };

        {
            let mut state = session.lock().await;
            if state.epoch() == epoch {
                state.apply(SessionAction::SetProgress {
                    progress: 90.0,
                    message: "Saving course...".to_string(),
                })?;
            }
        }
        let saved_id = course
            .id
            .parse::<i64>()
            .unwrap_or_else(|_| Utc::now().timestamp_millis());
        if let Err(e) = self
            .store
            .prepend(SavedCourse::from_course(saved_id, &course))
            .await
        {
            warn!("Failed to save course {}: {}", saved_id, e);
        }
        let saved_courses = self.refreshed_list(session).await;

        // The course is saved even if the session moved on; only opening it is skipped.
        let mut state = session.lock().await;
        state.apply(SessionAction::LoadSavedCourses(saved_courses))?;
        state.apply(SessionAction::CourseReceived { epoch, course })?;
        state.apply(SessionAction::SetProgress {
            progress: 100.0,
            message: "Course ready".to_string(),
        })?;
        info!(course_id = saved_id, "Course generation complete");
        Ok(())
    }

    /// Opens a saved course, generating only the images it is missing.
    pub async fn load_saved_course(&self, session: &Mutex<SessionState>, id: i64) -> PortResult<()> {
        let epoch = {
            let mut state = session.lock().await;
            if state.error().is_some() {
                return Err(TransitionError::ErrorPending {
                    action: "open a saved course",
                }
                .into());
            }
            state.apply(SessionAction::SetLoading(true))?;
            state.apply(SessionAction::SetProgress {
                progress: 0.0,
                message: "Loading course...".to_string(),
            })?;
            state.epoch()
        };

        let saved = match self.store.list().await {
            Ok(list) => list.into_iter().find(|c| c.id == id),
            Err(e) => {
                fail_current(session, epoch, LOAD_FAILED).await;
                return Err(e);
            }
        };
        let Some(saved) = saved else {
            session.lock().await.apply(SessionAction::SetLoading(false))?;
            return Err(PortError::NotFound(format!("Saved course {} not found", id)));
        };

        let mut course = saved.to_course(Utc::now());
        let repaired = self.repair_images(session, &mut course).await;
        if repaired > 0 {
            if let Err(e) = self.store.upsert(SavedCourse::from_course(id, &course)).await {
                warn!("Failed to store repaired images for course {}: {}", id, e);
            }
            let saved_courses = self.refreshed_list(session).await;
            session
                .lock()
                .await
                .apply(SessionAction::LoadSavedCourses(saved_courses))?;
        }

        session.lock().await.apply(SessionAction::CourseLoaded {
            epoch,
            prompt: saved.prompt,
            depth: saved.depth,
            course,
        })?;
        Ok(())
    }

    /// Generates one image per empty slot, one call each, and returns how many succeeded.
    async fn repair_images(&self, session: &Mutex<SessionState>, course: &mut Course) -> usize {
        let missing: Vec<(ImageSlot, String)> = course
            .image_slots()
            .into_iter()
            .filter(|(_, prompt, url)| url.is_empty() && !prompt.trim().is_empty())
            .map(|(slot, prompt, _)| (slot, prompt.to_string()))
            .collect();

        if missing.is_empty() {
            debug!(course_id = %course.id, "All images present; nothing to regenerate");
            return 0;
        }
        if !self.images.is_enabled() {
            debug!(missing = missing.len(), "Image generation disabled; leaving images empty");
            return 0;
        }

        let total = missing.len();
        let mut repaired = 0;
        for (done, (slot, prompt)) in missing.into_iter().enumerate() {
            let message = match slot {
                ImageSlot::Cover => "Generating cover image...".to_string(),
                ImageSlot::Slide { module, .. } => format!(
                    "Generating images for {}...",
                    course.modules[module].title
                ),
            };
            let key = ImageKey::new(course.id.as_str(), slot);
            match self.images.generate_one(&prompt, Some(&key)).await {
                Ok(url) => {
                    course.set_image_url(slot, url);
                    repaired += 1;
                }
                Err(e) => warn!(?slot, "Could not regenerate image: {}", e),
            }

            let progress = (done + 1) as f32 / total as f32 * 100.0;
            // Progress is informational; a rejected update is not worth failing the load.
            let _ = session
                .lock()
                .await
                .apply(SessionAction::SetProgress { progress, message });
        }
        info!(course_id = %course.id, repaired, missing = total, "Image repair finished");
        repaired
    }

    pub async fn delete_saved_course(&self, session: &Mutex<SessionState>, id: i64) -> PortResult<()> {
        self.store.remove(id).await?;
        let saved_courses = self.store.list().await?;
        session
            .lock()
            .await
            .apply(SessionAction::LoadSavedCourses(saved_courses))?;
        Ok(())
    }

    pub async fn clear_saved_courses(&self, session: &Mutex<SessionState>) -> PortResult<()> {
        self.store.clear().await?;
        session
            .lock()
            .await
            .apply(SessionAction::LoadSavedCourses(Vec::new()))?;
        Ok(())
    }

    pub async fn reset(&self, session: &Mutex<SessionState>) -> PortResult<()> {
        session.lock().await.apply(SessionAction::Reset)?;
        Ok(())
    }

    /// The store's list, or the session's current copy if the store cannot be read.
    async fn refreshed_list(&self, session: &Mutex<SessionState>) -> Vec<SavedCourse> {
        match self.store.list().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Failed to reload saved courses: {}", e);
                session.lock().await.saved_courses().to_vec()
            }
        }
    }
}

/// Records a failure unless the session has moved on to a newer request.
async fn fail_current(session: &Mutex<SessionState>, epoch: u64, message: &str) {
    let mut state = session.lock().await;
    if state.epoch() != epoch {
        debug!(epoch, current = state.epoch(), "Dropping failure from an abandoned request");
        return;
    }
    // Recording an error is accepted in every stage.
    let _ = state.apply(SessionAction::Fail(message.to_string()));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::images::ImageSettings;
    use crate::ports::{ImageModel, StructuredRequest};
    use crate::state::CourseStage;
    use crate::store::MemoryCourseStore;
    use crate::test_support::{
        saved_course, saved_course_with_images, FakeImageModel, FakeText, ModelBehavior,
    };

    struct Harness {
        workflow: CourseWorkflow,
        text: Arc<FakeText>,
        model: Arc<FakeImageModel>,
        store: Arc<MemoryCourseStore>,
    }

    fn harness(text: FakeText) -> Harness {
        let text = Arc::new(text);
        let model = Arc::new(FakeImageModel::new("m1", ModelBehavior::Succeed));
        let store = Arc::new(MemoryCourseStore::new());
        let models: Vec<Arc<dyn ImageModel>> = vec![model.clone()];
        let images = Arc::new(ImageOrchestrator::new(models, None, ImageSettings::default()));
        let workflow = CourseWorkflow::new(
            OutlineGenerator::new(text.clone()),
            CourseExpander::new(text.clone(), images.clone()),
            images,
            store.clone(),
        );
        Harness {
            workflow,
            text,
            model,
            store,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn outline_then_approval_saves_and_opens_the_course() {
        let h = harness(FakeText::well_behaved());
        let session = Mutex::new(h.workflow.start_session().await.unwrap());

        h.workflow
            .request_outline(&session, "Intro to X", 2, ContentDepth::Low)
            .await
            .unwrap();
        {
            let state = session.lock().await;
            assert_eq!(state.stage(), CourseStage::OutlineReview);
            assert_eq!(state.outline().unwrap().len(), 2);
        }

        h.workflow.approve_outline(&session).await.unwrap();

        let state = session.lock().await;
        assert_eq!(state.stage(), CourseStage::CourseView);
        let course = state.course().unwrap();
        assert_eq!(course.modules.len(), 2);
        assert!(course.modules.iter().all(|m| m.slides.len() == 3 && m.quiz.len() == 3));
        assert_eq!(state.saved_courses().len(), 1);
        assert_eq!(state.progress(), 100.0);
        assert_eq!(h.store.list().await.unwrap().len(), 1);
        assert_eq!(h.store.list().await.unwrap()[0].id.to_string(), course.id);
    }

    #[tokio::test]
    async fn outline_failure_sets_error_until_retry() {
        let h = harness(FakeText::new(|_| {
            Err(PortError::Generation("provider down".to_string()))
        }));
        let session = Mutex::new(SessionState::default());

        let result = h
            .workflow
            .request_outline(&session, "topic", 1, ContentDepth::Low)
            .await;
        assert!(matches!(result, Err(PortError::Generation(_))));
        assert_eq!(session.lock().await.error(), Some(OUTLINE_FAILED));

        session.lock().await.apply(SessionAction::Retry).unwrap();
        assert_eq!(session.lock().await.stage(), CourseStage::Prompt);
        assert_eq!(session.lock().await.error(), None);
    }

    /// Outline requests for "Old topic" answer slowly; everything else answers at once.
    fn slow_old_topic(fail_old: bool) -> FakeText {
        FakeText::new(move |request: &StructuredRequest| {
            if request.prompt.contains("Old topic") {
                if fail_old {
                    return Err(PortError::Generation("old request failed".to_string()));
                }
                return Ok(json!({"modules": [{"title": "Old", "description": "old"}]}));
            }
            Ok(json!({"modules": [{"title": "New", "description": "new"}]}))
        })
        .with_latency(|request: &StructuredRequest| {
            if request.prompt.contains("Old topic") {
                Duration::from_millis(500)
            } else {
                Duration::from_millis(10)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn outline_from_before_a_reset_does_not_replace_the_new_one() {
        let h = harness(slow_old_topic(false));
        let session = Mutex::new(SessionState::default());

        let old = h
            .workflow
            .request_outline(&session, "Old topic", 1, ContentDepth::Low);
        let newer = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.workflow.reset(&session).await.unwrap();
            h.workflow
                .request_outline(&session, "New topic", 1, ContentDepth::Low)
                .await
        };
        let (old, newer) = tokio::join!(old, newer);

        newer.unwrap();
        assert!(matches!(
            old,
            Err(PortError::Transition(TransitionError::Stale { .. }))
        ));
        let state = session.lock().await;
        assert_eq!(state.stage(), CourseStage::OutlineReview);
        assert_eq!(state.user_prompt(), "New topic");
        assert_eq!(state.outline().unwrap()[0].title, "New");
        assert_eq!(h.text.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_from_before_a_reset_leaves_the_session_clean() {
        let h = harness(slow_old_topic(true));
        let session = Mutex::new(SessionState::default());

        let old = h
            .workflow
            .request_outline(&session, "Old topic", 1, ContentDepth::Low);
        let newer = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.workflow.reset(&session).await.unwrap();
        };
        let (old, ()) = tokio::join!(old, newer);

        assert!(matches!(old, Err(PortError::Generation(_))));
        let state = session.lock().await;
        assert_eq!(state.error(), None);
        assert_eq!(state.stage(), CourseStage::Prompt);
    }

    #[tokio::test]
    async fn approving_without_an_outline_is_a_transition_error() {
        let h = harness(FakeText::well_behaved());
        let session = Mutex::new(SessionState::default());

        let result = h.workflow.approve_outline(&session).await;
        assert!(matches!(result, Err(PortError::Transition(_))));
        assert_eq!(h.text.calls(), 0);
    }

    #[tokio::test]
    async fn loading_a_complete_course_generates_nothing() {
        let h = harness(FakeText::well_behaved());
        h.store.prepend(saved_course(11, "complete")).await.unwrap();
        let session = Mutex::new(h.workflow.start_session().await.unwrap());

        h.workflow.load_saved_course(&session, 11).await.unwrap();

        assert_eq!(h.model.calls(), 0);
        let state = session.lock().await;
        assert_eq!(state.stage(), CourseStage::CourseView);
        assert_eq!(state.user_prompt(), "complete");
        assert_eq!(state.course().unwrap().id, "11");
    }

    #[tokio::test(start_paused = true)]
    async fn loading_repairs_only_missing_images() {
        let h = harness(FakeText::well_behaved());
        h.store
            .prepend(saved_course_with_images(
                12,
                "partial",
                "",
                &["https://img.test/kept", "", "https://img.test/kept-too"],
            ))
            .await
            .unwrap();
        let session = Mutex::new(h.workflow.start_session().await.unwrap());

        h.workflow.load_saved_course(&session, 12).await.unwrap();

        assert_eq!(h.model.calls(), 2);
        let state = session.lock().await;
        let course = state.course().unwrap();
        assert!(!course.cover.image_url.is_empty());
        assert_eq!(course.modules[0].slides[0].image_url, "https://img.test/kept");
        assert!(!course.modules[0].slides[1].image_url.is_empty());
        assert_eq!(state.progress(), 100.0);

        let stored = &h.store.list().await.unwrap()[0];
        assert!(!stored.course.cover.image_url.is_empty());
        assert!(!stored.course.modules[0].slides[1].image_url.is_empty());
    }

    #[tokio::test]
    async fn loading_an_unknown_course_is_not_found() {
        let h = harness(FakeText::well_behaved());
        let session = Mutex::new(SessionState::default());

        let result = h.workflow.load_saved_course(&session, 99).await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
        assert!(!session.lock().await.is_loading());
    }

    #[tokio::test]
    async fn delete_and_clear_refresh_the_session_list() {
        let h = harness(FakeText::well_behaved());
        h.store.prepend(saved_course(1, "a")).await.unwrap();
        h.store.prepend(saved_course(2, "b")).await.unwrap();
        let session = Mutex::new(h.workflow.start_session().await.unwrap());
        assert_eq!(session.lock().await.saved_courses().len(), 2);

        h.workflow.delete_saved_course(&session, 1).await.unwrap();
        assert_eq!(session.lock().await.saved_courses()[0].id, 2);
        assert_eq!(session.lock().await.saved_courses().len(), 1);

        h.workflow.clear_saved_courses(&session).await.unwrap();
        assert!(session.lock().await.saved_courses().is_empty());
        assert!(h.store.list().await.unwrap().is_empty());
    }
}
